use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamline_batch::BatchScheduler;
use streamline_cli::{
    config::Config,
    pipeline::{self, Finished},
    render::TokenPrinter,
};
use streamline_sse::StreamConnection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let mut config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Positional argument overrides the configured endpoint
    if let Some(url) = std::env::args().nth(1) {
        config.connection.url = url;
    }

    init_logging(&config);

    tracing::info!("Tailing {}", config.connection.url);

    let scheduler = BatchScheduler::new(config.scheduler.clone(), TokenPrinter::stdout())?;
    let connection = StreamConnection::new(config.connection.clone());

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    let _subscriptions = pipeline::attach(&connection, &scheduler, finished_tx);

    tokio::select! {
        reason = finished_rx.recv() => {
            if reason == Some(Finished::Closed) {
                tracing::warn!("Connection closed before the stream completed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    connection.close();
    pipeline::drain(&scheduler).await;
    println!();

    let stats = connection.stats();
    let metrics = scheduler.metrics();
    tracing::info!(
        messages = stats.message_count,
        errors = stats.error_count,
        reconnects = stats.reconnect_count,
        batches = metrics.batches_processed,
        dropped = metrics.dropped_updates,
        "Done"
    );

    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr so stdout carries only the streamed text
    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
