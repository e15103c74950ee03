use chrono::Utc;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use streamline_types::{
    Completion, ConnectionConfig, ConnectionState, ConnectionStats, ExhaustedInfo, Progress,
    ReadyState, ReconnectInfo, ReconnectedInfo, StreamError, StreamingMetadata, Token,
};

use crate::buffer_utils::{SseFrame, SseStream};
use crate::listeners::{lock, Listeners, Unsubscribe};
use crate::streaming::{decode_frame, ServerEvent};
use crate::transport::{HttpTransport, Transport};

/// Liveness check cadence, independent of the configured heartbeat timeout
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct EventListeners {
    token: Listeners<Token>,
    metadata: Listeners<StreamingMetadata>,
    progress: Listeners<Progress>,
    error: Listeners<StreamError>,
    reconnecting: Listeners<ReconnectInfo>,
    done: Listeners<Completion>,
    open: Listeners<()>,
    close: Listeners<()>,
    reconnected: Listeners<ReconnectedInfo>,
    message: Listeners<String>,
    exhausted: Listeners<ExhaustedInfo>,
}

struct Status {
    state: ConnectionState,
    stats: ConnectionStats,
    reconnect_attempts: u32,
    connected_since: Option<Instant>,
    last_event: Instant,
}

impl Status {
    fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            stats: ConnectionStats::default(),
            reconnect_attempts: 0,
            connected_since: None,
            last_event: Instant::now(),
        }
    }

    /// Record the end of the current session, if one is live
    fn end_session(&mut self) {
        if let Some(since) = self.connected_since.take() {
            self.stats.uptime = since.elapsed();
        }
        self.stats.disconnected_at = Some(Utc::now());
    }
}

enum SessionEnd {
    /// The server finished the generation and closed the body
    Completed,
    Failed(StreamError),
    /// `close()` won the race with the driver
    Cancelled,
}

enum ErrorDecision {
    Retry(Duration, ReconnectInfo),
    GiveUp(ExhaustedInfo),
    Stop,
}

struct Shared {
    id: Uuid,
    config: ConnectionConfig,
    status: Mutex<Status>,
    events: EventListeners,
}

/// Auto-reconnecting consumer of a server-sent event stream
///
/// Construction immediately spawns a driver task on the current tokio
/// runtime that opens the stream, decodes frames into typed callbacks,
/// watches liveness and reconnects with exponential backoff. The open is
/// asynchronous, so subscribers registered right after construction see
/// every event. Outside a runtime the connection starts `Closed` with the
/// failure recorded in `stats().last_error`.
///
/// ```rust,no_run
/// use streamline_sse::StreamConnection;
/// use streamline_types::ConnectionConfig;
///
/// # async fn run() {
/// let connection = StreamConnection::new(ConnectionConfig::new("http://localhost:3000/stream"));
/// let _tokens = connection.on_token(|token| print!("{}", token.to_display_string()));
/// let _done = connection.on_done(|_| println!());
/// # }
/// ```
pub struct StreamConnection {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConnection {
    /// Connect over HTTP
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Connect through a custom transport
    pub fn with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            config,
            status: Mutex::new(Status::new()),
            events: EventListeners::default(),
        });

        let span = tracing::info_span!(
            "stream_connection",
            id = %shared.id,
            url = %shared.config.url
        );
        let driver = match Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(Arc::clone(&shared).drive(transport).instrument(span))),
            Err(e) => {
                shared.fail_permanently(StreamError::transport(format!("No tokio runtime: {}", e)));
                None
            }
        };

        Self {
            shared,
            driver: Mutex::new(driver),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Stop for good: cancels any pending reconnect, stops the watchdog,
    /// drops the transport and emits `close`. Safe to call repeatedly.
    pub fn close(&self) {
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }

        if self.shared.transition_closed() {
            tracing::info!(id = %self.shared.id, "Connection closed");
            self.shared.events.close.emit(&());
        }
    }

    /// Snapshot of the counters; `uptime` is live while connected
    pub fn stats(&self) -> ConnectionStats {
        let status = lock(&self.shared.status);
        let mut stats = status.stats.clone();
        if let (ConnectionState::Open, Some(since)) = (status.state, status.connected_since) {
            stats.uptime = since.elapsed();
        }
        stats
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.status).state
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state().ready_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn on_token<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Token) + Send + Sync + 'static,
    {
        self.shared.events.token.subscribe(callback)
    }

    pub fn on_metadata<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&StreamingMetadata) + Send + Sync + 'static,
    {
        self.shared.events.metadata.subscribe(callback)
    }

    pub fn on_progress<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.shared.events.progress.subscribe(callback)
    }

    /// Transport failures, heartbeat timeouts and server-sent errors
    pub fn on_error<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.shared.events.error.subscribe(callback)
    }

    pub fn on_reconnecting<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&ReconnectInfo) + Send + Sync + 'static,
    {
        self.shared.events.reconnecting.subscribe(callback)
    }

    pub fn on_done<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Completion) + Send + Sync + 'static,
    {
        self.shared.events.done.subscribe(callback)
    }

    pub fn on_open<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.shared.events.open.subscribe(callback)
    }

    pub fn on_close<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.shared.events.close.subscribe(callback)
    }

    pub fn on_reconnected<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&ReconnectedInfo) + Send + Sync + 'static,
    {
        self.shared.events.reconnected.subscribe(callback)
    }

    /// Unnamed frames
    pub fn on_message<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.shared.events.message.subscribe(callback)
    }

    /// Fired once when reconnection gives up
    pub fn on_max_reconnect_attempts<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&ExhaustedInfo) + Send + Sync + 'static,
    {
        self.shared.events.exhausted.subscribe(callback)
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("id", &self.shared.id)
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    async fn drive(self: Arc<Self>, transport: Arc<dyn Transport>) {
        if let Err(e) = self.config.validate() {
            self.fail_permanently(e.into());
            return;
        }

        loop {
            if !self.connect() {
                return;
            }

            let outcome = match transport.open(&self.config).await {
                Ok(stream) => {
                    if !self.handle_open() {
                        return;
                    }
                    self.pump(stream).await
                }
                Err(e) => SessionEnd::Failed(e),
            };

            let error = match outcome {
                SessionEnd::Failed(error) => error,
                SessionEnd::Completed => {
                    tracing::info!("Stream completed");
                    if self.transition_closed() {
                        self.events.close.emit(&());
                    }
                    return;
                }
                SessionEnd::Cancelled => return,
            };

            match self.handle_error(error) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }

    /// Move to `Connecting`; false when closed (or already open)
    fn connect(&self) -> bool {
        let mut status = lock(&self.status);
        match status.state {
            ConnectionState::Open | ConnectionState::Closed => false,
            _ => {
                status.state = ConnectionState::Connecting;
                true
            }
        }
    }

    fn handle_open(&self) -> bool {
        let reconnected = {
            let mut status = lock(&self.status);
            if status.state == ConnectionState::Closed {
                return false;
            }

            let followed_reconnect = status.reconnect_attempts > 0;
            let now = Instant::now();
            status.state = ConnectionState::Open;
            status.reconnect_attempts = 0;
            status.connected_since = Some(now);
            status.last_event = now;
            status.stats.connected_at = Some(Utc::now());
            status.stats.disconnected_at = None;

            followed_reconnect.then(|| ReconnectedInfo {
                reconnect_count: status.stats.reconnect_count,
            })
        };

        tracing::info!("Connection open");
        self.events.open.emit(&());
        if let Some(info) = reconnected {
            tracing::info!("Reconnected after {} reconnects", info.reconnect_count);
            self.events.reconnected.emit(&info);
        }
        true
    }

    /// Read frames until the session ends; the watchdog lives only here
    async fn pump(&self, mut stream: SseStream) -> SessionEnd {
        let timeout = self.config.heartbeat_timeout();
        let mut watchdog = interval_at(Instant::now() + WATCHDOG_INTERVAL, WATCHDOG_INTERVAL);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = false;

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(frame)) => {
                        if let Some(end) = self.handle_frame(frame, &mut completed) {
                            return end;
                        }
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None if completed => return SessionEnd::Completed,
                    None => return SessionEnd::Failed(StreamError::StreamEnded),
                },
                _ = watchdog.tick() => {
                    let elapsed = lock(&self.status).last_event.elapsed();
                    if elapsed > timeout {
                        return SessionEnd::Failed(StreamError::HeartbeatTimeout {
                            elapsed_ms: elapsed.as_millis() as u64,
                            timeout_ms: self.config.heartbeat_timeout_ms,
                        });
                    }
                }
            }
        }
    }

    fn handle_frame(&self, frame: SseFrame, completed: &mut bool) -> Option<SessionEnd> {
        {
            let mut status = lock(&self.status);
            if status.state == ConnectionState::Closed {
                return Some(SessionEnd::Cancelled);
            }
            status.last_event = Instant::now();
            if frame.event_name() != "heartbeat" {
                status.stats.message_count += 1;
            }
        }

        tracing::trace!("Frame received: {}", frame.event_name());

        match decode_frame(&frame)? {
            ServerEvent::Token(token) => self.events.token.emit(&token),
            ServerEvent::Metadata(metadata) => self.events.metadata.emit(&metadata),
            ServerEvent::Progress(progress) => self.events.progress.emit(&progress),
            ServerEvent::Error(error) => return Some(SessionEnd::Failed(StreamError::Server(error))),
            ServerEvent::Done(completion) => {
                *completed = true;
                self.events.done.emit(&completion);
            }
            ServerEvent::Heartbeat => {}
            ServerEvent::Message(data) => self.events.message.emit(&data),
        }

        None
    }

    /// Record the failure and decide what happens next.
    /// Returns the backoff delay when a reconnect was scheduled.
    fn handle_error(&self, error: StreamError) -> Option<Duration> {
        let decision = {
            let mut status = lock(&self.status);
            if status.state == ConnectionState::Closed {
                return None;
            }

            status.stats.error_count += 1;
            status.stats.last_error = Some(error.clone());
            if status.state == ConnectionState::Open {
                status.end_session();
            }
            status.state = ConnectionState::Error;

            if !self.config.reconnect {
                ErrorDecision::Stop
            } else if status.reconnect_attempts < self.config.max_reconnect_attempts {
                let delay = self.config.reconnect_delay(status.reconnect_attempts);
                status.reconnect_attempts += 1;
                status.stats.reconnect_count += 1;
                status.state = ConnectionState::Reconnecting;
                ErrorDecision::Retry(
                    delay,
                    ReconnectInfo {
                        attempt: status.reconnect_attempts,
                        interval_ms: delay.as_millis() as u64,
                        max_attempts: self.config.max_reconnect_attempts,
                    },
                )
            } else {
                status.state = ConnectionState::Closed;
                if status.stats.disconnected_at.is_none() {
                    status.stats.disconnected_at = Some(Utc::now());
                }
                ErrorDecision::GiveUp(ExhaustedInfo {
                    attempts: status.reconnect_attempts,
                })
            }
        };

        tracing::warn!("Connection error: {}", error);
        self.events.error.emit(&error);

        match decision {
            ErrorDecision::Retry(delay, info) => {
                tracing::info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay,
                    info.attempt,
                    info.max_attempts
                );
                self.events.reconnecting.emit(&info);
                Some(delay)
            }
            ErrorDecision::GiveUp(info) => {
                tracing::error!("Giving up after {} reconnect attempts", info.attempts);
                self.events.exhausted.emit(&info);
                self.events.close.emit(&());
                None
            }
            ErrorDecision::Stop => {
                tracing::info!("Reconnection disabled, staying disconnected");
                None
            }
        }
    }

    /// Invalid configuration or a missing runtime can never succeed: report once and close
    fn fail_permanently(&self, error: StreamError) {
        {
            let mut status = lock(&self.status);
            status.stats.error_count += 1;
            status.stats.last_error = Some(error.clone());
            status.state = ConnectionState::Closed;
            status.stats.disconnected_at = Some(Utc::now());
        }

        tracing::error!("Cannot connect: {}", error);
        self.events.error.emit(&error);
        self.events.close.emit(&());
    }

    /// Enter `Closed`; false when it already was
    fn transition_closed(&self) -> bool {
        let mut status = lock(&self.status);
        if status.state == ConnectionState::Closed {
            return false;
        }
        status.end_session();
        status.state = ConnectionState::Closed;
        true
    }
}
