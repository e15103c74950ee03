// Transport seam: anything that can open a stream of SSE frames

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, COOKIE};
use std::time::Duration;
use tokio::sync::OnceCell;

use streamline_types::{ConnectionConfig, StreamError};

use crate::buffer_utils::{parse_sse_stream, SseStream};

/// Opens one push stream per call
///
/// Reconnection re-invokes `open` with the same config; there is no
/// resumption, every call is a fresh request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, config: &ConnectionConfig) -> Result<SseStream, StreamError>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-Sent Events over HTTP (reqwest, no SDK)
#[derive(Debug, Default)]
pub struct HttpTransport {
    http_client: OnceCell<reqwest::Client>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS roots, ...)
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client: OnceCell::new_with(Some(http_client)),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, StreamError> {
        self.http_client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .connect_timeout(CONNECT_TIMEOUT)
                    .build()
                    .map_err(|e| StreamError::transport(format!("Failed to create HTTP client: {}", e)))
            })
            .await
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        config: &ConnectionConfig,
    ) -> reqwest::RequestBuilder {
        let mut request = match &config.body {
            Some(body) => client.post(&config.url).json(body),
            None => client.get(&config.url),
        };

        request = request
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        for (name, value) in &config.headers {
            if !config.credentials.allows_credentials() && is_credential_header(name) {
                tracing::debug!("Credentials omitted, not sending header {}", name);
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        request
    }
}

fn is_credential_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) || name.eq_ignore_ascii_case(COOKIE.as_str())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, config: &ConnectionConfig) -> Result<SseStream, StreamError> {
        let client = self.client().await?;
        let request = self.build_request(client, config);

        tracing::debug!("Opening event stream: {}", config.url);

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                status: status.as_u16(),
            });
        }

        Ok(parse_sse_stream(response.bytes_stream()))
    }
}
