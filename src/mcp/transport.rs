//! Push/pull transport for tool servers.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest_eventsource::{retry, Event, EventSource};
use serde_json::Value;
use tracing::debug;

use crate::error::{McpezError, Result};
use crate::util::http::{shared_client, status_to_error};

/// An event received on the push connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Open,
    Message { event: String, data: String },
}

impl PushEvent {
    pub fn message(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Message {
            event: event.into(),
            data: data.into(),
        }
    }
}

pub type PushStream = BoxStream<'static, Result<PushEvent>>;

/// Transport seam for the protocol client.
///
/// `open` starts the server-to-client event stream; `post` delivers one
/// JSON-RPC message to the command endpoint. Dropping the stream closes the
/// push connection.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn open(&self, url: &str) -> Result<PushStream>;

    async fn post(&self, endpoint: &str, message: &Value) -> Result<()>;
}

/// Server-Sent Events over HTTP, with JSON-RPC POSTs.
#[derive(Debug, Clone)]
pub struct SseTransport {
    http: reqwest::Client,
    headers: HeaderMap,
}

impl SseTransport {
    pub fn new() -> Self {
        Self {
            http: shared_client().clone(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Add a header sent on both the stream and the POSTs.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| McpezError::Configuration(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| McpezError::Configuration(format!("invalid value for header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

impl Default for SseTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn open(&self, url: &str) -> Result<PushStream> {
        let request = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream");
        let mut source = EventSource::new(request)
            .map_err(|e| McpezError::Protocol(format!("cannot open event stream {url}: {e}")))?;
        source.set_retry_policy(Box::new(retry::Never));

        let url = url.to_string();
        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => yield Ok(PushEvent::Open),
                    Ok(Event::Message(message)) => {
                        yield Ok(PushEvent::Message { event: message.event, data: message.data });
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => {
                        debug!(url = url.as_str(), "tool server stream ended");
                        break;
                    }
                    Err(err) => {
                        yield Err(McpezError::Stream(format!("tool server stream failed: {err}")));
                        break;
                    }
                }
            }
            source.close();
        };
        Ok(Box::pin(stream))
    }

    async fn post(&self, endpoint: &str, message: &Value) -> Result<()> {
        let response = self
            .http
            .post(endpoint)
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body));
        }
        Ok(())
    }
}
