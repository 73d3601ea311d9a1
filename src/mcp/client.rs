//! Tool server client: SSE push connection plus correlated JSON-RPC requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use futures::StreamExt;
use serde_json::{json, Value};
use strum::{Display, EnumString};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::protocol::{initialize_params, method, JsonRpcRequest, JsonRpcResponse};
use super::schema::{normalize, ToolFormat};
use super::transport::{McpTransport, PushEvent, PushStream, SseTransport};
use crate::error::{McpezError, Result};
use crate::tools::ToolExecutor;
use crate::util::timeout::with_timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Initialized,
    Closed,
}

#[derive(Debug, Clone, Builder)]
pub struct McpClientOptions {
    /// Deadline for each request, including the wait for endpoint discovery.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
    #[builder(default)]
    pub format: ToolFormat,
    #[builder(into, default = "mcpez".to_string())]
    pub client_name: String,
    #[builder(into, default = env!("CARGO_PKG_VERSION").to_string())]
    pub client_version: String,
}

impl Default for McpClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

type Settlement = oneshot::Sender<Result<Value>>;

/// State shared with the reader task.
struct Session {
    pending: Mutex<HashMap<u64, Settlement>>,
    endpoint: watch::Sender<Option<String>>,
    state: watch::Sender<ConnectionState>,
}

impl Session {
    fn new() -> Self {
        let (endpoint, _) = watch::channel(None);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            pending: Mutex::new(HashMap::new()),
            endpoint,
            state,
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            // Closed is terminal.
            if *current == state || *current == ConnectionState::Closed {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Settle the pending entry a `message` event answers.
    async fn dispatch(&self, data: &str) {
        let response: JsonRpcResponse = match serde_json::from_str(data) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "malformed message event ignored");
                return;
            }
        };
        let Some(id) = response.request_id() else {
            debug!("message event without request id ignored");
            return;
        };
        let settlement = self.pending.lock().await.remove(&id);
        match settlement {
            Some(tx) => {
                let _ = tx.send(response.into_result());
            }
            None => debug!(id, "response without pending request dropped"),
        }
    }

    async fn reject_all(&self, error: impl Fn() -> McpezError) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "rejecting pending requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(error()));
        }
    }
}

/// Client for one tool server.
///
/// All operations take `&self`, so a connected client can be shared behind an
/// `Arc` and used as the engine's [`ToolExecutor`].
pub struct McpClient {
    server_url: String,
    transport: Arc<dyn McpTransport>,
    options: McpClientOptions,
    next_id: AtomicU64,
    session: Arc<Session>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    raw_tools: RwLock<Vec<Value>>,
    tools: RwLock<Vec<Value>>,
}

impl McpClient {
    pub fn new(
        server_url: impl Into<String>,
        transport: Arc<dyn McpTransport>,
        options: McpClientOptions,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            transport,
            options,
            next_id: AtomicU64::new(0),
            session: Arc::new(Session::new()),
            reader: StdMutex::new(None),
            raw_tools: RwLock::new(Vec::new()),
            tools: RwLock::new(Vec::new()),
        }
    }

    /// Client over the SSE transport with default options.
    pub fn sse(server_url: impl Into<String>) -> Self {
        Self::new(server_url, Arc::new(SseTransport::new()), McpClientOptions::default())
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn options(&self) -> &McpClientOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// The discovered command endpoint.
    pub fn endpoint(&self) -> Option<String> {
        self.session.endpoint.borrow().clone()
    }

    /// The catalogue in the configured [`ToolFormat`].
    pub fn tools(&self) -> Vec<Value> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The `tools` array exactly as the server listed it.
    pub fn raw_tools(&self) -> Vec<Value> {
        self.raw_tools.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of requests awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        self.session.pending.lock().await.len()
    }

    /// Open the push connection, discover the endpoint, run the handshake and
    /// load the tool catalogue.
    ///
    /// `timeout` bounds endpoint discovery; each request afterwards has the
    /// per-request deadline from the options.
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Disconnected {
            return Err(McpezError::InvalidState(format!("cannot connect while {state}")));
        }
        self.session.set_state(ConnectionState::Connecting);

        let outcome = self.handshake(timeout).await;
        if let Err(e) = &outcome {
            warn!(server = self.server_url.as_str(), error = %e, "tool server connect failed");
            self.close().await;
        }
        outcome
    }

    async fn handshake(&self, timeout: Duration) -> Result<()> {
        debug!(server = self.server_url.as_str(), "opening tool server stream");
        let stream = self.transport.open(&self.server_url).await?;
        let handle = tokio::spawn(read_events(
            stream,
            Arc::clone(&self.session),
            self.server_url.clone(),
        ));
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        let endpoint = with_timeout(timeout, self.wait_for_endpoint()).await?;
        debug!(endpoint = endpoint.as_str(), "tool server endpoint discovered");
        self.session.set_state(ConnectionState::Connected);

        let params = initialize_params(&self.options.client_name, &self.options.client_version);
        self.send(method::INITIALIZE, params).await?;
        self.notify(method::INITIALIZED, json!({})).await?;
        self.session.set_state(ConnectionState::Initialized);

        let listed = self.send(method::TOOLS_LIST, json!({})).await?;
        let raw = listed
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(count = raw.len(), "tool catalogue loaded");
        *self.tools.write().unwrap_or_else(PoisonError::into_inner) = normalize(&raw, self.options.format);
        *self.raw_tools.write().unwrap_or_else(PoisonError::into_inner) = raw;
        Ok(())
    }

    async fn wait_for_endpoint(&self) -> Result<String> {
        let mut endpoint = self.session.endpoint.subscribe();
        let mut state = self.session.state.subscribe();
        loop {
            if let Some(url) = endpoint.borrow_and_update().clone() {
                return Ok(url);
            }
            if *state.borrow_and_update() == ConnectionState::Closed {
                return Err(closed());
            }
            tokio::select! {
                changed = endpoint.changed() => changed.map_err(|_| closed())?,
                changed = state.changed() => changed.map_err(|_| closed())?,
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Closed => Err(closed()),
            _ => Ok(()),
        }
    }

    /// Send a request and wait for its correlated response.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_within(method, params, self.options.timeout).await
    }

    /// [`send`](Self::send) with an explicit deadline.
    ///
    /// A request issued before discovery waits for the endpoint within the
    /// same deadline.
    pub async fn send_within(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.ensure_open()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.session.pending.lock().await.insert(id, tx);
        debug!(id, method, "tool server request");

        let outcome = with_timeout(timeout, async {
            let endpoint = self.wait_for_endpoint().await?;
            let message = serde_json::to_value(JsonRpcRequest::request(id, method, params))?;
            self.transport.post(&endpoint, &message).await?;
            rx.await.map_err(|_| closed())?
        })
        .await;

        if outcome.is_err() {
            self.session.pending.lock().await.remove(&id);
        }
        outcome
    }

    /// Send a one-way notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.ensure_open()?;
        with_timeout(self.options.timeout, async {
            let endpoint = self.wait_for_endpoint().await?;
            let message = serde_json::to_value(JsonRpcRequest::notification(method, params))?;
            self.transport.post(&endpoint, &message).await
        })
        .await
    }

    /// Call a tool; resolves with the raw `tools/call` result.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        self.send(method::TOOLS_CALL, json!({ "name": name, "arguments": arguments }))
            .await
    }

    /// Stop the reader, close the push connection and reject every pending
    /// request.
    pub async fn close(&self) {
        self.session.set_state(ConnectionState::Closed);
        let handle = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.session.reject_all(closed).await;
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_url", &self.server_url)
            .field("state", &self.state())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

#[async_trait]
impl ToolExecutor for McpClient {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        let result = McpClient::execute(self, name, arguments).await?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(McpezError::tool(name, error_text(&result)));
        }
        Ok(result)
    }

    fn tools(&self) -> Vec<Value> {
        McpClient::tools(self)
    }
}

fn closed() -> McpezError {
    McpezError::Protocol("connection closed".into())
}

/// Text of an error result's content blocks, or the whole result.
fn error_text(result: &Value) -> String {
    let text: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.is_empty() {
        result.to_string()
    } else {
        text.join("\n")
    }
}

/// Resolve a discovered endpoint against the server URL.
///
/// Root-relative paths resolve against the server's origin; anything else is
/// used as-is.
pub fn resolve_endpoint(server_url: &str, endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if !endpoint.starts_with('/') {
        return Ok(endpoint.to_string());
    }
    let base = reqwest::Url::parse(server_url)
        .map_err(|e| McpezError::Configuration(format!("invalid server url {server_url}: {e}")))?;
    let resolved = base
        .join(endpoint)
        .map_err(|e| McpezError::Protocol(format!("invalid endpoint {endpoint}: {e}")))?;
    Ok(resolved.to_string())
}

async fn read_events(mut stream: PushStream, session: Arc<Session>, server_url: String) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(PushEvent::Open)) => debug!(server = server_url.as_str(), "push connection open"),
            Some(Ok(PushEvent::Message { event, data })) => match event.as_str() {
                "endpoint" => match resolve_endpoint(&server_url, &data) {
                    Ok(url) => {
                        session.endpoint.send_replace(Some(url));
                    }
                    Err(e) => warn!(error = %e, "unusable endpoint event ignored"),
                },
                "message" => session.dispatch(&data).await,
                other => debug!(event = other, "unhandled push event"),
            },
            Some(Err(e)) => break e.to_string(),
            None => break "push connection ended".to_string(),
        }
    };

    debug!(server = server_url.as_str(), reason = reason.as_str(), "tool server stream closed");
    session.set_state(ConnectionState::Closed);
    session.reject_all(|| McpezError::Stream(reason.clone())).await;
}
