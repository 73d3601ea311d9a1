//! Shared test helpers: an in-memory tool server, SSE bodies and a recording
//! executor.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::{json, Value};

use mcpez::error::{McpezError, Result};
use mcpez::mcp::{McpTransport, PushEvent, PushStream};
use mcpez::tools::ToolExecutor;

type Handler = dyn Fn(&Value) -> Option<Value> + Send + Sync;

/// A tool server living in memory.
///
/// Opening emits `Open` and, when configured, an `endpoint` event. Each POST
/// is recorded and handed to the handler; a returned envelope is pushed back
/// as a `message` event.
pub struct MemoryTransport {
    endpoint: Option<String>,
    handler: Arc<Handler>,
    events: Mutex<Option<mpsc::UnboundedSender<Result<PushEvent>>>>,
    posted: Mutex<Vec<(String, Value)>>,
    opened: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new(
        endpoint: Option<&str>,
        handler: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.map(str::to_string),
            handler: Arc::new(handler),
            events: Mutex::new(None),
            posted: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        })
    }

    /// A well-behaved server advertising `get_price`.
    pub fn server() -> Arc<Self> {
        Self::new(Some("/messages?session_id=abc"), answer)
    }

    /// A server that never answers anything.
    pub fn silent(endpoint: Option<&str>) -> Arc<Self> {
        Self::new(endpoint, |_| None)
    }

    /// Push an arbitrary event on the open connection.
    pub fn emit(&self, event: PushEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.unbounded_send(Ok(event));
        }
    }

    /// Fail the push connection.
    pub fn fail(&self, message: &str) {
        if let Some(tx) = self.events.lock().unwrap().take() {
            let _ = tx.unbounded_send(Err(McpezError::Stream(message.to_string())));
        }
    }

    /// End the push connection cleanly.
    pub fn disconnect(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn posted_methods(&self) -> Vec<String> {
        self.posted()
            .iter()
            .filter_map(|(_, message)| message["method"].as_str().map(str::to_string))
            .collect()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl McpTransport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<PushStream> {
        let (tx, rx) = mpsc::unbounded();
        let _ = tx.unbounded_send(Ok(PushEvent::Open));
        if let Some(endpoint) = &self.endpoint {
            let _ = tx.unbounded_send(Ok(PushEvent::message("endpoint", endpoint.clone())));
        }
        *self.events.lock().unwrap() = Some(tx);
        self.opened.lock().unwrap().push(url.to_string());
        Ok(rx.boxed())
    }

    async fn post(&self, endpoint: &str, message: &Value) -> Result<()> {
        self.posted
            .lock()
            .unwrap()
            .push((endpoint.to_string(), message.clone()));
        if let Some(response) = (self.handler)(message) {
            self.emit(PushEvent::message("message", response.to_string()));
        }
        Ok(())
    }
}

pub fn get_price_tool() -> Value {
    json!({
        "name": "get_price",
        "description": "Latest price for a ticker",
        "inputSchema": {
            "type": "object",
            "properties": {"symbol": {"type": "string"}},
            "required": ["symbol"]
        }
    })
}

/// Answers for the standard handshake plus `get_price`.
pub fn answer(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let result = match message["method"].as_str()? {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "memory", "version": "0.1.0"}
        }),
        "tools/list" => json!({"tools": [get_price_tool()]}),
        "tools/call" => match message["params"]["name"].as_str() {
            Some("get_price") => json!({
                "content": [{"type": "text", "text": "187.5"}],
                "isError": false
            }),
            _ => json!({
                "content": [{"type": "text", "text": "unknown tool"}],
                "isError": true
            }),
        },
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method not found: {other}")}
            }))
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

/// A streaming chat-completions body: one `data:` line per chunk, then
/// `[DONE]`.
pub fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn content_chunk(text: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
}

pub fn stop_chunk() -> Value {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]})
}

pub fn tool_call_chunk(index: u64, id: &str, name: &str, arguments: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [{
        "index": index,
        "id": id,
        "type": "function",
        "function": {"name": name, "arguments": arguments}
    }]}, "finish_reason": null}]})
}

pub fn tool_finish_chunk() -> Value {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]})
}

/// Records every call; `get_price` answers with a price, anything else fails.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        match name {
            "get_price" => Ok(json!({"symbol": arguments["symbol"], "price": 187.5})),
            other => Err(McpezError::tool(other, "no such tool")),
        }
    }

    fn tools(&self) -> Vec<Value> {
        mcpez::mcp::schema::normalize(&[get_price_tool()], mcpez::mcp::ToolFormat::Function)
    }
}
