//! Chat engine: streams completions onto an event bus and runs tool rounds.

pub mod delta;
pub mod request;
mod round;
pub mod tools;

pub use delta::{DeltaFilter, ToolCallAccumulator};
pub use request::CompletionRequest;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use self::round::{drive, RoundContext};
use crate::config::ChatConfig;
use crate::error::{McpezError, Result};
use crate::stream::EventBus;
use crate::tools::ToolExecutor;
use crate::types::{channel, Attachments, ChatMessage, CreateOptions, StreamEvent};
use crate::util::http::shared_client;

/// Streams chat completions and continues the conversation through tool
/// calls.
///
/// ```no_run
/// # async fn demo() -> mcpez::Result<()> {
/// use futures::StreamExt;
/// use mcpez::prelude::*;
///
/// let engine = ChatEngine::new(ChatConfig::from_env()?);
/// let bus = engine.create("Hello", &Attachments::new()).await?;
/// let mut content = bus.on(channel::CONTENT)?;
/// while let Some(item) = content.next().await {
///     match item.as_deref() {
///         Ok(StreamEvent::Content { content, .. }) => print!("{content}"),
///         Ok(_) => {}
///         Err(e) => eprintln!("stream failed: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatEngine {
    config: ChatConfig,
    http: reqwest::Client,
    executor: Option<Arc<dyn ToolExecutor>>,
    filters: Vec<DeltaFilter>,
    history: Vec<ChatMessage>,
    turns: AtomicU64,
    in_flight: Arc<Mutex<InFlight>>,
}

/// Cancellation handle of the turn currently running, tagged with its turn
/// number so a finished turn only clears its own handle.
#[derive(Debug, Default)]
struct InFlight {
    turn: u64,
    token: Option<CancellationToken>,
}

fn release(slot: &Mutex<InFlight>, turn: u64) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.turn == turn {
        slot.token = None;
    }
}

impl ChatEngine {
    /// Create an engine with the default `reasoning` filter.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            http: shared_client().clone(),
            executor: None,
            filters: vec![DeltaFilter::reasoning()],
            history: Vec::new(),
            turns: AtomicU64::new(0),
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Route deltas matching `predicate` to the channel `name`. Predicates
    /// registered under one name are OR-ed. Built-in channel names are
    /// reserved; such a filter is ignored.
    pub fn with_filter(
        mut self,
        name: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        let filter = DeltaFilter::new(name, predicate);
        if channel::BUILTIN.contains(&filter.name()) {
            warn!(filter = filter.name(), "filter name collides with a built-in channel; ignored");
            return self;
        }
        match self.filters.iter_mut().find(|f| f.name() == filter.name()) {
            Some(existing) => existing.or(filter),
            None => self.filters.push(filter),
        }
        self
    }

    pub fn with_history(mut self, messages: Vec<ChatMessage>) -> Self {
        self.history = messages;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Names of the filter channels every bus from this engine declares.
    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }

    /// Start a conversation turn with the engine's settings.
    pub async fn create(&self, prompt: &str, attachments: &Attachments) -> Result<EventBus> {
        self.create_with(prompt, attachments, CreateOptions::default()).await
    }

    /// Start a conversation turn with per-call overrides.
    ///
    /// Errors from the first request are returned directly. In streaming mode
    /// everything after that is reported on the returned bus.
    pub async fn create_with(
        &self,
        prompt: &str,
        attachments: &Attachments,
        options: CreateOptions,
    ) -> Result<EventBus> {
        let settings = options.apply(&self.config.settings);
        let messages = self.assemble_messages(prompt, attachments, options.messages);
        let tools = self
            .executor
            .as_ref()
            .map(|executor| executor.tools())
            .unwrap_or_default();
        let completion = CompletionRequest::new(
            &settings,
            messages,
            tools,
            &options.tool_choice.unwrap_or_default(),
        );

        let cancel = CancellationToken::new();
        let turn = self.turns.fetch_add(1, Ordering::SeqCst) + 1;
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = InFlight {
            turn,
            token: Some(cancel.clone()),
        };

        let ctx = Arc::new(RoundContext {
            http: self.http.clone(),
            config: self.config.clone(),
            executor: self.executor.clone(),
            filters: Arc::from(self.filters.clone()),
        });

        let response = tokio::select! {
            _ = cancel.cancelled() => Err(McpezError::Cancelled),
            response = request::send(&ctx.http, &ctx.config, &completion) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                release(&self.in_flight, turn);
                return Err(e);
            }
        };

        if !completion.stream {
            release(&self.in_flight, turn);
            let body: Value = response.json().await?;
            let message: ChatMessage = body
                .pointer("/choices/0/message")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_else(|| ChatMessage::assistant(""));
            debug!("non-streaming completion received");
            return Ok(EventBus::finished(
                self.filter_names(),
                StreamEvent::Final { message },
            ));
        }

        let bus = ctx.new_bus();
        let slot = Arc::clone(&self.in_flight);
        let round_bus = bus.clone();
        tokio::spawn(async move {
            drive(ctx, completion, response, round_bus, cancel).await;
            release(&slot, turn);
        });
        Ok(bus)
    }

    /// Cancel the in-flight turn. Readers still waiting on its bus receive
    /// [`McpezError::Cancelled`].
    pub fn cancel(&self) {
        let token = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).token.take();
        if let Some(token) = token {
            debug!("cancelling in-flight completion");
            token.cancel();
        }
    }

    /// Whether a turn started by this engine is still running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .is_some()
    }

    /// System prompt, then history (or the override), then the user turn
    /// when there is a prompt or any attachment.
    fn assemble_messages(
        &self,
        prompt: &str,
        attachments: &Attachments,
        override_messages: Option<Vec<ChatMessage>>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system) = self.config.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(override_messages.unwrap_or_else(|| self.history.clone()));
        if !prompt.is_empty() || !attachments.is_empty() {
            messages.push(ChatMessage::user_with_attachments(prompt, attachments));
        }
        messages
    }
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("config", &self.config)
            .field("tools", &self.executor.is_some())
            .field("filters", &self.filters)
            .field("history", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn engine() -> ChatEngine {
        ChatEngine::new(ChatConfig::default())
            .with_system_prompt("be brief")
            .with_history(vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")])
    }

    #[test]
    fn messages_are_system_history_then_prompt() {
        let messages = engine().assemble_messages("now", &Attachments::new(), None);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[3].text(), "now");
    }

    #[test]
    fn override_replaces_history_and_empty_prompt_adds_nothing() {
        let messages = engine().assemble_messages("", &Attachments::new(), Some(vec![ChatMessage::user("only")]));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text(), "only");
    }

    #[test]
    fn attachments_alone_add_a_user_turn() {
        let attachments = Attachments::new().image("https://x/cat.png");
        let messages = ChatEngine::new(ChatConfig::default()).assemble_messages("", &attachments, None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn builtin_channel_names_are_reserved_for_filters() {
        let engine = ChatEngine::new(ChatConfig::default())
            .with_filter(channel::CONTENT, |_| true)
            .with_filter(channel::FINAL, |_| true)
            .with_filter("usage", |delta| delta.get("usage").is_some());
        assert_eq!(engine.filter_names(), vec!["reasoning", "usage"]);
    }

    #[test]
    fn release_clears_only_the_matching_turn() {
        let slot = Mutex::new(InFlight {
            turn: 2,
            token: Some(CancellationToken::new()),
        });
        release(&slot, 1);
        assert!(slot.lock().unwrap().token.is_some());
        release(&slot, 2);
        assert!(slot.lock().unwrap().token.is_none());
    }

    #[test]
    fn filters_with_one_name_share_a_channel() {
        let engine = ChatEngine::new(ChatConfig::default())
            .with_filter("usage", |delta| delta.get("usage").is_some())
            .with_filter("usage", |delta| delta.get("x_usage").is_some());
        assert_eq!(engine.filter_names(), vec!["reasoning", "usage"]);
        let usage = &engine.filters[1];
        assert!(usage.matches(&serde_json::json!({"x_usage": {}})));
    }
}
