//! Per-round delta processing: filters, tool-call accumulation and content.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::stream::{EventBus, Frame, Payload};
use crate::types::{channel, ChatMessage, FinishReason, StreamEvent, ToolCall};

type Predicate = dyn Fn(&Value) -> bool + Send + Sync;

/// A named delta filter. A delta matching any predicate is pushed to the
/// channel of the same name.
#[derive(Clone)]
pub struct DeltaFilter {
    name: String,
    predicates: Vec<Arc<Predicate>>,
}

impl DeltaFilter {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicates: vec![Arc::new(predicate)],
        }
    }

    /// Deltas carrying `choices[0].delta.reasoning`.
    pub fn reasoning() -> Self {
        Self::new("reasoning", |delta| {
            delta
                .pointer("/choices/0/delta/reasoning")
                .is_some_and(is_truthy)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn or(&mut self, other: DeltaFilter) {
        self.predicates.extend(other.predicates);
    }

    pub fn matches(&self, delta: &Value) -> bool {
        self.predicates.iter().any(|predicate| predicate(delta))
    }
}

impl std::fmt::Debug for DeltaFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaFilter")
            .field("name", &self.name)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Tool calls assembled from streamed fragments, keyed by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u64, ToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of fragments.
    ///
    /// The first fragment for an index creates the slot. Id and name are set
    /// once; argument text is appended. Fragments without an index use their
    /// position in the batch.
    pub fn merge(&mut self, fragments: &[Value]) {
        for (position, fragment) in fragments.iter().enumerate() {
            let index = fragment
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let call = self.calls.entry(index).or_insert_with(ToolCall::empty);

            if let Some(id) = fragment.get("id").and_then(Value::as_str) {
                if call.id.is_empty() {
                    call.id = id.to_string();
                }
            }
            let Some(function) = fragment.get("function") else {
                continue;
            };
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                if call.function.name.is_empty() {
                    call.function.name = name.to_string();
                }
            }
            match function.get("arguments") {
                Some(Value::String(text)) => call.function.arguments.push_str(text),
                // Some servers send the arguments already decoded.
                Some(args @ (Value::Object(_) | Value::Array(_))) => {
                    call.function.arguments.push_str(&args.to_string());
                }
                _ => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Calls in index order.
    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.values().cloned().collect()
    }

    pub fn all_named(&self) -> bool {
        self.calls.values().all(ToolCall::is_complete)
    }

    pub fn all_have_arguments(&self) -> bool {
        self.calls.values().all(|call| !call.function.arguments.is_empty())
    }

    /// Named calls ready to execute; missing ids are synthesized. Slots that
    /// never received a name are dropped.
    pub fn finish(&self) -> Vec<ToolCall> {
        self.calls
            .values()
            .filter(|call| call.is_complete())
            .cloned()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                }
                call
            })
            .collect()
    }
}

/// Whether the round keeps reading after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The model finished requesting tools.
    Finalize,
}

/// What one streaming round has accumulated so far.
#[derive(Debug)]
pub struct RoundState {
    message: ChatMessage,
    calls: ToolCallAccumulator,
    filters: Arc<[DeltaFilter]>,
}

impl RoundState {
    pub fn new(filters: Arc<[DeltaFilter]>) -> Self {
        Self {
            message: ChatMessage::assistant(""),
            calls: ToolCallAccumulator::new(),
            filters,
        }
    }

    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    pub fn calls(&self) -> &ToolCallAccumulator {
        &self.calls
    }

    /// Apply one frame, pushing the resulting events.
    pub fn process(&mut self, frame: &Frame, bus: &EventBus) -> Step {
        let Frame::Data { event, payload } = frame else {
            return Step::Continue;
        };
        let delta = payload.to_value();

        for filter in self.filters.iter() {
            if filter.matches(&delta) {
                bus.push(
                    filter.name(),
                    StreamEvent::Filtered {
                        channel: filter.name().to_string(),
                        message: self.message.clone(),
                        delta: delta.clone(),
                    },
                );
            }
        }

        match payload {
            Payload::Json(Value::Object(_)) => self.process_chunk(delta, bus),
            Payload::Json(Value::Array(fragments)) if event.as_deref() == Some(channel::TOOL_CALLS) => {
                self.calls.merge(fragments);
                self.push_tool_calls(delta.clone(), bus);
                if self.calls.all_have_arguments() {
                    Step::Finalize
                } else {
                    Step::Continue
                }
            }
            Payload::Json(Value::Array(_)) | Payload::Json(Value::Null) => Step::Continue,
            Payload::Json(Value::String(text)) | Payload::Raw(text) => {
                if event.as_deref() != Some(channel::TOOL_CALLS) {
                    self.push_content(text, bus);
                }
                Step::Continue
            }
            Payload::Json(scalar) => {
                self.push_content(&scalar.to_string(), bus);
                Step::Continue
            }
        }
    }

    fn process_chunk(&mut self, chunk: Value, bus: &EventBus) -> Step {
        let Some(choice) = chunk.pointer("/choices/0") else {
            return Step::Continue;
        };
        let finished_for_tools = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .and_then(|reason| reason.parse::<FinishReason>().ok())
            == Some(FinishReason::ToolCalls);

        if let Some(fragments) = choice.pointer("/delta/tool_calls").and_then(Value::as_array) {
            self.calls.merge(fragments);
            self.push_tool_calls(chunk.clone(), bus);
            return if finished_for_tools {
                Step::Finalize
            } else {
                Step::Continue
            };
        }

        if let Some(text) = choice.pointer("/delta/content").and_then(Value::as_str) {
            self.push_content(text, bus);
        }

        if finished_for_tools && !self.calls.is_empty() {
            Step::Finalize
        } else {
            Step::Continue
        }
    }

    fn push_tool_calls(&self, delta: Value, bus: &EventBus) {
        bus.push(
            channel::TOOL_CALLS,
            StreamEvent::ToolCalls {
                tool_calls: self.calls.calls(),
                message: self.message.clone(),
                delta,
            },
        );
    }

    fn push_content(&mut self, text: &str, bus: &EventBus) {
        if text.is_empty() {
            return;
        }
        self.message.content.push_str(text);
        bus.push(
            channel::CONTENT,
            StreamEvent::Content {
                content: text.to_string(),
                message: self.message.clone(),
            },
        );
    }

    /// At end of stream, a non-empty and fully named buffer still finalizes.
    pub fn ready_at_end(&self) -> bool {
        !self.calls.is_empty() && self.calls.all_named()
    }

    /// The finished assistant message carrying its complete tool calls.
    /// With none complete the message carries no calls.
    pub fn into_tool_request(self) -> (ChatMessage, Vec<ToolCall>) {
        let calls = self.calls.finish();
        let mut message = self.message;
        if !calls.is_empty() {
            message.tool_calls = Some(calls.clone());
        }
        (message, calls)
    }

    /// The finished assistant message without tool calls.
    pub fn into_message(self) -> ChatMessage {
        self.message
    }
}
