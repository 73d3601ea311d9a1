//! The streaming round loop: decode, finalize, run tools, continue.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::delta::{DeltaFilter, RoundState, Step};
use super::request::{send, CompletionRequest};
use super::tools::execute_calls;
use crate::config::ChatConfig;
use crate::error::{McpezError, Result};
use crate::stream::{EventBus, Frame, FrameDecoder};
use crate::tools::ToolExecutor;
use crate::types::{channel, StreamEvent};
use crate::util::timeout::with_optional_timeout;

/// Everything a round task needs, detached from the engine.
pub(crate) struct RoundContext {
    pub http: reqwest::Client,
    pub config: ChatConfig,
    pub executor: Option<Arc<dyn ToolExecutor>>,
    pub filters: Arc<[DeltaFilter]>,
}

impl RoundContext {
    pub fn new_bus(&self) -> EventBus {
        EventBus::with_filters(self.filters.iter().map(|filter| filter.name().to_string()))
    }

    fn round_timeout(&self) -> Option<Duration> {
        self.config.round_timeout
    }
}

/// Drive rounds until one ends without a tool continuation.
///
/// Each continuation gets a fresh bus chained onto the previous one, so
/// readers of the first bus see the whole conversation. Failures are
/// recorded on the bus of the round they happened in.
pub(crate) async fn drive(
    ctx: Arc<RoundContext>,
    mut request: CompletionRequest,
    mut response: reqwest::Response,
    mut bus: EventBus,
    cancel: CancellationToken,
) {
    let mut round = 1usize;
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(McpezError::Cancelled),
            outcome = with_optional_timeout(ctx.round_timeout(), run_round(&ctx, &request, response, &bus)) => outcome,
        };

        match outcome {
            Ok(None) => {
                debug!(round, "conversation finished");
                break;
            }
            Ok(Some((next_request, next_response))) => {
                let next_bus = ctx.new_bus();
                bus.chain_with(next_bus.clone());
                bus = next_bus;
                request = next_request;
                response = next_response;
                round += 1;
                debug!(round, "continuing after tool round");
            }
            Err(e) => {
                debug!(round, error = %e, "round failed");
                bus.error(e);
                break;
            }
        }
    }
}

/// Run one round. Returns the follow-up request and its response when the
/// model's tool calls were executed.
async fn run_round(
    ctx: &RoundContext,
    request: &CompletionRequest,
    response: reqwest::Response,
    bus: &EventBus,
) -> Result<Option<(CompletionRequest, reqwest::Response)>> {
    let mut state = RoundState::new(Arc::clone(&ctx.filters));
    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    let mut finalized = false;

    'read: while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in decoder.push(&chunk) {
            if frame == Frame::Done {
                break 'read;
            }
            if state.process(&frame, bus) == Step::Finalize {
                finalized = true;
                break 'read;
            }
        }
    }
    drop(body);

    if !finalized && !decoder.is_done() {
        for frame in decoder.finish() {
            if state.process(&frame, bus) == Step::Finalize {
                finalized = true;
                break;
            }
        }
    }

    if !(finalized || state.ready_at_end()) {
        bus.push(channel::FINAL, StreamEvent::Final { message: state.into_message() });
        bus.complete();
        return Ok(None);
    }

    let (message, calls) = state.into_tool_request();
    if calls.is_empty() {
        debug!("finish signal without named tool calls");
        bus.push(channel::FINAL, StreamEvent::Final { message });
        bus.complete();
        return Ok(None);
    }
    debug!(calls = calls.len(), "model requested tools");
    bus.push(
        channel::TOOL_REQUEST,
        StreamEvent::ToolRequest {
            tool_calls: calls.clone(),
            message: message.clone(),
        },
    );

    let Some(executor) = ctx.executor.as_deref() else {
        bus.push(channel::FINAL, StreamEvent::Final { message });
        bus.complete();
        return Ok(None);
    };

    let results = execute_calls(executor, &calls).await;
    bus.push(
        channel::TOOL_RESPONSE,
        StreamEvent::ToolResponse {
            tool_results: results.clone(),
            tool_calls: calls,
        },
    );

    let next = request.continuation(message, results);
    let response = send(&ctx.http, &ctx.config, &next).await?;
    Ok(Some((next, response)))
}
