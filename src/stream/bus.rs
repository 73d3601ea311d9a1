//! Multi-channel broadcast event bus with continuation chaining.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{McpezError, Result};
use crate::types::{channel, ChatMessage, StreamEvent};

/// One item read from a channel. The error is shared by every reader.
pub type BusItem = std::result::Result<Arc<StreamEvent>, Arc<McpezError>>;

/// Handle to a bus. Clones share the same buffers.
///
/// Every channel keeps its full history; each reader returned by
/// [`EventBus::on`] walks that history with its own cursor.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusState>>,
}

struct BusState {
    channels: HashMap<String, ChannelState>,
    completed: bool,
    chained: Option<EventBus>,
    error: Option<Arc<McpezError>>,
}

#[derive(Default)]
struct ChannelState {
    events: Vec<Arc<StreamEvent>>,
    waiters: VecDeque<oneshot::Sender<()>>,
}

enum Step {
    Event(Arc<StreamEvent>),
    Wait(oneshot::Receiver<()>),
    Continue(EventBus),
    Failed(Arc<McpezError>),
    End,
}

impl EventBus {
    /// Create a bus declaring exactly the given channels.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = channels
            .into_iter()
            .map(|name| (name.into(), ChannelState::default()))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(BusState {
                channels,
                completed: false,
                chained: None,
                error: None,
            })),
        }
    }

    /// Create a bus with the built-in channels plus one per filter name.
    pub fn with_filters<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = channel::BUILTIN
            .iter()
            .map(|name| name.to_string())
            .chain(filters.into_iter().map(Into::into));
        Self::new(names)
    }

    /// An already completed bus holding a single event.
    pub fn finished<I, S>(filters: I, event: StreamEvent) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bus = Self::with_filters(filters);
        let name = event.channel().to_string();
        bus.push(&name, event);
        bus.complete();
        bus
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.lock().channels.contains_key(name)
    }

    /// Declared channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// Append an event and wake the longest-waiting reader of that channel.
    ///
    /// Returns `false` when the bus is completed or the channel is unknown.
    pub fn push(&self, name: &str, event: StreamEvent) -> bool {
        let mut state = self.lock();
        if state.completed {
            return false;
        }
        let Some(ch) = state.channels.get_mut(name) else {
            warn!(channel = name, "push to undeclared channel dropped");
            return false;
        };
        ch.events.push(Arc::new(event));
        while let Some(waiter) = ch.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                break;
            }
        }
        true
    }

    /// Mark the bus complete and release every suspended reader.
    pub fn complete(&self) {
        let mut state = self.lock();
        state.completed = true;
        for ch in state.channels.values_mut() {
            for waiter in ch.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    /// Continue this bus on `next` and complete it.
    pub fn chain_with(&self, next: EventBus) {
        if Arc::ptr_eq(&self.inner, &next.inner) {
            return;
        }
        {
            let mut state = self.lock();
            if state.chained.is_none() {
                state.chained = Some(next);
            }
        }
        self.complete();
    }

    /// Record a terminal error and complete the bus. The first error wins.
    pub fn error(&self, error: McpezError) {
        {
            let mut state = self.lock();
            if state.error.is_none() {
                state.error = Some(Arc::new(error));
            }
        }
        self.complete();
    }

    /// The recorded terminal error, if any.
    pub fn failure(&self) -> Option<Arc<McpezError>> {
        self.lock().error.clone()
    }

    fn step(&self, name: &str, cursor: usize) -> Step {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(ch) = state.channels.get_mut(name) else {
            return Step::End;
        };
        if let Some(event) = ch.events.get(cursor) {
            return Step::Event(Arc::clone(event));
        }
        if let Some(error) = &state.error {
            return Step::Failed(Arc::clone(error));
        }
        if let Some(next) = &state.chained {
            return Step::Continue(next.clone());
        }
        if state.completed {
            return Step::End;
        }
        let (tx, rx) = oneshot::channel();
        ch.waiters.push_back(tx);
        Step::Wait(rx)
    }

    /// Read one channel from the beginning, following the chain.
    ///
    /// The stream ends when the last bus of the chain completes, and yields
    /// the terminal error (once) if that bus failed.
    pub fn on(&self, name: &str) -> Result<BoxStream<'static, BusItem>> {
        if !self.has_channel(name) {
            return Err(McpezError::InvalidArgument(format!("unknown channel: {name}")));
        }
        let name = name.to_string();
        let mut bus = self.clone();

        let stream = async_stream::stream! {
            let mut cursor = 0usize;
            loop {
                match bus.step(&name, cursor) {
                    Step::Event(event) => {
                        cursor += 1;
                        yield Ok(event);
                    }
                    Step::Wait(rx) => {
                        let _ = rx.await;
                    }
                    Step::Continue(next) => {
                        bus = next;
                        cursor = 0;
                    }
                    Step::Failed(error) => {
                        yield Err(error);
                        break;
                    }
                    Step::End => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    /// Wait for the conversation to finish and return the last `final` message.
    pub async fn final_message(&self) -> std::result::Result<Option<ChatMessage>, Arc<McpezError>> {
        let mut reader = self
            .on(channel::FINAL)
            .map_err(Arc::new)?;
        let mut last = None;
        while let Some(item) = reader.next().await {
            if let Some(message) = item?.message() {
                last = Some(message.clone());
            }
        }
        Ok(last)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EventBus")
            .field("channels", &state.channels.len())
            .field("completed", &state.completed)
            .field("chained", &state.chained.is_some())
            .field("error", &state.error)
            .finish()
    }
}
