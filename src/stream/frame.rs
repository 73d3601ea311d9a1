//! Line-oriented decoding of streamed completion bodies into frames.

use serde_json::Value;

/// Payload of a data frame: parsed JSON, or the raw text when it isn't JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(String),
}

impl Payload {
    fn parse(text: &str) -> Self {
        serde_json::from_str(text)
            .map(Payload::Json)
            .unwrap_or_else(|_| Payload::Raw(text.to_string()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// The payload as a JSON value (raw text becomes a JSON string).
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Raw(text) => Value::String(text.clone()),
        }
    }
}

/// A decoded unit of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A data line, tagged with the `event:` type that preceded it.
    Data {
        event: Option<String>,
        payload: Payload,
    },
    /// The `data: [DONE]` sentinel.
    Done,
}

/// Incremental SSE-style decoder.
///
/// Bytes are buffered until a newline so that neither lines nor multi-byte
/// UTF-8 sequences depend on where the transport split the body.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    pending_event: Option<String>,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            self.classify(&line, &mut frames);
            if self.done {
                break;
            }
        }

        if self.done {
            self.buffer.clear();
        } else {
            self.buffer.drain(..start);
        }
        frames
    }

    /// Flush the trailing partial line at end of input.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.classify(&line, &mut frames);
        frames
    }

    fn classify(&mut self, line: &str, frames: &mut Vec<Frame>) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return;
        }

        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                self.pending_event = None;
                frames.push(Frame::Done);
                return;
            }
            frames.push(Frame::Data {
                event: self.pending_event.take(),
                payload: Payload::parse(data),
            });
        } else if let Some(event) = line.strip_prefix("event:") {
            self.pending_event = Some(event.trim().to_string());
        } else {
            frames.push(Frame::Data {
                event: None,
                payload: Payload::parse(line),
            });
        }
    }
}
