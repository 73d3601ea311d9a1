//! Streaming primitives: the frame decoder and the event bus.

pub mod bus;
pub mod frame;

pub use bus::{BusItem, EventBus};
pub use frame::{Frame, FrameDecoder, Payload};
