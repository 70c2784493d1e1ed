//! Server push: SSE decoding, typed events, planning and dispatch.

pub mod dispatch;
pub mod planner;
pub mod realtime;
pub mod sse;
pub mod subscriber;
pub mod types;

pub use dispatch::IntentApplier;
pub use planner::{plan, Intent};
pub use realtime::RealtimeNotifications;
pub use sse::{SseDecoder, SseFrame};
pub use subscriber::{
    EventStreamSubscriber, FrameStream, HttpStreamConnector, StreamConnector, StreamError,
};
pub use types::{EventDecodeError, EventKind, ServerEvent};
