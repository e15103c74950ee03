pub mod buffer_utils;
pub mod connection;
pub mod listeners;
pub mod streaming;
pub mod transport;

pub use buffer_utils::{parse_sse_stream, CircularLineBuffer, SseFrame, SseFrameParser, SseStream};
pub use connection::{StreamConnection, WATCHDOG_INTERVAL};
pub use listeners::{Listeners, Unsubscribe};
pub use streaming::{decode_frame, ServerEvent};
pub use transport::{HttpTransport, Transport};
