//! Client side of the render-server wire protocol.
//!
//! The server speaks a message-per-request binary protocol over a TCP
//! stream: every request is a 32-bit code followed by typed parameters, and
//! every response is a 32-bit code followed by typed results. All multi-byte
//! scalars travel in network byte order; floating-point values use the
//! renderer's own packed layout (see [`codec`]).

pub mod client;
pub mod codec;
pub mod messages;

pub use client::{CameraProperties, RenderClient, SessionError, SessionResult};
pub use messages::{ClientMessage, ServerMessage};
