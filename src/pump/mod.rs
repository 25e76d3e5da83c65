//! Frame pump: drives the render client through a pose sequence and buffers
//! decoded frames through a bounded single-producer/single-consumer queue.

pub mod pump;
pub mod queue;

pub use pump::FramePump;
pub use queue::{bounded, FrameBuffer, FrameReceiver, FrameSender};

/// Capacity of the frame queue in the reference configuration.
pub const FRAME_QUEUE_CAPACITY: usize = 200;
