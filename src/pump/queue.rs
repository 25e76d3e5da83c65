//! Bounded single-producer/single-consumer channel of owned frame buffers.
//!
//! Thin wrapper over a bounded crossbeam channel: the split halves enforce
//! the single-producer/single-consumer contract at the type level, and
//! buffer ownership transfers through the channel so nothing is copied,
//! dropped early, or leaked when a side shuts down.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

/// One rendered image as received from the server.
///
/// The server prefixes the pixel data with a short textual preamble;
/// `pixel_offset` marks where the grayscale samples begin.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    pixel_offset: usize,
}

impl FrameBuffer {
    pub fn new(data: Vec<u8>, pixel_offset: usize) -> Self {
        let pixel_offset = pixel_offset.min(data.len());
        Self { data, pixel_offset }
    }

    /// Grayscale samples past the textual preamble.
    pub fn pixels(&self) -> &[u8] {
        &self.data[self.pixel_offset..]
    }

    /// Whole reply body, preamble included.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }
}

/// Producer half, owned by the pump thread.
pub struct FrameSender {
    tx: Sender<FrameBuffer>,
    capacity: usize,
}

/// Consumer half, owned by the pipeline thread.
pub struct FrameReceiver {
    rx: Receiver<FrameBuffer>,
}

/// Create a frame queue with the given fixed capacity.
pub fn bounded(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (FrameSender { tx, capacity }, FrameReceiver { rx })
}

impl FrameSender {
    /// Non-blocking enqueue. On a full (or disconnected) queue the buffer is
    /// handed back so the caller can retry without re-rendering.
    pub fn try_send(&self, frame: FrameBuffer) -> Result<(), FrameBuffer> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => Err(frame),
        }
    }

    /// Approximate number of queued frames, for the backpressure check.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl FrameReceiver {
    /// Block up to `timeout` for the next frame. `None` on timeout or when
    /// the producer is gone and the queue has drained; both mean end of
    /// stream to the consumer.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameBuffer> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drop every frame still queued; returns how many were released.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while self.rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
