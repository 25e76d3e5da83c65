//! The pump thread: walks the pose sequence, renders each frame through the
//! client, and hands owned buffers to the frame queue.
//!
//! The pump owns the render session and the in-flight buffer exclusively.
//! Backpressure is a polled sleep against the queue's high-water mark;
//! cancellation is polled at both suspension points. A frame that was
//! rendered but rejected by a full queue is retained and re-offered on the
//! next iteration without touching the server again.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::flight::Pose;
use crate::pump::queue::{FrameBuffer, FrameSender};
use crate::render::{RenderClient, SessionResult};
use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

/// How long to sleep between backpressure re-checks.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(50);

/// Running pump for one engine run.
pub struct FramePump {
    exit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FramePump {
    /// Connect to the render server and start pumping the first
    /// `max_frames` poses of `path`.
    pub fn connect(
        config: &RenderConfig,
        path: Arc<Vec<Pose>>,
        max_frames: u32,
        sender: FrameSender,
    ) -> SessionResult<Self> {
        let client = RenderClient::connect(&config.host, config.port)?;
        info!(host = %config.host, port = config.port, "render session open");
        Self::launch(client, path, max_frames, sender)
    }

    /// Start pumping over an established session. Camera properties and the
    /// header-offset probe run synchronously before the thread spawns, so a
    /// broken session fails the run before any frame is queued.
    pub fn launch<S>(
        mut client: RenderClient<S>,
        path: Arc<Vec<Pose>>,
        max_frames: u32,
        sender: FrameSender,
    ) -> SessionResult<Self>
    where
        S: Read + Write + Send + 'static,
    {
        match client.get_camera_properties(0)? {
            Some(props) => {
                if props.width as usize != IMAGE_WIDTH || props.height as usize != IMAGE_HEIGHT {
                    warn!(
                        width = props.width,
                        height = props.height,
                        "camera dimensions differ from the compiled {}x{} configuration",
                        IMAGE_WIDTH,
                        IMAGE_HEIGHT
                    );
                }
            }
            None => warn!("render server reported camera 0 as invalid"),
        }

        // One probe render to learn where the pixel data starts.
        let probe = client.get_image()?;
        let pixel_offset = image_start_offset(&probe);
        debug!(pixel_offset, "probed image header offset");

        let exit = Arc::new(AtomicBool::new(false));
        let thread_exit = Arc::clone(&exit);
        let handle = thread::Builder::new()
            .name("frame-pump".to_string())
            .spawn(move || {
                if let Err(err) = pump_loop(
                    &mut client,
                    &path,
                    max_frames,
                    pixel_offset,
                    &sender,
                    &thread_exit,
                ) {
                    warn!(error = %err, "render session failed; ending run");
                }
                if let Err(err) = client.finish() {
                    debug!(error = %err, "goodbye after session teardown failed");
                }
            })?;

        Ok(Self {
            exit,
            handle: Some(handle),
        })
    }

    /// Request cancellation and wait for the pump thread to tear down its
    /// session. Idempotent.
    pub fn stop(&mut self) {
        self.exit.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_loop<S: Read + Write>(
    client: &mut RenderClient<S>,
    path: &[Pose],
    max_frames: u32,
    pixel_offset: usize,
    sender: &FrameSender,
    exit: &AtomicBool,
) -> SessionResult<()> {
    let steps = path.len().min(max_frames as usize);
    let mut pending: Option<FrameBuffer> = None;
    let mut step_idx = 0;

    while step_idx < steps {
        // Stall while the queue sits at its high-water mark.
        while !exit.load(Ordering::SeqCst) && sender.len() >= sender.capacity() {
            thread::sleep(BACKPRESSURE_POLL);
        }
        if exit.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Render only when the previous buffer was accepted; rendering is
        // expensive and a full queue must not discard the work.
        let frame = match pending.take() {
            Some(frame) => frame,
            None => {
                let pose = &path[step_idx];
                client.set_viewpoint_by_degrees(pose)?;
                let data = client.get_image()?;
                FrameBuffer::new(data, pixel_offset)
            }
        };

        match sender.try_send(frame) {
            Ok(()) => step_idx += 1,
            Err(frame) => pending = Some(frame),
        }
    }

    debug!(frames = steps, "pose sequence exhausted");
    Ok(())
}

/// Index just past the second newline of an image body; the server's
/// textual preamble occupies everything before it. Bodies without a
/// recognizable preamble yield offset 0.
pub fn image_start_offset(image: &[u8]) -> usize {
    let mut newlines = 0;
    for (idx, &byte) in image.iter().enumerate() {
        if byte == b'\n' {
            newlines += 1;
            if newlines == 2 {
                return idx + 1;
            }
        }
    }
    0
}
