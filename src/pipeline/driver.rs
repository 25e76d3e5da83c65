//! The per-run frame loop: dequeue, process, annotate, emit.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::pipeline::annotate::{self, PIXEL_BYTES};
use crate::pipeline::controller::{EngineSlot, RunState};
use crate::pipeline::engine::FeatureEngine;
use crate::pipeline::sink::{AnnotatedFrame, DisplaySink};
use crate::pump::FrameReceiver;
use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

/// How long the consumer waits for a frame before treating the stream as
/// finished. There is no retry: the pump either feeds the queue well inside
/// this window or the session is gone.
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Wall-clock measurements of one engine run.
#[derive(Debug, Clone, Default)]
pub struct EngineTimings {
    /// Per-frame detect+track time, in the order frames were processed.
    pub frame_times_ms: Vec<f64>,
    pub total_ms: f64,
    pub max_frame_time_ms: f64,
}

impl EngineTimings {
    fn record(&mut self, elapsed_ms: f64) {
        self.frame_times_ms.push(elapsed_ms);
        self.total_ms += elapsed_ms;
        if elapsed_ms > self.max_frame_time_ms {
            self.max_frame_time_ms = elapsed_ms;
        }
    }

    pub fn frames(&self) -> usize {
        self.frame_times_ms.len()
    }

    pub fn average_ms(&self) -> Option<f64> {
        if self.frame_times_ms.is_empty() {
            None
        } else {
            Some(self.total_ms / self.frame_times_ms.len() as f64)
        }
    }
}

/// Drain the frame queue through one engine until the pose budget is spent,
/// the stream ends, or the run is cancelled. Only the engine step is timed;
/// annotation and sink delivery stay outside the measurement.
pub fn run_engine(
    engine: &mut dyn FeatureEngine,
    frames: &FrameReceiver,
    sink: &Mutex<Box<dyn DisplaySink>>,
    state: &RunState,
    slot: EngineSlot,
) -> EngineTimings {
    let mut timings = EngineTimings::default();
    let mut bgr = vec![0u8; IMAGE_WIDTH * IMAGE_HEIGHT * PIXEL_BYTES];

    for _ in 0..state.max_frames() {
        if state.is_cancelled() {
            break;
        }
        let Some(buffer) = frames.recv_timeout(DEQUEUE_TIMEOUT) else {
            debug!(engine = engine.name(), "frame stream ended");
            break;
        };

        let pixels = buffer.pixels();
        if pixels.len() < IMAGE_WIDTH * IMAGE_HEIGHT {
            warn!(len = pixels.len(), "undersized frame dropped");
            continue;
        }
        let pixels = &pixels[..IMAGE_WIDTH * IMAGE_HEIGHT];

        annotate::gray_to_bgr(pixels, &mut bgr);

        let started = Instant::now();
        let tracks = engine.process_frame(pixels);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        annotate::draw_trails(&mut bgr, IMAGE_WIDTH, IMAGE_HEIGHT, tracks, slot.pen());
        timings.record(elapsed_ms);
        state.record_frame(slot);

        sink.lock().frame_ready(
            AnnotatedFrame {
                width: IMAGE_WIDTH,
                height: IMAGE_HEIGHT,
                bgr: bgr.clone(),
            },
            state.progress(EngineSlot::Cpu),
            state.progress(EngineSlot::Accelerated),
        );
    }
    timings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingSettings;
    use crate::pipeline::engine::CpuEngine;
    use crate::pump::{self, FrameBuffer};
    use std::sync::Arc;

    #[derive(Default)]
    struct Captured {
        frames: Vec<(u32, u32)>,
        last_bgr: Vec<u8>,
    }

    /// Sink that mirrors everything into shared state the test can read.
    struct CapturingSink {
        captured: Arc<Mutex<Captured>>,
    }

    impl CapturingSink {
        fn pair() -> (Box<dyn DisplaySink>, Arc<Mutex<Captured>>) {
            let captured = Arc::new(Mutex::new(Captured::default()));
            let sink = CapturingSink {
                captured: Arc::clone(&captured),
            };
            (Box::new(sink), captured)
        }
    }

    impl DisplaySink for CapturingSink {
        fn frame_ready(&mut self, frame: AnnotatedFrame, cpu: u32, accel: u32) {
            let mut captured = self.captured.lock();
            captured.frames.push((cpu, accel));
            captured.last_bgr = frame.bgr;
        }
        fn run_finished(&mut self) {}
    }

    fn reference_frame(cx: usize, cy: usize) -> FrameBuffer {
        let mut data = vec![128u8; IMAGE_WIDTH * IMAGE_HEIGHT];
        for y in cy - 1..=cy + 1 {
            for x in cx - 1..=cx + 1 {
                data[y * IMAGE_WIDTH + x] = 255;
            }
        }
        FrameBuffer::new(data, 0)
    }

    fn settings() -> TrackingSettings {
        TrackingSettings {
            harris_response_threshold: 1e8,
            correlation_threshold: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_processes_frames_in_order_and_reports_progress() {
        let (tx, rx) = pump::bounded(8);
        tx.try_send(reference_frame(512, 384)).unwrap();
        tx.try_send(reference_frame(514, 384)).unwrap();
        drop(tx); // stream ends after two frames

        let state = RunState::new();
        state.reset(2);
        let (sink, captured) = CapturingSink::pair();
        let sink = Mutex::new(sink);
        let mut engine = CpuEngine::new(&settings());

        let timings = run_engine(&mut engine, &rx, &sink, &state, EngineSlot::Cpu);

        assert_eq!(timings.frames(), 2);
        assert!(timings.average_ms().unwrap() > 0.0);
        assert!(timings.max_frame_time_ms <= timings.total_ms);
        assert_eq!(state.progress(EngineSlot::Cpu), 100);
        assert_eq!(state.progress(EngineSlot::Accelerated), 0);
        // Progress announced alongside each frame: 50% then 100%.
        assert_eq!(captured.lock().frames, [(50, 0), (100, 0)]);
    }

    #[test]
    fn test_annotation_lands_on_track() {
        let (tx, rx) = pump::bounded(4);
        tx.try_send(reference_frame(512, 384)).unwrap();
        drop(tx);

        let state = RunState::new();
        state.reset(1);
        let (sink, captured) = CapturingSink::pair();
        let sink = Mutex::new(sink);
        let mut engine = CpuEngine::new(&settings());
        run_engine(&mut engine, &rx, &sink, &state, EngineSlot::Cpu);

        // The admitted track has age 0, so no trail is drawn yet; the frame
        // is a plain BGR expansion with the impulse intact.
        let captured = captured.lock();
        assert_eq!(captured.frames, [(100, 0)]);
        let idx = (384 * IMAGE_WIDTH + 512) * PIXEL_BYTES;
        assert_eq!(&captured.last_bgr[idx..idx + 3], &[255, 255, 255]);
    }

    #[test]
    fn test_timeout_ends_run_without_frames() {
        let (_tx, rx) = pump::bounded(2);
        let state = RunState::new();
        state.reset(5);
        let sink: Mutex<Box<dyn DisplaySink>> = Mutex::new(Box::new(crate::pipeline::NullSink));
        let mut engine = CpuEngine::new(&settings());

        // Producer never sends and disconnects immediately.
        drop(_tx);
        let timings = run_engine(&mut engine, &rx, &sink, &state, EngineSlot::Cpu);
        assert_eq!(timings.frames(), 0);
        assert!(timings.average_ms().is_none());
    }

    #[test]
    fn test_cancellation_stops_the_loop() {
        let (tx, rx) = pump::bounded(8);
        for _ in 0..4 {
            tx.try_send(reference_frame(512, 384)).unwrap();
        }
        let state = RunState::new();
        state.reset(4);
        state.request_cancel();
        let sink: Mutex<Box<dyn DisplaySink>> = Mutex::new(Box::new(crate::pipeline::NullSink));
        let mut engine = CpuEngine::new(&settings());

        let timings = run_engine(&mut engine, &rx, &sink, &state, EngineSlot::Cpu);
        assert_eq!(timings.frames(), 0);
        assert_eq!(rx.drain(), 4);
    }
}
