//! Controller: the in-process surface a front end drives.
//!
//! `start` validates configuration synchronously, then a processing thread
//! executes two engine runs back to back over the same pose sequence — the
//! reference engine first, the accelerated one second. Each run gets its own
//! pump, session, and frame queue; the controller owns the cancellation
//! flag and the progress counters both runs report through.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{RenderConfig, TrackingSettings};
use crate::flight::{self, Pose};
use crate::pipeline::annotate::{Pen, ACCEL_PEN, CPU_PEN};
use crate::pipeline::driver::{run_engine, EngineTimings};
use crate::pipeline::engine::{CpuEngine, FeatureEngine, ParallelEngine};
use crate::pipeline::sink::DisplaySink;
use crate::pump::{self, FramePump, FRAME_QUEUE_CAPACITY};

/// Which of the two back-to-back runs an engine occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSlot {
    Cpu,
    Accelerated,
}

impl EngineSlot {
    pub fn pen(self) -> Pen {
        match self {
            EngineSlot::Cpu => CPU_PEN,
            EngineSlot::Accelerated => ACCEL_PEN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EngineSlot::Cpu => "cpu",
            EngineSlot::Accelerated => "accelerated",
        }
    }
}

/// State shared between the controller, the pump, and the run driver.
pub struct RunState {
    cancel: AtomicBool,
    max_frames: AtomicU32,
    cpu_frames: AtomicU32,
    accel_frames: AtomicU32,
}

impl RunState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cancel: AtomicBool::new(false),
            max_frames: AtomicU32::new(0),
            cpu_frames: AtomicU32::new(0),
            accel_frames: AtomicU32::new(0),
        })
    }

    /// Prepare for a fresh run: clear cancellation and progress.
    pub fn reset(&self, max_frames: u32) {
        self.cancel.store(false, Ordering::SeqCst);
        self.max_frames.store(max_frames, Ordering::SeqCst);
        self.cpu_frames.store(0, Ordering::SeqCst);
        self.accel_frames.store(0, Ordering::SeqCst);
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn max_frames(&self) -> u32 {
        self.max_frames.load(Ordering::SeqCst)
    }

    pub fn record_frame(&self, slot: EngineSlot) {
        match slot {
            EngineSlot::Cpu => self.cpu_frames.fetch_add(1, Ordering::SeqCst),
            EngineSlot::Accelerated => self.accel_frames.fetch_add(1, Ordering::SeqCst),
        };
    }

    /// Completion percentage of one slot, 0-100.
    pub fn progress(&self, slot: EngineSlot) -> u32 {
        let max = self.max_frames.load(Ordering::SeqCst);
        if max == 0 {
            return 0;
        }
        let done = match slot {
            EngineSlot::Cpu => self.cpu_frames.load(Ordering::SeqCst),
            EngineSlot::Accelerated => self.accel_frames.load(Ordering::SeqCst),
        };
        (done * 100 / max).min(100)
    }
}

/// Timings of both runs, retained for inspection after completion.
#[derive(Debug, Clone, Default)]
pub struct RunTimings {
    pub cpu: EngineTimings,
    pub accelerated: EngineTimings,
}

/// Owns the processing thread and the run lifecycle.
pub struct Controller {
    tracking: TrackingSettings,
    render: RenderConfig,
    flight_path: Option<PathBuf>,
    state: Arc<RunState>,
    sink: Arc<Mutex<Box<dyn DisplaySink>>>,
    timings: Arc<Mutex<RunTimings>>,
    handle: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(
        tracking: TrackingSettings,
        render: RenderConfig,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            tracking,
            render,
            flight_path: None,
            state: RunState::new(),
            sink: Arc::new(Mutex::new(sink)),
            timings: Arc::new(Mutex::new(RunTimings::default())),
            handle: None,
        }
    }

    pub fn set_flight_path<P: Into<PathBuf>>(&mut self, path: P) {
        self.flight_path = Some(path.into());
    }

    /// Validate configuration, load the flight file, and launch the dual
    /// runs. Fails synchronously, with no side effects, on bad settings or
    /// an unreadable flight file.
    pub fn start(&mut self) -> Result<()> {
        if let Some(handle) = &self.handle {
            if handle.is_finished() {
                self.join();
            } else {
                bail!("a run is already in progress");
            }
        }

        self.tracking.validate()?;
        let flight_path = self
            .flight_path
            .as_ref()
            .context("no flight file configured")?;
        let poses = flight::read_flight_path(flight_path)?;
        if poses.is_empty() {
            bail!("flight file {} contains no poses", flight_path.display());
        }

        let mut settings = self.tracking.clone();
        settings.max_frames = settings.max_frames.min(poses.len() as u32);
        self.state.reset(settings.max_frames);
        *self.timings.lock() = RunTimings::default();

        let render = self.render.clone();
        let poses: Arc<Vec<Pose>> = Arc::new(poses);
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let timings = Arc::clone(&self.timings);

        self.handle = Some(
            thread::Builder::new()
                .name("pipeline".to_string())
                .spawn(move || run_dual(settings, render, poses, state, sink, timings))?,
        );
        Ok(())
    }

    /// Cancel the current run (if any) and wait for the processing thread.
    pub fn stop(&mut self) {
        self.state.request_cancel();
        self.join();
    }

    /// Wait for the current run to finish on its own.
    pub fn wait(&mut self) {
        self.join();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Snapshot of both runs' timings.
    pub fn timings(&self) -> RunTimings {
        self.timings.lock().clone()
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_dual(
    settings: TrackingSettings,
    render: RenderConfig,
    poses: Arc<Vec<Pose>>,
    state: Arc<RunState>,
    sink: Arc<Mutex<Box<dyn DisplaySink>>>,
    timings: Arc<Mutex<RunTimings>>,
) {
    for slot in [EngineSlot::Cpu, EngineSlot::Accelerated] {
        if state.is_cancelled() {
            break;
        }
        let mut engine: Box<dyn FeatureEngine> = match slot {
            EngineSlot::Cpu => Box::new(CpuEngine::new(&settings)),
            EngineSlot::Accelerated => Box::new(ParallelEngine::new(&settings)),
        };

        let (sender, receiver) = pump::bounded(FRAME_QUEUE_CAPACITY);
        match FramePump::connect(&render, Arc::clone(&poses), settings.max_frames, sender) {
            Ok(mut pump) => {
                let run = run_engine(engine.as_mut(), &receiver, &sink, &state, slot);
                pump.stop();
                receiver.drain();

                info!(
                    engine = slot.label(),
                    frames = run.frames(),
                    average_ms = run.average_ms().unwrap_or(0.0),
                    max_ms = run.max_frame_time_ms,
                    total_ms = run.total_ms,
                    "engine run complete"
                );
                let mut guard = timings.lock();
                match slot {
                    EngineSlot::Cpu => guard.cpu = run,
                    EngineSlot::Accelerated => guard.accelerated = run,
                }
            }
            Err(err) => {
                warn!(
                    engine = slot.label(),
                    error = %err,
                    "could not open render session; skipping run"
                );
            }
        }
    }
    sink.lock().run_finished();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sink::{AnnotatedFrame, NullSink};
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;

    fn flight_file(name: &str, poses: usize) -> PathBuf {
        let dir = std::env::temp_dir().join("terratrack_controller_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "view craft").unwrap();
        for i in 0..poses {
            writeln!(file, "start {} 0 100 0 0 0", i).unwrap();
        }
        path
    }

    struct FinishFlag {
        finished: Arc<AtomicUsize>,
    }

    impl DisplaySink for FinishFlag {
        fn frame_ready(&mut self, _frame: AnnotatedFrame, _cpu: u32, _accel: u32) {}
        fn run_finished(&mut self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Endpoint nothing listens on; connects fail fast.
    fn unreachable_render() -> RenderConfig {
        RenderConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
        }
    }

    #[test]
    fn test_start_without_flight_file_fails() {
        let mut controller = Controller::new(
            TrackingSettings::default(),
            unreachable_render(),
            Box::new(NullSink),
        );
        assert!(controller.start().is_err());
    }

    #[test]
    fn test_start_with_bad_settings_fails() {
        let mut controller = Controller::new(
            TrackingSettings {
                max_frames: 0,
                ..Default::default()
            },
            unreachable_render(),
            Box::new(NullSink),
        );
        controller.set_flight_path(flight_file("bad_settings.fli", 3));
        assert!(controller.start().is_err());
        assert!(!controller.is_running());
    }

    #[test]
    fn test_start_with_empty_flight_file_fails() {
        let mut controller = Controller::new(
            TrackingSettings::default(),
            unreachable_render(),
            Box::new(NullSink),
        );
        controller.set_flight_path(flight_file("empty.fli", 0));
        assert!(controller.start().is_err());
    }

    #[test]
    fn test_session_failure_still_finishes_run() {
        let finished = Arc::new(AtomicUsize::new(0));
        let sink = FinishFlag {
            finished: Arc::clone(&finished),
        };
        let mut controller = Controller::new(
            TrackingSettings::default(),
            unreachable_render(),
            Box::new(sink),
        );
        controller.set_flight_path(flight_file("no_server.fli", 3));

        controller.start().unwrap();
        controller.wait();

        // Both sessions failed to open; the run still completes cleanly
        // with empty timings and exactly one finish notification.
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        let timings = controller.timings();
        assert_eq!(timings.cpu.frames(), 0);
        assert_eq!(timings.accelerated.frames(), 0);
        assert_eq!(controller.state.progress(EngineSlot::Cpu), 0);
    }

    #[test]
    fn test_restart_after_completion_is_allowed() {
        let mut controller = Controller::new(
            TrackingSettings::default(),
            unreachable_render(),
            Box::new(NullSink),
        );
        controller.set_flight_path(flight_file("restart.fli", 2));

        controller.start().unwrap();
        controller.wait();
        controller.start().unwrap();
        controller.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut controller = Controller::new(
            TrackingSettings::default(),
            unreachable_render(),
            Box::new(NullSink),
        );
        controller.set_flight_path(flight_file("stop.fli", 2));
        controller.start().unwrap();
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());
    }
}
