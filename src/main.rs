use anyhow::Result;
use tracing::{debug, info};

use terratrack::config::{RenderConfig, RunConfig, TrackingSettings};
use terratrack::pipeline::{AnnotatedFrame, Controller, DisplaySink};

/// Sink for headless runs: progress to the log, frames dropped.
struct LogSink {
    frames_seen: usize,
}

impl DisplaySink for LogSink {
    fn frame_ready(&mut self, frame: AnnotatedFrame, cpu_progress: u32, accel_progress: u32) {
        self.frames_seen += 1;
        debug!(
            width = frame.width,
            height = frame.height,
            cpu_progress,
            accel_progress,
            "frame ready"
        );
    }

    fn run_finished(&mut self) {
        info!(frames = self.frames_seen, "processing finished");
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let flight_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/flight.fli".to_string());
    let (tracking, render) = match std::env::args().nth(2) {
        Some(config_path) => {
            let config = RunConfig::from_yaml(&config_path)?;
            (config.tracking, config.render)
        }
        None => (TrackingSettings::default(), RenderConfig::default()),
    };

    info!(flight = %flight_path, host = %render.host, port = render.port, "starting dual run");

    let mut controller = Controller::new(tracking, render, Box::new(LogSink { frames_seen: 0 }));
    controller.set_flight_path(flight_path);
    controller.start()?;
    controller.wait();

    let timings = controller.timings();
    for (label, run) in [("cpu", &timings.cpu), ("accelerated", &timings.accelerated)] {
        match run.average_ms() {
            Some(average) => info!(
                engine = label,
                frames = run.frames(),
                average_ms = format!("{average:.2}"),
                max_ms = format!("{:.2}", run.max_frame_time_ms),
                total_s = format!("{:.2}", run.total_ms / 1000.0),
                "run statistics"
            ),
            None => info!(engine = label, "no frames processed"),
        }
    }
    Ok(())
}
