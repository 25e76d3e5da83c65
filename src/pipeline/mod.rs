//! Per-frame processing pipeline: engines, annotation, the run driver, and
//! the controller that owns the dual-run lifecycle.

pub mod annotate;
pub mod controller;
pub mod driver;
pub mod engine;
pub mod sink;

pub use controller::{Controller, RunTimings};
pub use driver::EngineTimings;
pub use engine::{CpuEngine, FeatureEngine, ParallelEngine};
pub use sink::{AnnotatedFrame, DisplaySink, NullSink};
