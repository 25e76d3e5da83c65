//! Run configuration: detector/tracker tuning and the render-server endpoint.
//!
//! Both structures deserialize from YAML so a front end can ship a settings
//! file next to its flight files; `TrackingSettings::validate` is called by
//! the controller before any thread is spawned, so bad values fail the run
//! synchronously with no side effects.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Detector and tracker tuning for a single run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Hard cap on frames processed per run. Clamped to the flight length.
    pub max_frames: u32,
    /// Harris sensitivity `k` in R = det(M) - k * trace(M)^2.
    pub sensitivity: f32,
    /// Upper bound on simultaneously tracked features.
    pub max_tracked_features: usize,
    /// Minimum corner response for a detection candidate.
    pub harris_response_threshold: f32,
    /// Minimum normalized cross-correlation for track continuation.
    pub correlation_threshold: f32,
    /// Frames between template refreshes.
    pub template_update_frames: u32,
    /// Maximum disagreement between primary and alternate search results
    /// on a cross-check frame, in pixels.
    pub template_update_distance_threshold: f32,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            max_frames: 1000,
            sensitivity: 0.04,
            max_tracked_features: 200,
            harris_response_threshold: 1_000_000.0,
            correlation_threshold: 0.9,
            template_update_frames: 10,
            template_update_distance_threshold: 4.0,
        }
    }
}

impl TrackingSettings {
    /// Check numeric ranges. Called by the controller before starting a run.
    pub fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            bail!("max_frames must be at least 1");
        }
        if !(self.sensitivity > 0.0 && self.sensitivity < 1.0) {
            bail!("sensitivity must lie in (0, 1), got {}", self.sensitivity);
        }
        if self.max_tracked_features == 0 {
            bail!("max_tracked_features must be at least 1");
        }
        if !self.harris_response_threshold.is_finite() {
            bail!("harris_response_threshold must be finite");
        }
        if !(-1.0..=1.0).contains(&self.correlation_threshold) {
            bail!(
                "correlation_threshold must lie in [-1, 1], got {}",
                self.correlation_threshold
            );
        }
        if self.template_update_frames == 0 {
            bail!("template_update_frames must be at least 1");
        }
        if !(self.template_update_distance_threshold >= 0.0) {
            bail!(
                "template_update_distance_threshold must be non-negative, got {}",
                self.template_update_distance_threshold
            );
        }
        Ok(())
    }
}

/// Endpoint of the remote rendering server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 10363,
        }
    }
}

/// Top-level settings file: tracking tuning plus render endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub tracking: TrackingSettings,
    pub render: RenderConfig,
}

impl RunConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let config: RunConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.tracking.validate()?;
        Ok(config)
    }
}
