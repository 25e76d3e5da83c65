//! The detector/tracker contract the run driver is generic over.

use crate::config::TrackingSettings;
use crate::detect::HarrisDetector;
use crate::track::{FeatureTracker, Track};
use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

/// One detection-and-tracking engine. The driver feeds it raw frames and is
/// oblivious to how the work is scheduled; any accelerated implementation is
/// a drop-in replacement as long as it honors the same per-frame semantics.
pub trait FeatureEngine: Send {
    /// Run detection and tracking for the next frame and return the live
    /// track set. `pixels` holds one frame of grayscale samples.
    fn process_frame(&mut self, pixels: &[u8]) -> &[Track];

    /// Short label for logs and timing reports.
    fn name(&self) -> &'static str;
}

/// Reference engine: scalar detector plus the tracker.
pub struct CpuEngine {
    detector: HarrisDetector,
    tracker: FeatureTracker,
}

impl CpuEngine {
    pub fn new(settings: &TrackingSettings) -> Self {
        Self {
            detector: HarrisDetector::new(
                IMAGE_WIDTH,
                IMAGE_HEIGHT,
                settings.sensitivity,
                settings.harris_response_threshold,
                settings.max_tracked_features,
            ),
            tracker: FeatureTracker::new(IMAGE_WIDTH, IMAGE_HEIGHT, settings),
        }
    }
}

impl FeatureEngine for CpuEngine {
    fn process_frame(&mut self, pixels: &[u8]) -> &[Track] {
        let candidates = self.detector.detect(pixels).to_vec();
        self.tracker.advance(self.detector.normalized(), &candidates)
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

/// Accelerated engine: identical semantics, smoothing passes row-parallel.
pub struct ParallelEngine {
    detector: HarrisDetector,
    tracker: FeatureTracker,
}

impl ParallelEngine {
    pub fn new(settings: &TrackingSettings) -> Self {
        Self {
            detector: HarrisDetector::parallel(
                IMAGE_WIDTH,
                IMAGE_HEIGHT,
                settings.sensitivity,
                settings.harris_response_threshold,
                settings.max_tracked_features,
            ),
            tracker: FeatureTracker::new(IMAGE_WIDTH, IMAGE_HEIGHT, settings),
        }
    }
}

impl FeatureEngine for ParallelEngine {
    fn process_frame(&mut self, pixels: &[u8]) -> &[Track] {
        let candidates = self.detector.detect(pixels).to_vec();
        self.tracker.advance(self.detector.normalized(), &candidates)
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::PixelPoint;

    fn frame_with_block(cx: usize, cy: usize) -> Vec<u8> {
        let mut image = vec![128u8; IMAGE_WIDTH * IMAGE_HEIGHT];
        for y in cy - 1..=cy + 1 {
            for x in cx - 1..=cx + 1 {
                image[y * IMAGE_WIDTH + x] = 255;
            }
        }
        image
    }

    fn settings() -> TrackingSettings {
        TrackingSettings {
            harris_response_threshold: 1e8,
            correlation_threshold: 0.5,
            template_update_frames: 3,
            template_update_distance_threshold: 4.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_engines_agree_on_reference_frames() {
        let settings = settings();
        let mut cpu = CpuEngine::new(&settings);
        let mut parallel = ParallelEngine::new(&settings);

        for frame in [
            frame_with_block(512, 384),
            frame_with_block(514, 384),
            frame_with_block(516, 384),
        ] {
            let a: Vec<(PixelPoint, u32)> = cpu
                .process_frame(&frame)
                .iter()
                .map(|t| (t.location(), t.age))
                .collect();
            let b: Vec<(PixelPoint, u32)> = parallel
                .process_frame(&frame)
                .iter()
                .map(|t| (t.location(), t.age))
                .collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_engine_tracks_across_translation() {
        let mut engine = CpuEngine::new(&settings());
        let tracks: Vec<_> = engine
            .process_frame(&frame_with_block(512, 384))
            .iter()
            .map(|t| (t.location(), t.age))
            .collect();
        assert_eq!(tracks, [(PixelPoint::new(512, 384), 0)]);

        let tracks: Vec<_> = engine
            .process_frame(&frame_with_block(514, 384))
            .iter()
            .map(|t| (t.location(), t.age))
            .collect();
        assert_eq!(tracks, [(PixelPoint::new(514, 384), 1)]);
    }
}
