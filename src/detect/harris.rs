//! Harris-Stephens corner detection over raw grayscale frames.
//!
//! The stage chain: normalize -> Sobel gradients -> gradient products ->
//! 7x7 Gaussian smoothing -> corner response -> threshold and sort ->
//! square non-maximum suppression -> top-K candidates with signatures.
//!
//! Every working buffer is allocated once per detector instance and reused
//! across frames; `detect` is a pure function of its input.

use rayon::prelude::*;

use crate::detect::kernels::{self, FILTER_RANGE, FILTER_WIDTH};
use crate::track::{PixelPoint, Signature};

/// Offset from response-plane coordinates back to the image frame:
/// one pixel of Sobel border plus the smoothing half-width.
const COORD_OFFSET: usize = 1 + FILTER_RANGE;

/// Half-width of the non-maximum suppression square.
const SUPPRESSION_RANGE: i32 = 3;

/// One corner detection for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct HarrisCandidate {
    pub location: PixelPoint,
    pub response: f32,
    pub signature: Signature,
}

struct RawCandidate {
    response: f32,
    x: u32,
    y: u32,
}

/// Harris corner detector with per-instance working storage.
pub struct HarrisDetector {
    width: usize,
    height: usize,
    k: f32,
    response_threshold: f32,
    max_features: usize,
    parallel_smoothing: bool,

    gaussian: [f32; FILTER_WIDTH * FILTER_WIDTH],
    normalize: [f32; 256],

    normalized: Vec<f32>,
    gradient_x2: Vec<i32>,
    gradient_y2: Vec<i32>,
    gradient_xy: Vec<i32>,
    smoothed_x2: Vec<f32>,
    smoothed_y2: Vec<f32>,
    smoothed_xy: Vec<f32>,
    response: Vec<f32>,
    suppressed: Vec<bool>,
    raw: Vec<RawCandidate>,
    candidates: Vec<HarrisCandidate>,
}

impl HarrisDetector {
    /// Detector for `width` x `height` frames with scalar smoothing.
    pub fn new(
        width: usize,
        height: usize,
        k: f32,
        response_threshold: f32,
        max_features: usize,
    ) -> Self {
        Self::with_parallel_smoothing(width, height, k, response_threshold, max_features, false)
    }

    /// Detector whose three smoothing passes run row-parallel. Results are
    /// identical to the scalar detector; only the schedule differs.
    pub fn parallel(
        width: usize,
        height: usize,
        k: f32,
        response_threshold: f32,
        max_features: usize,
    ) -> Self {
        Self::with_parallel_smoothing(width, height, k, response_threshold, max_features, true)
    }

    fn with_parallel_smoothing(
        width: usize,
        height: usize,
        k: f32,
        response_threshold: f32,
        max_features: usize,
        parallel_smoothing: bool,
    ) -> Self {
        assert!(
            width > 2 * COORD_OFFSET && height > 2 * COORD_OFFSET,
            "frame {width}x{height} too small for the filter chain"
        );
        let (gradient_cols, gradient_rows) = (width - 2, height - 2);
        let (response_cols, response_rows) = (
            gradient_cols - 2 * FILTER_RANGE,
            gradient_rows - 2 * FILTER_RANGE,
        );
        Self {
            width,
            height,
            k,
            response_threshold,
            max_features,
            parallel_smoothing,
            gaussian: kernels::gaussian_weights(),
            normalize: kernels::normalize_table(),
            normalized: vec![0.0; width * height],
            gradient_x2: vec![0; gradient_cols * gradient_rows],
            gradient_y2: vec![0; gradient_cols * gradient_rows],
            gradient_xy: vec![0; gradient_cols * gradient_rows],
            smoothed_x2: vec![0.0; response_cols * response_rows],
            smoothed_y2: vec![0.0; response_cols * response_rows],
            smoothed_xy: vec![0.0; response_cols * response_rows],
            response: vec![0.0; response_cols * response_rows],
            suppressed: vec![false; response_cols * response_rows],
            raw: Vec::new(),
            candidates: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The normalized view of the most recent frame, for correlation and
    /// signature extraction downstream.
    pub fn normalized(&self) -> &[f32] {
        &self.normalized
    }

    /// Detect up to `max_features` corners in one frame. `pixels` must hold
    /// `width * height` grayscale samples.
    pub fn detect(&mut self, pixels: &[u8]) -> &[HarrisCandidate] {
        assert!(
            pixels.len() >= self.width * self.height,
            "frame holds {} samples, expected {}",
            pixels.len(),
            self.width * self.height
        );

        self.normalize_input(pixels);
        self.compute_gradient_products(pixels);
        self.smooth_products();
        self.compute_response();
        self.collect_candidates();
        self.suppress_and_extract();
        &self.candidates
    }

    fn normalize_input(&mut self, pixels: &[u8]) {
        for (dst, &src) in self
            .normalized
            .iter_mut()
            .zip(&pixels[..self.width * self.height])
        {
            *dst = self.normalize[src as usize];
        }
    }

    fn compute_gradient_products(&mut self, pixels: &[u8]) {
        let width = self.width;
        let gradient_cols = width - 2;
        for y in 1..self.height - 1 {
            let above = &pixels[(y - 1) * width..y * width];
            let row = &pixels[y * width..(y + 1) * width];
            let below = &pixels[(y + 1) * width..(y + 2) * width];
            let out_base = (y - 1) * gradient_cols;
            for x in 1..width - 1 {
                let gx = -(above[x - 1] as i32) + above[x + 1] as i32
                    - 2 * row[x - 1] as i32
                    + 2 * row[x + 1] as i32
                    - below[x - 1] as i32
                    + below[x + 1] as i32;
                let gy = -(above[x - 1] as i32)
                    - 2 * above[x] as i32
                    - above[x + 1] as i32
                    + below[x - 1] as i32
                    + 2 * below[x] as i32
                    + below[x + 1] as i32;
                // Gradients fit i16 (|g| <= 1020); the products need i32.
                let gx = gx as i16 as i32;
                let gy = gy as i16 as i32;
                let idx = out_base + (x - 1);
                self.gradient_x2[idx] = gx * gx;
                self.gradient_y2[idx] = gy * gy;
                self.gradient_xy[idx] = gx * gy;
            }
        }
    }

    fn smooth_products(&mut self) {
        let src_cols = self.width - 2;
        let dst_cols = src_cols - 2 * FILTER_RANGE;
        let dst_rows = self.height - 2 - 2 * FILTER_RANGE;
        smooth_plane(
            &self.gradient_x2,
            &mut self.smoothed_x2,
            src_cols,
            dst_cols,
            dst_rows,
            &self.gaussian,
            self.parallel_smoothing,
        );
        smooth_plane(
            &self.gradient_y2,
            &mut self.smoothed_y2,
            src_cols,
            dst_cols,
            dst_rows,
            &self.gaussian,
            self.parallel_smoothing,
        );
        smooth_plane(
            &self.gradient_xy,
            &mut self.smoothed_xy,
            src_cols,
            dst_cols,
            dst_rows,
            &self.gaussian,
            self.parallel_smoothing,
        );
    }

    fn compute_response(&mut self) {
        let k = self.k;
        for (((r, &sxx), &syy), &sxy) in self
            .response
            .iter_mut()
            .zip(&self.smoothed_x2)
            .zip(&self.smoothed_y2)
            .zip(&self.smoothed_xy)
        {
            let det = sxx * syy - sxy * sxy;
            let trace = sxx + syy;
            *r = det - k * trace * trace;
        }
    }

    fn collect_candidates(&mut self) {
        let response_cols = self.width - 2 - 2 * FILTER_RANGE;
        self.raw.clear();
        for (idx, &r) in self.response.iter().enumerate() {
            if r > self.response_threshold {
                self.raw.push(RawCandidate {
                    response: r,
                    x: (idx % response_cols) as u32,
                    y: (idx / response_cols) as u32,
                });
            }
        }
        self.raw
            .sort_unstable_by(|a, b| b.response.total_cmp(&a.response));
    }

    fn suppress_and_extract(&mut self) {
        let response_cols = self.width - 2 - 2 * FILTER_RANGE;
        let response_rows = self.height - 2 - 2 * FILTER_RANGE;
        self.suppressed.fill(false);
        self.candidates.clear();

        for raw in &self.raw {
            if self.candidates.len() >= self.max_features {
                break;
            }
            let (x, y) = (raw.x as i32, raw.y as i32);
            if self.suppressed[y as usize * response_cols + x as usize] {
                continue;
            }
            for dy in -SUPPRESSION_RANGE..=SUPPRESSION_RANGE {
                for dx in -SUPPRESSION_RANGE..=SUPPRESSION_RANGE {
                    let sx = (x + dx).clamp(0, response_cols as i32 - 1) as usize;
                    let sy = (y + dy).clamp(0, response_rows as i32 - 1) as usize;
                    self.suppressed[sy * response_cols + sx] = true;
                }
            }

            let location = PixelPoint::new(
                (raw.x as usize + COORD_OFFSET) as u16,
                (raw.y as usize + COORD_OFFSET) as u16,
            );
            let signature = Signature::extract(&self.normalized, self.width, self.height, location);
            self.candidates.push(HarrisCandidate {
                location,
                response: raw.response,
                signature,
            });
        }
    }
}

fn smooth_plane(
    src: &[i32],
    dst: &mut [f32],
    src_cols: usize,
    dst_cols: usize,
    dst_rows: usize,
    gaussian: &[f32; FILTER_WIDTH * FILTER_WIDTH],
    parallel: bool,
) {
    let smooth_row = |y: usize, out_row: &mut [f32]| {
        for (x, out) in out_row.iter_mut().enumerate() {
            let mut total = 0.0f32;
            for ky in 0..FILTER_WIDTH {
                let src_off = (y + ky) * src_cols + x;
                let src_row = &src[src_off..src_off + FILTER_WIDTH];
                let weights = &gaussian[ky * FILTER_WIDTH..(ky + 1) * FILTER_WIDTH];
                for kx in 0..FILTER_WIDTH {
                    total += weights[kx] * src_row[kx] as f32;
                }
            }
            *out = total;
        }
    };

    if parallel {
        dst.par_chunks_mut(dst_cols)
            .take(dst_rows)
            .enumerate()
            .for_each(|(y, row)| smooth_row(y, row));
    } else {
        for (y, row) in dst.chunks_mut(dst_cols).take(dst_rows).enumerate() {
            smooth_row(y, row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 40;
    const H: usize = 40;

    fn flat(value: u8) -> Vec<u8> {
        vec![value; W * H]
    }

    /// Background 128 with a 3x3 block of 255 centered on (cx, cy).
    fn block_image(cx: usize, cy: usize) -> Vec<u8> {
        let mut image = flat(128);
        for y in cy - 1..=cy + 1 {
            for x in cx - 1..=cx + 1 {
                image[y * W + x] = 255;
            }
        }
        image
    }

    /// Background 128 with single pixels of 255 at the given locations.
    fn impulse_image(points: &[(usize, usize)]) -> Vec<u8> {
        let mut image = flat(128);
        for &(x, y) in points {
            image[y * W + x] = 255;
        }
        image
    }

    fn detector(threshold: f32, max_features: usize) -> HarrisDetector {
        HarrisDetector::new(W, H, 0.04, threshold, max_features)
    }

    #[test]
    fn test_flat_image_has_no_candidates() {
        let mut det = detector(1_000_000.0, 200);
        assert!(det.detect(&flat(128)).is_empty());
        assert!(det.detect(&flat(0)).is_empty());
        assert!(det.detect(&flat(255)).is_empty());
    }

    #[test]
    fn test_single_impulse_yields_one_candidate() {
        let mut det = detector(1_000_000.0, 200);
        let candidates = det.detect(&impulse_image(&[(20, 20)]));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, PixelPoint::new(20, 20));
        // Response value pinned by the fixed kernel chain.
        let expected = 1.4184e8;
        assert!(
            (candidates[0].response - expected).abs() / expected < 1e-2,
            "response was {}",
            candidates[0].response
        );
    }

    #[test]
    fn test_block_center_is_strongest() {
        let mut det = detector(1_000_000.0, 200);
        let candidates = det.detect(&block_image(20, 20));
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].location, PixelPoint::new(20, 20));
        for pair in candidates.windows(2) {
            assert!(pair[0].response >= pair[1].response);
        }
    }

    #[test]
    fn test_block_with_strong_threshold_is_unique() {
        // The secondary response lobes of a 3x3 block sit two decades below
        // the central peak; a 1e8 threshold isolates it.
        let mut det = detector(1e8, 200);
        let candidates = det.detect(&block_image(20, 20));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, PixelPoint::new(20, 20));
    }

    #[test]
    fn test_nms_square_radius_holds_pairwise() {
        let mut det = detector(1_000_000.0, 200);
        let candidates = det.detect(&block_image(20, 20)).to_vec();
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                let dx = (a.location.x as i32 - b.location.x as i32).abs();
                let dy = (a.location.y as i32 - b.location.y as i32).abs();
                assert!(
                    dx.max(dy) > SUPPRESSION_RANGE,
                    "candidates {:?} and {:?} violate suppression",
                    a.location,
                    b.location
                );
            }
        }
    }

    #[test]
    fn test_impulses_within_suppression_radius_collapse() {
        // Two impulses three pixels apart blur into one response ridge; a
        // strong threshold plus suppression leaves a single survivor on it.
        let mut det = detector(1e8, 200);
        let candidates = det.detect(&impulse_image(&[(20, 20), (23, 20)]));
        assert_eq!(candidates.len(), 1);
        let location = candidates[0].location;
        assert_eq!(location.y, 20);
        assert!(
            (17..=25).contains(&location.x),
            "survivor at unexpected x {}",
            location.x
        );
    }

    #[test]
    fn test_impulses_outside_suppression_radius_survive() {
        let mut det = detector(1_000_000.0, 200);
        let candidates = det.detect(&impulse_image(&[(14, 20), (26, 20)]));
        assert_eq!(candidates.len(), 2);
        let mut xs: Vec<u16> = candidates.iter().map(|c| c.location.x).collect();
        xs.sort_unstable();
        assert_eq!(xs, [14, 26]);
    }

    #[test]
    fn test_max_features_caps_output() {
        let mut det = detector(1_000_000.0, 2);
        let candidates = det.detect(&impulse_image(&[(12, 12), (28, 12), (12, 28), (28, 28)]));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_detector_is_idempotent() {
        let image = block_image(19, 21);
        let mut det = detector(1_000_000.0, 200);
        let first: Vec<(PixelPoint, f32)> = det
            .detect(&image)
            .iter()
            .map(|c| (c.location, c.response))
            .collect();
        let second: Vec<(PixelPoint, f32)> = det
            .detect(&image)
            .iter()
            .map(|c| (c.location, c.response))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_candidate_signature_matches_window() {
        let mut det = detector(1e8, 200);
        let candidates = det.detect(&block_image(20, 20));
        assert_eq!(candidates.len(), 1);
        let sig = candidates[0].signature;
        let expected =
            Signature::extract(det.normalized(), W, H, PixelPoint::new(20, 20));
        assert_eq!(sig, expected);
        // Center of the window is the bright block, corners the background.
        assert_eq!(sig.as_slice()[24], 1.0);
        assert!((sig.as_slice()[0] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_coordinate_offset_reports_image_frame() {
        let mut det = detector(1_000_000.0, 200);
        for (cx, cy) in [(15, 25), (25, 15), (13, 13)] {
            let candidates = det.detect(&impulse_image(&[(cx, cy)]));
            assert_eq!(candidates.len(), 1, "impulse at ({cx},{cy})");
            assert_eq!(
                candidates[0].location,
                PixelPoint::new(cx as u16, cy as u16)
            );
        }
    }

    #[test]
    fn test_parallel_smoothing_matches_scalar() {
        let image = block_image(20, 20);
        let mut scalar = HarrisDetector::new(W, H, 0.04, 1_000_000.0, 200);
        let mut parallel = HarrisDetector::parallel(W, H, 0.04, 1_000_000.0, 200);
        let a: Vec<(PixelPoint, f32)> = scalar
            .detect(&image)
            .iter()
            .map(|c| (c.location, c.response))
            .collect();
        let b: Vec<(PixelPoint, f32)> = parallel
            .detect(&image)
            .iter()
            .map(|c| (c.location, c.response))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reference_frame_dimensions() {
        // The compiled reference configuration must be constructible and
        // find a centered corner at full size.
        let width = crate::IMAGE_WIDTH;
        let height = crate::IMAGE_HEIGHT;
        let mut image = vec![128u8; width * height];
        for y in 383..=385 {
            for x in 511..=513 {
                image[y * width + x] = 255;
            }
        }
        let mut det = HarrisDetector::new(width, height, 0.04, 1e8, 200);
        let candidates = det.detect(&image);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, PixelPoint::new(512, 384));
    }
}
