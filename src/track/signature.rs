//! 7x7 visual templates and normalized cross-correlation.

use super::PixelPoint;

/// Side length of a signature window.
pub const SIGNATURE_WIDTH: usize = 7;
/// Half-width of a signature window.
pub const SIGNATURE_RANGE: i32 = 3;
/// Samples per signature.
pub const SIGNATURE_LEN: usize = SIGNATURE_WIDTH * SIGNATURE_WIDTH;

/// A 7x7 patch of normalized samples serving as a track's visual template.
/// Fixed-size value type; tracks copy these rather than allocate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signature([f32; SIGNATURE_LEN]);

impl Signature {
    /// Extract the 7x7 window of the normalized image centered on `center`.
    /// Out-of-bounds neighbors clamp to the image edge, each coordinate
    /// bounded along its own axis.
    pub fn extract(normalized: &[f32], width: usize, height: usize, center: PixelPoint) -> Self {
        let mut samples = [0.0f32; SIGNATURE_LEN];
        let mut i = 0;
        for dy in -SIGNATURE_RANGE..=SIGNATURE_RANGE {
            let y = clamped(center.y as i32 + dy, height);
            for dx in -SIGNATURE_RANGE..=SIGNATURE_RANGE {
                let x = clamped(center.x as i32 + dx, width);
                samples[i] = normalized[y * width + x];
                i += 1;
            }
        }
        Self(samples)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    fn mean(&self) -> f32 {
        self.0.iter().sum::<f32>() / SIGNATURE_LEN as f32
    }
}

#[inline]
fn clamped(coord: i32, limit: usize) -> usize {
    coord.clamp(0, limit as i32 - 1) as usize
}

/// Mean-subtracted normalized cross-correlation between two patches.
///
/// Returns a value in [-1, 1]; a zero-variance patch on either side yields
/// 0.0 so flat image regions neither match nor poison the arg-max.
pub fn correlate(window: &Signature, template: &Signature) -> f32 {
    let window_mean = window.mean();
    let template_mean = template.mean();

    let mut cross = 0.0f32;
    let mut window_var = 0.0f32;
    let mut template_var = 0.0f32;
    for i in 0..SIGNATURE_LEN {
        let a = window.0[i] - window_mean;
        let b = template.0[i] - template_mean;
        cross += a * b;
        window_var += a * a;
        template_var += b * b;
    }

    let denom = window_var * template_var;
    if denom <= 0.0 {
        return 0.0;
    }
    cross / denom.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_image(width: usize, height: usize) -> Vec<f32> {
        (0..width * height).map(|i| i as f32 / 100.0).collect()
    }

    #[test]
    fn test_extract_interior() {
        let width = 16;
        let image = ramp_image(width, 16);
        let sig = Signature::extract(&image, width, 16, PixelPoint::new(8, 8));
        // Top-left of the window is (5, 5); center sample is (8, 8).
        assert_eq!(sig.as_slice()[0], image[5 * width + 5]);
        assert_eq!(sig.as_slice()[24], image[8 * width + 8]);
        assert_eq!(sig.as_slice()[48], image[11 * width + 11]);
    }

    #[test]
    fn test_extract_clamps_each_axis_independently() {
        let width = 16;
        let image = ramp_image(width, 16);
        let sig = Signature::extract(&image, width, 16, PixelPoint::new(0, 8));
        // x clamps to 0 while y keeps varying.
        assert_eq!(sig.as_slice()[0], image[5 * width]);
        assert_eq!(sig.as_slice()[7], image[6 * width]);
        assert_eq!(sig.as_slice()[1], image[5 * width]); // x=-2 also clamps to 0
    }

    #[test]
    fn test_extract_corner() {
        let width = 16;
        let image = ramp_image(width, 16);
        let sig = Signature::extract(&image, width, 16, PixelPoint::new(0, 0));
        assert_eq!(sig.as_slice()[0], image[0]);
        assert_eq!(sig.as_slice()[24], image[0]); // center still in-bounds at (0,0)
    }

    #[test]
    fn test_self_correlation_is_one() {
        let width = 16;
        let image = ramp_image(width, 16);
        let sig = Signature::extract(&image, width, 16, PixelPoint::new(8, 8));
        let r = correlate(&sig, &sig);
        assert!((r - 1.0).abs() < 1e-5, "self correlation was {r}");
    }

    #[test]
    fn test_negated_patch_anticorrelates() {
        let a = Signature(std::array::from_fn(|i| i as f32));
        let b = Signature(std::array::from_fn(|i| -(i as f32)));
        let r = correlate(&a, &b);
        assert!((r + 1.0).abs() < 1e-5, "anti correlation was {r}");
    }

    #[test]
    fn test_mean_invariance() {
        let a = Signature(std::array::from_fn(|i| (i % 7) as f32));
        let shifted = Signature(std::array::from_fn(|i| (i % 7) as f32 + 42.0));
        let r = correlate(&a, &shifted);
        assert!((r - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_flat_patch_scores_zero() {
        let flat = Signature([0.5; SIGNATURE_LEN]);
        let textured = Signature(std::array::from_fn(|i| i as f32));
        assert_eq!(correlate(&flat, &textured), 0.0);
        assert_eq!(correlate(&textured, &flat), 0.0);
        assert_eq!(correlate(&flat, &flat), 0.0);
    }
}
