//! Fixed convolution kernels and lookup tables for the detector.

/// Horizontal Sobel kernel, row-major 3x3.
pub const SOBEL_X: [i32; 9] = [-1, 0, 1, -2, 0, 2, -1, 0, 1];
/// Vertical Sobel kernel, row-major 3x3.
pub const SOBEL_Y: [i32; 9] = [-1, -2, -1, 0, 0, 0, 1, 2, 1];

/// Side length of the smoothing filter.
pub const FILTER_WIDTH: usize = 7;
/// Half-width of the smoothing filter.
pub const FILTER_RANGE: usize = 3;

/// Row of binomial coefficients C(6, k); the outer product divided by 4096
/// is the 7x7 Gaussian used for structure-tensor smoothing.
const BINOMIAL_7: [f32; FILTER_WIDTH] = [1.0, 6.0, 15.0, 20.0, 15.0, 6.0, 1.0];

/// The 49 smoothing weights, row-major, summing to 1.
pub fn gaussian_weights() -> [f32; FILTER_WIDTH * FILTER_WIDTH] {
    let mut weights = [0.0f32; FILTER_WIDTH * FILTER_WIDTH];
    for (i, w) in weights.iter_mut().enumerate() {
        let row = i / FILTER_WIDTH;
        let col = i % FILTER_WIDTH;
        *w = BINOMIAL_7[row] * BINOMIAL_7[col] / 4096.0;
    }
    weights
}

/// 256-entry table mapping a raw 8-bit sample to [0, 1].
pub fn normalize_table() -> [f32; 256] {
    let mut table = [0.0f32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = i as f32 / 255.0;
    }
    table
}
