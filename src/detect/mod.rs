//! Harris-style corner detection.

pub mod harris;
pub mod kernels;

pub use harris::{HarrisCandidate, HarrisDetector};
