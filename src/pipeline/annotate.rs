//! Frame annotation: grayscale expansion and track-trail overdraw.
//!
//! Annotated frames are interleaved BGR bytes. Each engine draws its trails
//! with a fixed pen so the two runs are distinguishable downstream.

use crate::track::Track;

/// Bytes per annotated pixel.
pub const PIXEL_BYTES: usize = 3;

/// Half-width of a trail mark.
const MARK_RADIUS: i32 = 1;

/// Trail pen, stored in output byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pen {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

/// Pen of the reference engine (orange).
pub const CPU_PEN: Pen = Pen {
    b: 0,
    g: 200,
    r: 255,
};

/// Pen of the accelerated engine (green).
pub const ACCEL_PEN: Pen = Pen {
    b: 35,
    g: 255,
    r: 7,
};

/// Expand one grayscale frame into the BGR output buffer.
pub fn gray_to_bgr(gray: &[u8], out: &mut [u8]) {
    debug_assert_eq!(out.len(), gray.len() * PIXEL_BYTES);
    for (dst, &value) in out.chunks_exact_mut(PIXEL_BYTES).zip(gray) {
        dst[0] = value;
        dst[1] = value;
        dst[2] = value;
    }
}

/// Stamp a small square at (x, y); pixels falling outside the image are
/// skipped.
pub fn mark_point(out: &mut [u8], width: usize, height: usize, x: i32, y: i32, pen: Pen) {
    for dy in -MARK_RADIUS..=MARK_RADIUS {
        let py = y + dy;
        if py < 0 || py >= height as i32 {
            continue;
        }
        for dx in -MARK_RADIUS..=MARK_RADIUS {
            let px = x + dx;
            if px < 0 || px >= width as i32 {
                continue;
            }
            let idx = (py as usize * width + px as usize) * PIXEL_BYTES;
            out[idx] = pen.b;
            out[idx + 1] = pen.g;
            out[idx + 2] = pen.r;
        }
    }
}

/// Draw every live track's location trail onto the BGR buffer.
pub fn draw_trails(out: &mut [u8], width: usize, height: usize, tracks: &[Track], pen: Pen) {
    for track in tracks {
        for point in track.trail() {
            mark_point(out, width, height, point.x as i32, point.y as i32, pen);
        }
    }
}
