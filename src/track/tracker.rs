//! Per-frame track continuation, template refresh, and admission.
//!
//! Tracks carry two templates: the primary signature drives the per-frame
//! correlation search, while the alternate is captured later and must agree
//! with the primary on a cross-check frame before it takes over. That keeps
//! templates current under appearance drift without letting a template
//! slide onto a different surface feature.

use tracing::debug;

use crate::config::TrackingSettings;
use crate::detect::HarrisCandidate;
use crate::track::signature::{correlate, Signature, SIGNATURE_RANGE};
use crate::track::PixelPoint;

/// Length of a track's location history ring.
pub const HISTORY_LEN: usize = 200;

/// Half-width of the occupancy neighborhood consulted on admission.
const EXCLUSION_RANGE: i32 = 3;

/// One live feature identity.
pub struct Track {
    history: [PixelPoint; HISTORY_LEN],
    head: usize,
    /// Reference template for the correlation search.
    pub signature: Signature,
    /// Candidate next template, promoted on a successful cross-check.
    pub alt_signature: Signature,
    /// Frames survived since admission.
    pub age: u32,
}

impl Track {
    fn new(location: PixelPoint, signature: Signature) -> Self {
        let mut history = [PixelPoint::default(); HISTORY_LEN];
        history[0] = location;
        Self {
            history,
            head: 0,
            signature,
            alt_signature: signature,
            age: 0,
        }
    }

    /// The newest location.
    pub fn location(&self) -> PixelPoint {
        self.history[self.head]
    }

    fn push_location(&mut self, location: PixelPoint) {
        self.head = (self.head + 1) % HISTORY_LEN;
        self.history[self.head] = location;
    }

    /// The last `min(age, HISTORY_LEN)` locations, newest first.
    pub fn trail(&self) -> impl Iterator<Item = PixelPoint> + '_ {
        let len = (self.age as usize).min(HISTORY_LEN);
        (0..len).map(move |back| self.history[(self.head + HISTORY_LEN - back) % HISTORY_LEN])
    }
}

/// The set of live tracks plus the pixel occupancy map.
pub struct FeatureTracker {
    width: usize,
    height: usize,
    correlation_threshold: f32,
    refresh_frames: u32,
    refresh_distance: f32,
    max_tracks: usize,

    tracks: Vec<Track>,
    occupancy: Vec<bool>,
    first_frame: bool,
}

impl FeatureTracker {
    pub fn new(width: usize, height: usize, settings: &TrackingSettings) -> Self {
        Self {
            width,
            height,
            correlation_threshold: settings.correlation_threshold,
            refresh_frames: settings.template_update_frames,
            refresh_distance: settings.template_update_distance_threshold,
            max_tracks: settings.max_tracked_features,
            tracks: Vec::with_capacity(settings.max_tracked_features),
            occupancy: vec![false; width * height],
            first_frame: true,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Advance every track against the new frame, then admit fresh
    /// detections. `normalized` is the frame's normalized view and
    /// `candidates` the detector output for the same frame.
    pub fn advance(
        &mut self,
        normalized: &[f32],
        candidates: &[HarrisCandidate],
    ) -> &[Track] {
        if self.first_frame {
            self.first_frame = false;
            for candidate in candidates.iter().take(self.max_tracks) {
                self.set_occupancy(candidate.location, true);
                self.tracks
                    .push(Track::new(candidate.location, candidate.signature));
            }
            return &self.tracks;
        }

        self.continue_tracks(normalized);
        self.admit_candidates(candidates);
        debug!(live = self.tracks.len(), "tracker frame complete");
        &self.tracks
    }

    fn continue_tracks(&mut self, normalized: &[f32]) {
        let width = self.width;
        let height = self.height;
        let rho = self.correlation_threshold;
        let refresh = self.refresh_frames;
        let refresh_distance = self.refresh_distance;
        let occupancy = &mut self.occupancy;

        self.tracks.retain_mut(|track| {
            let old = track.location();
            let (primary_loc, primary_score) =
                correlation_search(normalized, width, height, old, &track.signature);

            let cross_check = (track.age + 1) % (2 * refresh) == 0;
            let accepted = if cross_check {
                let (alt_loc, alt_score) =
                    correlation_search(normalized, width, height, old, &track.alt_signature);
                if alt_score >= rho && primary_loc.distance(alt_loc) < refresh_distance {
                    // The alternate has proven itself: it becomes primary.
                    track.signature = track.alt_signature;
                    Some(alt_loc)
                } else {
                    None
                }
            } else if primary_score >= rho {
                Some(primary_loc)
            } else {
                None
            };

            match accepted {
                Some(new_location) => {
                    occupancy[old.y as usize * width + old.x as usize] = false;
                    occupancy[new_location.y as usize * width + new_location.x as usize] = true;
                    track.push_location(new_location);
                    track.age += 1;
                    if track.age % refresh == 0 && (track.age + 1) % (2 * refresh) != 0 {
                        track.alt_signature =
                            Signature::extract(normalized, width, height, new_location);
                    }
                    true
                }
                None => {
                    occupancy[old.y as usize * width + old.x as usize] = false;
                    false
                }
            }
        });
    }

    fn admit_candidates(&mut self, candidates: &[HarrisCandidate]) {
        for candidate in candidates {
            if self.tracks.len() >= self.max_tracks {
                break;
            }
            if self.neighborhood_occupied(candidate.location) {
                continue;
            }
            self.set_occupancy(candidate.location, true);
            self.tracks
                .push(Track::new(candidate.location, candidate.signature));
        }
    }

    fn set_occupancy(&mut self, location: PixelPoint, value: bool) {
        self.occupancy[location.y as usize * self.width + location.x as usize] = value;
    }

    /// Whether any pixel of the 7x7 neighborhood around `location` is
    /// occupied by a live track's current position.
    fn neighborhood_occupied(&self, location: PixelPoint) -> bool {
        for dy in -EXCLUSION_RANGE..=EXCLUSION_RANGE {
            let y = (location.y as i32 + dy).clamp(0, self.height as i32 - 1) as usize;
            for dx in -EXCLUSION_RANGE..=EXCLUSION_RANGE {
                let x = (location.x as i32 + dx).clamp(0, self.width as i32 - 1) as usize;
                if self.occupancy[y * self.width + x] {
                    return true;
                }
            }
        }
        false
    }
}

/// Arg-max of the normalized cross-correlation over the 49 offsets around
/// `center`. Ties keep the first hit in scan order (dy outer, dx inner);
/// offsets whose center falls outside the image are skipped.
pub fn correlation_search(
    normalized: &[f32],
    width: usize,
    height: usize,
    center: PixelPoint,
    template: &Signature,
) -> (PixelPoint, f32) {
    let mut best_score = f32::MIN;
    let mut best_point = PixelPoint::default();

    for dy in -SIGNATURE_RANGE..=SIGNATURE_RANGE {
        let y = center.y as i32 + dy;
        if y < 0 || y >= height as i32 {
            continue;
        }
        for dx in -SIGNATURE_RANGE..=SIGNATURE_RANGE {
            let x = center.x as i32 + dx;
            if x < 0 || x >= width as i32 {
                continue;
            }
            let point = PixelPoint::new(x as u16, y as u16);
            let window = Signature::extract(normalized, width, height, point);
            let score = correlate(&window, template);
            if score > best_score {
                best_score = score;
                best_point = point;
            }
        }
    }
    (best_point, best_score)
}
