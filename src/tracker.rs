// src/tracker.rs
//
// Nearest-centroid identity tracker. Simpler than IoU association on
// purpose: detections arrive as centroids on a fixed camera, so a recency
// window plus a proximity radius is enough to keep identities stable.

use crate::geometry::centroid_distance;
use crate::types::{Point, TrackingConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Per-identity state. Owned exclusively by the tracker; eviction deletes
/// the whole entry, smoothing memory included, so a re-minted identity at
/// the same spot starts clean.
#[derive(Debug, Clone)]
pub struct TrackedVehicle {
    pub id: u64,
    pub last_center: Point,
    /// Center at the previous sighting, if the identity was matched before.
    /// The speed stage reads displacement from here.
    pub prev_center: Option<Point>,
    pub last_seen_frame: u64,
    pub speed_history: VecDeque<f64>,
    pub last_timestamp: Option<f64>,
}

impl TrackedVehicle {
    fn new(id: u64, center: Point, frame_index: u64) -> Self {
        Self {
            id,
            last_center: center,
            prev_center: None,
            last_seen_frame: frame_index,
            speed_history: VecDeque::with_capacity(8),
            last_timestamp: None,
        }
    }
}

pub struct IdentityTracker {
    config: TrackingConfig,
    tracks: HashMap<u64, TrackedVehicle>,
    next_id: u64,
}

impl IdentityTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            next_id: 1,
        }
    }

    /// Match `center` to an existing identity within the recency window and
    /// proximity radius, or mint a new one. Ids are monotonic and never
    /// reused. Ties on distance go to the first-seen (smallest) id.
    pub fn assign(&mut self, center: Point, frame_index: u64) -> u64 {
        let window = self.config.recency_window_frames;
        let best = self
            .tracks
            .values()
            .filter(|t| frame_index.saturating_sub(t.last_seen_frame) <= window)
            .map(|t| (centroid_distance(center, t.last_center), t.id))
            .min_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });

        if let Some((dist, id)) = best {
            if dist < self.config.proximity_radius_px {
                // Entry exists by construction
                if let Some(track) = self.tracks.get_mut(&id) {
                    track.prev_center = Some(track.last_center);
                    track.last_center = center;
                    track.last_seen_frame = frame_index;
                    return id;
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        debug!(
            "🆕 New identity {} at ({:.0},{:.0}) frame {}",
            id, center.x, center.y, frame_index
        );
        self.tracks.insert(id, TrackedVehicle::new(id, center, frame_index));
        id
    }

    /// Drop every identity not present in the current frame's live set.
    /// Deleting the entry resets speed history and timestamp state, so stale
    /// smoothing memory can never leak into a semantically different vehicle
    /// that later re-matches nearby. Idempotent.
    pub fn evict_stale(&mut self, current_ids: &HashSet<u64>) {
        let before = self.tracks.len();
        self.tracks.retain(|id, _| current_ids.contains(id));
        let evicted = before - self.tracks.len();
        if evicted > 0 {
            debug!("Evicted {} stale identit(ies)", evicted);
        }
    }

    pub fn get(&self, id: u64) -> Option<&TrackedVehicle> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut TrackedVehicle> {
        self.tracks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}
