// src/speed.rs
//
// Per-identity speed from centroid displacement. Two-stage noise rejection:
// a hard minimum-displacement gate kills detection jitter outright, then a
// median filter over the identity's recent samples discards outlier spikes
// before averaging. Detector boxes wobble by a few pixels even for a parked
// vehicle; a naive per-frame speed would report phantom motion.

use crate::geometry::centroid_distance;
use crate::tracker::TrackedVehicle;
use crate::types::SpeedConfig;

pub struct SpeedEstimator {
    config: SpeedConfig,
}

impl SpeedEstimator {
    pub fn new(config: SpeedConfig) -> Self {
        Self { config }
    }

    /// Smoothed speed in km/h for one identity at its current sighting.
    ///
    /// Returns 0 when there is no previous center, when displacement is
    /// below the jitter gate, when the timestamp delta is non-positive, or
    /// when the smoothed result falls under the minimum-speed threshold.
    /// The result is always finite and within [0, max_speed_kmh].
    pub fn estimate(&self, track: &mut TrackedVehicle, fps: f64, now_ts: Option<f64>) -> f64 {
        let prev_ts = track.last_timestamp;
        if let Some(ts) = now_ts {
            track.last_timestamp = Some(ts);
        }

        let prev = match track.prev_center {
            Some(p) => p,
            None => return 0.0,
        };
        let displacement = centroid_distance(prev, track.last_center) as f64;
        if displacement < self.config.min_displacement_px {
            return 0.0;
        }

        let meters = displacement * self.config.pixel_to_meter_ratio;
        let elapsed = match (prev_ts, now_ts) {
            (Some(t0), Some(t1)) => {
                let dt = t1 - t0;
                // Non-monotonic clocks show up as zero speed, never negative
                if dt <= 0.0 {
                    return 0.0;
                }
                dt
            }
            _ => {
                if fps <= 0.0 {
                    return 0.0;
                }
                1.0 / fps
            }
        };

        let raw_kmh = meters / elapsed * 3.6;
        if !raw_kmh.is_finite() {
            return 0.0;
        }

        track.speed_history.push_back(raw_kmh);
        while track.speed_history.len() > self.config.history_len {
            track.speed_history.pop_front();
        }

        let smoothed = median_filtered_mean(&track.speed_history, raw_kmh);
        let clamped = smoothed.clamp(0.0, self.config.max_speed_kmh);
        if clamped < self.config.min_speed_kmh {
            0.0
        } else {
            clamped
        }
    }
}

/// Median-based outlier rejection: drop samples deviating from the median by
/// more than 50% of the median, average the survivors. Falls back to the raw
/// value if filtering empties the set.
fn median_filtered_mean(history: &std::collections::VecDeque<f64>, raw: f64) -> f64 {
    if history.is_empty() {
        return raw;
    }
    let mut sorted: Vec<f64> = history.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = sorted[sorted.len() / 2];

    let kept: Vec<f64> = history
        .iter()
        .copied()
        .filter(|s| (s - median).abs() <= 0.5 * median)
        .collect();
    if kept.is_empty() {
        raw
    } else {
        kept.iter().sum::<f64>() / kept.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn track_at(prev: Option<(f32, f32)>, curr: (f32, f32)) -> TrackedVehicle {
        let mut t = TrackedVehicle {
            id: 1,
            last_center: Point::new(curr.0, curr.1),
            prev_center: prev.map(|(x, y)| Point::new(x, y)),
            last_seen_frame: 1,
            speed_history: std::collections::VecDeque::new(),
            last_timestamp: None,
        };
        t.speed_history.reserve(8);
        t
    }

    fn estimator() -> SpeedEstimator {
        SpeedEstimator::new(SpeedConfig::default())
    }

    #[test]
    fn test_no_previous_center_is_zero() {
        let mut t = track_at(None, (100.0, 100.0));
        assert_eq!(estimator().estimate(&mut t, 30.0, None), 0.0);
    }

    #[test]
    fn test_zero_displacement_is_zero() {
        let mut t = track_at(Some((100.0, 100.0)), (100.0, 100.0));
        assert_eq!(estimator().estimate(&mut t, 30.0, None), 0.0);
        assert!(t.speed_history.is_empty(), "gated samples never enter history");
    }

    #[test]
    fn test_jitter_below_gate_is_zero() {
        // 4 px < 5 px gate
        let mut t = track_at(Some((100.0, 100.0)), (104.0, 100.0));
        assert_eq!(estimator().estimate(&mut t, 30.0, None), 0.0);
    }

    #[test]
    fn test_sustained_50_kmh_converges() {
        // 50 km/h at 30 fps with 0.05 m/px: 13.889 m/s -> 0.463 m/frame
        // -> 9.26 px/frame displacement.
        let est = estimator();
        let mut t = track_at(Some((100.0, 100.0)), (109.26, 100.0));
        let mut speed = 0.0;
        for i in 0..4 {
            let x = 100.0 + 9.26 * i as f32;
            t.prev_center = Some(Point::new(x, 100.0));
            t.last_center = Point::new(x + 9.26, 100.0);
            speed = est.estimate(&mut t, 30.0, None);
        }
        assert!(
            (speed - 50.0).abs() < 5.0,
            "smoothed speed {speed} not within ±10% of 50"
        );
    }

    #[test]
    fn test_single_frame_spike_clamps_at_max() {
        // 60 px jump in one 30fps frame = 324 km/h raw; with history length 1
        // smoothing passes it through, so the clamp must catch it.
        let est = estimator();
        let mut t = track_at(Some((100.0, 100.0)), (100.0, 160.0));
        let speed = est.estimate(&mut t, 30.0, None);
        assert!((speed - 200.0).abs() < 1e-9, "expected clamp at 200, got {speed}");
    }

    #[test]
    fn test_negative_timestamp_delta_is_zero() {
        let est = estimator();
        let mut t = track_at(Some((100.0, 100.0)), (150.0, 100.0));
        t.last_timestamp = Some(10.0);
        assert_eq!(est.estimate(&mut t, 30.0, Some(9.5)), 0.0);
    }

    #[test]
    fn test_timestamp_delta_preferred_over_fps() {
        let est = estimator();
        // 20 px in 2 s = 1 m / 2 s = 1.8 km/h -> below min threshold -> 0.
        // With the 1/30 s fps fallback it would be 108 km/h.
        let mut t = track_at(Some((100.0, 100.0)), (120.0, 100.0));
        t.last_timestamp = Some(0.0);
        assert_eq!(est.estimate(&mut t, 30.0, Some(2.0)), 0.0);
    }

    #[test]
    fn test_outlier_rejected_by_median_filter() {
        let est = estimator();
        let mut t = track_at(Some((0.0, 0.0)), (9.26, 0.0));
        // Seed three consistent ~50 km/h samples
        for i in 0..3 {
            let x = 9.26 * i as f32;
            t.prev_center = Some(Point::new(x, 0.0));
            t.last_center = Point::new(x + 9.26, 0.0);
            est.estimate(&mut t, 30.0, None);
        }
        // One erratic 30 px jump (~162 km/h raw) should be filtered out
        t.prev_center = Some(Point::new(27.78, 0.0));
        t.last_center = Point::new(57.78, 0.0);
        let speed = est.estimate(&mut t, 30.0, None);
        assert!(
            speed < 80.0,
            "outlier should not dominate smoothed speed, got {speed}"
        );
    }

    #[test]
    fn test_history_capacity_bounded() {
        let est = estimator();
        let mut t = track_at(Some((0.0, 0.0)), (10.0, 0.0));
        for i in 0..20 {
            let x = 10.0 * i as f32;
            t.prev_center = Some(Point::new(x, 0.0));
            t.last_center = Point::new(x + 10.0, 0.0);
            est.estimate(&mut t, 30.0, None);
        }
        assert!(t.speed_history.len() <= 5);
    }
}
