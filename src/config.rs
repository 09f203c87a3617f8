use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config file {path}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = Config::default();
        assert_eq!(config.tracking.recency_window_frames, 10);
        assert!((config.tracking.proximity_radius_px - 50.0).abs() < f32::EPSILON);
        assert!((config.line.crossing_tolerance_px - 15.0).abs() < f32::EPSILON);
        assert!((config.speed.pixel_to_meter_ratio - 0.05).abs() < f64::EPSILON);
        assert!((config.speed.max_speed_kmh - 200.0).abs() < f64::EPSILON);
        assert!((config.speed.speed_limit_kmh - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "speed:\n  speed_limit_kmh: 60.0\n  pixel_to_meter_ratio: 0.05\n  max_speed_kmh: 200.0\n  min_speed_kmh: 5.0\n  min_displacement_px: 5.0\n  history_len: 5\n  min_speed_samples: 3\n  speeding_cooldown_frames: 30\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!((config.speed.speed_limit_kmh - 60.0).abs() < f64::EPSILON);
        // Untouched sections come from Default
        assert_eq!(config.tracking.recency_window_frames, 10);
    }
}
