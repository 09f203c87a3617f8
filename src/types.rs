use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub speed: SpeedConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum confidence to accept a vehicle detection
    pub vehicle_confidence_threshold: f32,
    /// Minimum confidence to accept a person detection
    pub person_confidence_threshold: f32,
    /// Minimum confidence to accept a traffic-light detection
    pub traffic_light_confidence_threshold: f32,
    /// Max centroid distance (px) between a person and a two-wheeler for the
    /// helmet check to associate them
    pub nearby_vehicle_distance_px: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            vehicle_confidence_threshold: 0.5,
            person_confidence_threshold: 0.5,
            traffic_light_confidence_threshold: 0.3,
            nearby_vehicle_distance_px: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Frames a track stays matchable without being seen
    pub recency_window_frames: u64,
    /// Max centroid distance (px) to reuse an existing identity
    pub proximity_radius_px: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            recency_window_frames: 10,
            proximity_radius_px: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedConfig {
    /// Scene scale — meters represented by one pixel
    pub pixel_to_meter_ratio: f64,
    /// Hard ceiling on any reported speed
    pub max_speed_kmh: f64,
    /// Smoothed speeds below this report as 0 (residual jitter)
    pub min_speed_kmh: f64,
    /// Displacements below this many pixels are detection jitter, not motion
    pub min_displacement_px: f64,
    /// Samples kept per identity for median smoothing
    pub history_len: usize,
    /// Speeding violation threshold
    pub speed_limit_kmh: f64,
    /// Samples an identity needs on record before a speeding event can fire
    pub min_speed_samples: usize,
    /// Frames between speeding events for the same identity
    pub speeding_cooldown_frames: u64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            pixel_to_meter_ratio: 0.05,
            max_speed_kmh: 200.0,
            min_speed_kmh: 5.0,
            min_displacement_px: 5.0,
            history_len: 5,
            speed_limit_kmh: 40.0,
            min_speed_samples: 3,
            speeding_cooldown_frames: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Max perpendicular distance (px) at which a centroid counts as "on" the line
    pub crossing_tolerance_px: f32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            crossing_tolerance_px: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub csv_path: String,
    pub screenshot_dir: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            csv_path: "violation_log.csv".to_string(),
            screenshot_dir: "temp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Directory scanned for *.jsonl detection dumps
    pub input_dir: String,
    /// Frame rate assumed when records carry no usable timestamps
    pub fps: f64,
    pub enable_plate_detection: bool,
    /// Manual violation line, e.g. "(100,500),(1180,500)". Empty = auto-detect.
    pub violation_line: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "input".to_string(),
            fps: 30.0,
            enable_plate_detection: true,
            violation_line: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "violation_detection=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// A usable box has positive extent and non-negative coordinates.
    /// Detectors occasionally emit inverted or clipped boxes; those are
    /// rejected at the filter stage rather than propagated.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2 && self.x1 >= 0.0 && self.y1 >= 0.0
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Car,
    Truck,
    Bus,
    Motorbike,
    Bicycle,
    Person,
    TrafficLight,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Truck => "truck",
            Self::Bus => "bus",
            Self::Motorbike => "motorbike",
            Self::Bicycle => "bicycle",
            Self::Person => "person",
            Self::TrafficLight => "traffic_light",
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(
            self,
            Self::Car | Self::Truck | Self::Bus | Self::Motorbike | Self::Bicycle
        )
    }

    /// Helmet checks only apply to riders of these
    pub fn is_two_wheeler(&self) -> bool {
        matches!(self, Self::Motorbike | Self::Bicycle)
    }
}

/// One labeled box from the detector collaborator. Ephemeral — consumed
/// within the frame that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub kind: ObjectKind,
    pub bbox: BBox,
    pub confidence: f32,
}

impl Detection {
    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// Opaque per-frame handle passed through to collaborators. The engine
/// itself never inspects pixels.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    /// Seconds since clip start
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViolationLine {
    pub p1: Point,
    pub p2: Point,
}

impl ViolationLine {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn is_degenerate(&self) -> bool {
        self.p1 == self.p2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    Red,
    Yellow,
    Green,
    Unknown,
}

impl LightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationType {
    #[serde(rename = "red_light_violation")]
    RedLight,
    #[serde(rename = "no_helmet_violation")]
    NoHelmet,
    #[serde(rename = "speeding_violation")]
    Speeding,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedLight => "red_light_violation",
            Self::NoHelmet => "no_helmet_violation",
            Self::Speeding => "speeding_violation",
        }
    }

    /// Short tag used in screenshot filenames
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RedLight => "red_light",
            Self::NoHelmet => "no_helmet",
            Self::Speeding => "speeding",
        }
    }
}

/// A committed observation of one violation. Immutable once created;
/// appended to the session log and merged into the ledger on flush.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationEvent {
    pub timestamp: String,
    pub violation_type: ViolationType,
    pub vehicle_type: String,
    pub confidence: f32,
    pub speed_kmh: f64,
    pub license_plate: String,
    pub frame_no: u64,
    pub screenshot_path: String,
    pub repeat_offender: bool,
}

impl ViolationEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: String,
        violation_type: ViolationType,
        vehicle_type: &str,
        confidence: f32,
        speed_kmh: f64,
        license_plate: &str,
        frame_no: u64,
        screenshot_path: String,
        repeat_offender: bool,
    ) -> Self {
        let plate = license_plate.trim();
        Self {
            timestamp,
            violation_type,
            vehicle_type: vehicle_type.to_string(),
            confidence: (confidence * 1000.0).round() / 1000.0,
            speed_kmh: (speed_kmh * 10.0).round() / 10.0,
            license_plate: if plate.is_empty() {
                "N/A".to_string()
            } else {
                plate.to_string()
            },
            frame_no,
            screenshot_path,
            repeat_offender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_rejects_degenerate() {
        let inverted = BBox {
            x1: 100.0,
            y1: 50.0,
            x2: 40.0,
            y2: 90.0,
        };
        assert!(!inverted.is_valid());

        let flat = BBox {
            x1: 10.0,
            y1: 20.0,
            x2: 50.0,
            y2: 20.0,
        };
        assert!(!flat.is_valid());

        let ok = BBox {
            x1: 10.0,
            y1: 20.0,
            x2: 50.0,
            y2: 60.0,
        };
        assert!(ok.is_valid());
        assert_eq!(ok.center(), Point::new(30.0, 40.0));
    }

    #[test]
    fn test_event_normalizes_plate_and_rounds() {
        let ev = ViolationEvent::new(
            "2026-01-01 12:00:00.000".to_string(),
            ViolationType::Speeding,
            "car",
            0.87654,
            52.37,
            "  ",
            42,
            String::new(),
            false,
        );
        assert_eq!(ev.license_plate, "N/A");
        assert!((ev.confidence - 0.877).abs() < 1e-6);
        assert!((ev.speed_kmh - 52.4).abs() < 1e-9);
    }

    #[test]
    fn test_object_kind_serde_names() {
        let kind: ObjectKind = serde_json::from_str("\"traffic_light\"").unwrap();
        assert_eq!(kind, ObjectKind::TrafficLight);
        assert!(!kind.is_vehicle());
        let kind: ObjectKind = serde_json::from_str("\"motorbike\"").unwrap();
        assert!(kind.is_two_wheeler());
    }
}
