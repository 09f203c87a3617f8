// src/orchestrator.rs
//
// Drives one frame through the whole pipeline:
//   detections -> identity assignment -> speed -> line crossing -> events.
// Strictly frame-sequential; the tracker and estimator state only makes
// sense under temporal ordering.

use crate::collaborators::{HelmetClassifier, LightClassifier, PlateReader};
use crate::geometry::centroid_distance;
use crate::ledger::Ledger;
use crate::line::ViolationLineModel;
use crate::speed::SpeedEstimator;
use crate::tracker::IdentityTracker;
use crate::types::{
    Config, Detection, Frame, LightState, ObjectKind, ViolationEvent, ViolationType,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub struct FrameOrchestrator {
    config: Config,
    tracker: IdentityTracker,
    estimator: SpeedEstimator,
    line: ViolationLineModel,
    ledger: Ledger,
    plate_reader: Box<dyn PlateReader>,
    light_classifier: Box<dyn LightClassifier>,
    helmet_classifier: Box<dyn HelmetClassifier>,
    enable_plate_detection: bool,
    /// Identities already flagged during the current continuous red phase.
    /// Without this a vehicle sitting on the line would fire an event every
    /// frame the light stays red. Reset when the light leaves red.
    red_flagged: HashSet<u64>,
    /// Frame of the last speeding event per identity, for the cooldown.
    last_speeding_frame: HashMap<u64, u64>,
    /// Two-wheeler identities already flagged for a helmetless rider, so the
    /// event fires once per identity instead of every visible frame.
    helmet_flagged: HashSet<u64>,
}

impl FrameOrchestrator {
    pub fn new(
        config: Config,
        plate_reader: Box<dyn PlateReader>,
        light_classifier: Box<dyn LightClassifier>,
        helmet_classifier: Box<dyn HelmetClassifier>,
    ) -> Self {
        let enable_plate_detection = config.replay.enable_plate_detection;
        Self {
            tracker: IdentityTracker::new(config.tracking.clone()),
            estimator: SpeedEstimator::new(config.speed.clone()),
            line: ViolationLineModel::new(config.line.clone()),
            ledger: Ledger::new(&config.ledger),
            config,
            plate_reader,
            light_classifier,
            helmet_classifier,
            enable_plate_detection,
            red_flagged: HashSet::new(),
            last_speeding_frame: HashMap::new(),
            helmet_flagged: HashSet::new(),
        }
    }

    pub fn line_model(&self) -> &ViolationLineModel {
        &self.line
    }

    pub fn line_model_mut(&mut self) -> &mut ViolationLineModel {
        &mut self.line
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Process one frame of detections, returning the violation events it
    /// produced (also appended to the ledger session log). Malformed
    /// detections are dropped, never propagated; a bad frame yields no
    /// events rather than an error.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        frame_no: u64,
        fps: f64,
    ) -> Vec<ViolationEvent> {
        let thresholds = &self.config.detection;
        let mut vehicles: Vec<&Detection> = Vec::new();
        let mut persons: Vec<&Detection> = Vec::new();
        let mut lights = Vec::new();
        for det in detections {
            if !det.bbox.is_valid() {
                debug!("Dropping malformed detection {:?}", det.bbox);
                continue;
            }
            match det.kind {
                k if k.is_vehicle() && det.confidence > thresholds.vehicle_confidence_threshold => {
                    vehicles.push(det)
                }
                ObjectKind::Person
                    if det.confidence > thresholds.person_confidence_threshold =>
                {
                    persons.push(det)
                }
                ObjectKind::TrafficLight
                    if det.confidence > thresholds.traffic_light_confidence_threshold =>
                {
                    lights.push(det.bbox)
                }
                _ => {}
            }
        }

        let light = self.light_classifier.frame_light(frame, &lights);
        if light != LightState::Red {
            self.red_flagged.clear();
        }

        let timestamp = now_timestamp();
        let mut events = Vec::new();
        let mut live_ids = HashSet::with_capacity(vehicles.len());
        let mut vehicle_ids = Vec::with_capacity(vehicles.len());

        for det in &vehicles {
            let center = det.center();
            let id = self.tracker.assign(center, frame_no);
            live_ids.insert(id);
            vehicle_ids.push(id);

            let plate = if self.enable_plate_detection {
                self.plate_reader
                    .read_plate(frame, &det.bbox)
                    .unwrap_or_default()
            } else {
                String::new()
            };
            let repeat_offender = self.ledger.is_repeat_offender(&plate);

            let (speed, samples) = match self.tracker.get_mut(id) {
                Some(track) => {
                    let s = self
                        .estimator
                        .estimate(track, fps, Some(frame.timestamp));
                    (s, track.speed_history.len())
                }
                None => (0.0, 0),
            };

            // Speeding: requires enough history that one erratic detection
            // cannot fire an event, plus a per-identity cooldown.
            if speed > self.config.speed.speed_limit_kmh
                && samples >= self.config.speed.min_speed_samples
                && self.cooldown_elapsed(id, frame_no)
            {
                info!(
                    "🚨 Speeding: id={} {} at {:.1} km/h (limit {:.0}) frame {}",
                    id,
                    det.kind.as_str(),
                    speed,
                    self.config.speed.speed_limit_kmh,
                    frame_no
                );
                self.last_speeding_frame.insert(id, frame_no);
                events.push(self.make_event(
                    &timestamp,
                    ViolationType::Speeding,
                    det,
                    speed,
                    &plate,
                    frame_no,
                    repeat_offender,
                ));
            }

            if light == LightState::Red
                && self.line.is_vehicle_crossing(center)
                && self.red_flagged.insert(id)
            {
                info!(
                    "🚨 Red-light violation: id={} {} at ({:.0},{:.0}) frame {}",
                    id,
                    det.kind.as_str(),
                    center.x,
                    center.y,
                    frame_no
                );
                events.push(self.make_event(
                    &timestamp,
                    ViolationType::RedLight,
                    det,
                    speed,
                    &plate,
                    frame_no,
                    repeat_offender,
                ));
            }
        }

        events.extend(self.helmet_pass(frame, &persons, &vehicles, &vehicle_ids, &timestamp, frame_no));

        self.tracker.evict_stale(&live_ids);
        self.last_speeding_frame.retain(|id, _| live_ids.contains(id));
        self.red_flagged.retain(|id| live_ids.contains(id));
        self.helmet_flagged.retain(|id| live_ids.contains(id));

        for event in &events {
            self.ledger.append(event.clone());
        }
        events
    }

    /// Riders of a nearby two-wheeler without a helmet. The association is
    /// purely by centroid proximity, matching how the detections relate in
    /// the image plane.
    fn helmet_pass(
        &mut self,
        frame: &Frame,
        persons: &[&Detection],
        vehicles: &[&Detection],
        vehicle_ids: &[u64],
        timestamp: &str,
        frame_no: u64,
    ) -> Vec<ViolationEvent> {
        let mut events = Vec::new();
        for person in persons {
            let person_center = person.center();
            let nearby = vehicles.iter().enumerate().find(|(_, v)| {
                v.kind.is_two_wheeler()
                    && centroid_distance(person_center, v.center())
                        < self.config.detection.nearby_vehicle_distance_px
            });
            let Some((idx, vehicle)) = nearby else { continue };

            if !self.helmet_classifier.has_helmet(frame, &person.bbox)
                && self.helmet_flagged.insert(vehicle_ids[idx])
            {
                info!(
                    "🚨 No-helmet violation: {} rider, frame {}",
                    vehicle.kind.as_str(),
                    frame_no
                );
                let screenshot =
                    self.screenshot_path(ViolationType::NoHelmet, timestamp);
                events.push(ViolationEvent::new(
                    timestamp.to_string(),
                    ViolationType::NoHelmet,
                    vehicle.kind.as_str(),
                    0.8,
                    0.0,
                    "",
                    frame_no,
                    screenshot,
                    false,
                ));
            }
        }
        events
    }

    #[allow(clippy::too_many_arguments)]
    fn make_event(
        &self,
        timestamp: &str,
        violation_type: ViolationType,
        det: &Detection,
        speed: f64,
        plate: &str,
        frame_no: u64,
        repeat_offender: bool,
    ) -> ViolationEvent {
        let screenshot = self.screenshot_path(violation_type, timestamp);
        ViolationEvent::new(
            timestamp.to_string(),
            violation_type,
            det.kind.as_str(),
            det.confidence,
            speed,
            plate,
            frame_no,
            screenshot,
            repeat_offender,
        )
    }

    /// Where the rendering layer is expected to drop the evidence crop.
    /// The engine only names the artifact; it never writes pixels.
    fn screenshot_path(&self, violation_type: ViolationType, timestamp: &str) -> String {
        let stamp: String = timestamp
            .chars()
            .map(|c| match c {
                ':' => '-',
                ' ' => '_',
                other => other,
            })
            .collect();
        self.ledger
            .screenshot_dir()
            .join(format!("violation_{}_{stamp}.jpg", violation_type.tag()))
            .to_string_lossy()
            .into_owned()
    }

    fn cooldown_elapsed(&self, id: u64, frame_no: u64) -> bool {
        match self.last_speeding_frame.get(&id) {
            Some(&last) => frame_no.saturating_sub(last) >= self.config.speed.speeding_cooldown_frames,
            None => true,
        }
    }

    /// Start a fresh tracking session (new clip) while keeping the shared
    /// ledger store.
    pub fn reset_session(&mut self) {
        self.tracker.reset();
        self.red_flagged.clear();
        self.last_speeding_frame.clear();
        self.helmet_flagged.clear();
    }
}

fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}
