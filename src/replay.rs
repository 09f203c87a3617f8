// src/replay.rs
//
// Offline replay of detector output. A dump is one JSON object per line:
//   {"frame_no":0,"timestamp":0.0,"width":1280,"height":720,
//    "light":"red","detections":[{"kind":"car","bbox":{...},"confidence":0.9}]}
// produced by an out-of-scope detector run. Each file is one clip and gets
// a fresh tracking session; all sessions share the one ledger store.

use crate::collaborators::{LightClassifier, PlateReader};
use crate::orchestrator::FrameOrchestrator;
use crate::types::{Detection, Frame, LightState, ViolationType};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
pub struct FrameRecord {
    pub frame_no: u64,
    pub timestamp: f64,
    pub width: usize,
    pub height: usize,
    /// Ground-truth light color captured alongside the detections, if the
    /// dump includes one. Absent means unknown.
    #[serde(default)]
    pub light: Option<LightState>,
    /// Ground-truth license plate for the frame's primary vehicle, when the
    /// dump carries OCR output. Absent means unreadable.
    #[serde(default)]
    pub plate: Option<String>,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Default)]
pub struct ReplayStats {
    pub frames: u64,
    pub detections: usize,
    pub events: usize,
    pub events_per_type: HashMap<ViolationType, usize>,
}

/// Light classifier fed from the replay records rather than pixels: the
/// replay loop stores each record's color in the shared cell before handing
/// the frame to the orchestrator.
#[derive(Clone)]
pub struct RecordedLight(Rc<Cell<LightState>>);

impl RecordedLight {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(LightState::Unknown)))
    }

    pub fn set(&self, state: LightState) {
        self.0.set(state);
    }
}

impl Default for RecordedLight {
    fn default() -> Self {
        Self::new()
    }
}

impl LightClassifier for RecordedLight {
    fn classify(&self, _frame: &Frame, _bbox: &crate::types::BBox) -> LightState {
        self.0.get()
    }

    // The recorded state covers the whole frame, so the verdict stands
    // even when no traffic-light box was detected.
    fn frame_light(&self, _frame: &Frame, _lights: &[crate::types::BBox]) -> LightState {
        self.0.get()
    }
}

/// Plate feed mirrored from the replay records, like [`RecordedLight`]: the
/// replay loop stores each record's plate before the frame is processed.
#[derive(Clone, Default)]
pub struct RecordedPlate(Rc<RefCell<Option<String>>>);

impl RecordedPlate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, plate: Option<String>) {
        *self.0.borrow_mut() = plate;
    }
}

impl PlateReader for RecordedPlate {
    fn read_plate(&mut self, _frame: &Frame, _bbox: &crate::types::BBox) -> Option<String> {
        self.0.borrow().clone()
    }
}

/// All *.jsonl dumps under `dir`, sorted for deterministic processing order.
pub fn find_replay_files(dir: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|e| e == "jsonl").unwrap_or(false))
        .collect();
    files.sort();
    files
}

pub fn read_frames(path: &Path) -> Result<Vec<FrameRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut frames = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad frame record", path.display(), lineno + 1))?;
        frames.push(record);
    }
    Ok(frames)
}

/// Replay one clip through the orchestrator. Frames are processed strictly
/// in file order; the light and plate feeds are updated before every frame.
pub fn run_replay(
    orchestrator: &mut FrameOrchestrator,
    light: &RecordedLight,
    plate: &RecordedPlate,
    frames: &[FrameRecord],
    fps: f64,
) -> ReplayStats {
    let mut stats = ReplayStats::default();
    let mut line_checked = false;

    for record in frames {
        let frame = Frame {
            width: record.width,
            height: record.height,
            timestamp: record.timestamp,
        };
        light.set(record.light.unwrap_or(LightState::Unknown));
        plate.set(record.plate.clone());

        // One-shot auto-detection on the first frame when no line was
        // configured, as the interactive tool does for uploaded stills.
        if !line_checked {
            line_checked = true;
            if orchestrator.line_model().active_line().is_none() {
                let candidate = orchestrator
                    .line_model_mut()
                    .auto_detect(&frame, &crate::collaborators::FallbackLineDetector);
                if candidate.is_none() {
                    warn!("No violation line available; red-light checks disabled");
                }
            }
        }

        let events = orchestrator.process_frame(&frame, &record.detections, record.frame_no, fps);
        stats.frames += 1;
        stats.detections += record.detections.len();
        stats.events += events.len();
        for event in &events {
            *stats.events_per_type.entry(event.violation_type).or_insert(0) += 1;
        }
    }
    info!(
        "Clip done: {} frames, {} detections, {} event(s)",
        stats.frames, stats.detections, stats.events
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{AssumeHelmet, NullPlateReader};
    use crate::types::{Config, LedgerConfig};
    use std::io::Write;

    fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_find_replay_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_jsonl(dir.path(), "b.jsonl", &[]);
        write_jsonl(dir.path(), "a.jsonl", &[]);
        write_jsonl(dir.path(), "notes.txt", &[]);

        let files = find_replay_files(dir.path().to_str().unwrap());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }

    #[test]
    fn test_read_frames_skips_blank_lines_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_jsonl(
            dir.path(),
            "clip.jsonl",
            &[
                r#"{"frame_no":0,"timestamp":0.0,"width":1280,"height":720,"detections":[]}"#,
                "",
                r#"{"frame_no":1,"timestamp":0.033,"width":1280,"height":720,"light":"red","detections":[{"kind":"car","bbox":{"x1":60.0,"y1":75.0,"x2":140.0,"y2":125.0},"confidence":0.9}]}"#,
            ],
        );
        let frames = read_frames(&good).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].light, Some(LightState::Red));
        assert_eq!(frames[1].plate, None);
        assert_eq!(frames[1].detections.len(), 1);

        let bad = write_jsonl(dir.path(), "bad.jsonl", &["not json"]);
        assert!(read_frames(&bad).is_err());
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            ledger: LedgerConfig {
                csv_path: dir.join("log.csv").to_string_lossy().into_owned(),
                screenshot_dir: dir.join("temp").to_string_lossy().into_owned(),
            },
            ..Default::default()
        }
    }

    fn car_record(frame_no: u64, cy: f32, plate: Option<&str>) -> FrameRecord {
        FrameRecord {
            frame_no,
            timestamp: frame_no as f64 / 30.0,
            width: 1280,
            height: 720,
            light: Some(LightState::Red),
            plate: plate.map(str::to_string),
            detections: vec![Detection {
                kind: crate::types::ObjectKind::Car,
                bbox: crate::types::BBox {
                    x1: 260.0,
                    y1: cy - 25.0,
                    x2: 340.0,
                    y2: cy + 25.0,
                },
                confidence: 0.9,
            }],
        }
    }

    #[test]
    fn test_recorded_light_answers_without_light_boxes() {
        let light = RecordedLight::new();
        assert_eq!(
            light.frame_light(&Frame { width: 1280, height: 720, timestamp: 0.0 }, &[]),
            LightState::Unknown
        );
        light.set(LightState::Red);
        assert_eq!(
            light.frame_light(&Frame { width: 1280, height: 720, timestamp: 0.0 }, &[]),
            LightState::Red
        );
    }

    #[test]
    fn test_run_replay_red_light_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let light = RecordedLight::new();
        let plate = RecordedPlate::new();
        let mut orch = FrameOrchestrator::new(
            test_config(dir.path()),
            Box::new(NullPlateReader),
            Box::new(light.clone()),
            Box::new(AssumeHelmet),
        );

        // Auto-detected line lands at y=540 for a 720p frame; a car crossing
        // it during a red phase must produce exactly one event. The records
        // carry the light state but no traffic-light detection, so the
        // verdict comes from the recorded feed alone.
        let frames = vec![car_record(0, 400.0, None), car_record(1, 535.0, None)];

        let stats = run_replay(&mut orch, &light, &plate, &frames, 30.0);
        assert_eq!(stats.frames, 2);
        assert_eq!(
            stats.events_per_type.get(&ViolationType::RedLight),
            Some(&1)
        );
    }

    #[test]
    fn test_run_replay_plate_feed_marks_repeat_offender() {
        let dir = tempfile::tempdir().unwrap();
        let light = RecordedLight::new();
        let plate = RecordedPlate::new();
        let mut orch = FrameOrchestrator::new(
            test_config(dir.path()),
            Box::new(plate.clone()),
            Box::new(light.clone()),
            Box::new(AssumeHelmet),
        );

        let frames = vec![
            car_record(0, 400.0, Some("KA01AB1234")),
            car_record(1, 535.0, Some("KA01AB1234")),
        ];

        run_replay(&mut orch, &light, &plate, &frames, 30.0);
        assert_eq!(orch.ledger().session().len(), 1);
        assert_eq!(orch.ledger().session()[0].license_plate, "KA01AB1234");
        assert!(!orch.ledger().session()[0].repeat_offender);
        orch.ledger_mut().flush().unwrap();

        // Same plate in a later clip is now a repeat offender
        orch.reset_session();
        run_replay(&mut orch, &light, &plate, &frames, 30.0);
        assert_eq!(orch.ledger().session().len(), 1);
        assert!(orch.ledger().session()[0].repeat_offender);
    }
}
