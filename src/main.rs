// src/main.rs

mod collaborators;
mod config;
mod geometry;
mod ledger;
mod line;
mod orchestrator;
mod replay;
mod speed;
mod tracker;
mod types;

use anyhow::Result;
use collaborators::AssumeHelmet;
use orchestrator::FrameOrchestrator;
use replay::{RecordedLight, RecordedPlate};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let config = types::Config::load("config.yaml").unwrap_or_else(|e| {
        eprintln!("Using default configuration ({e:#})");
        types::Config::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.clone())
        .init();

    info!("🚦 Traffic Violation Detection Engine starting");
    info!(
        "Thresholds: proximity={:.0}px window={}f tolerance={:.0}px limit={:.0}km/h",
        config.tracking.proximity_radius_px,
        config.tracking.recency_window_frames,
        config.line.crossing_tolerance_px,
        config.speed.speed_limit_kmh
    );

    let files = replay::find_replay_files(&config.replay.input_dir);
    if files.is_empty() {
        error!("No detection dumps (*.jsonl) found in {}", config.replay.input_dir);
        return Ok(());
    }
    info!("Found {} detection dump(s) to replay", files.len());

    let light = RecordedLight::new();
    let plate = RecordedPlate::new();
    let mut orch = FrameOrchestrator::new(
        config.clone(),
        Box::new(plate.clone()),
        Box::new(light.clone()),
        Box::new(AssumeHelmet),
    );

    // Manual line beats auto-detection for the whole run
    if !config.replay.violation_line.trim().is_empty() {
        let (p1, p2) = line::parse_line_coordinates(&config.replay.violation_line)?;
        orch.line_model_mut().set_manual(p1, p2)?;
    }

    for (idx, path) in files.iter().enumerate() {
        info!("========================================");
        info!("Replaying clip {}/{}: {}", idx + 1, files.len(), path.display());

        let frames = match replay::read_frames(path) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Skipping {}: {e:#}", path.display());
                continue;
            }
        };

        // Fresh tracking session per clip; the ledger store is shared
        orch.reset_session();
        let stats = replay::run_replay(&mut orch, &light, &plate, &frames, config.replay.fps);

        info!("  Frames: {}", stats.frames);
        info!("  Detections: {}", stats.detections);
        info!("  Violations: {}", stats.events);
        for (vtype, count) in &stats.events_per_type {
            info!("    {}: {}", vtype.as_str(), count);
        }
    }

    match orch.ledger_mut().flush() {
        Ok(Some(path)) => info!("Ledger written to {}", path.display()),
        Ok(None) => info!("No violations this run; ledger untouched"),
        Err(e) => warn!("Ledger flush failed, events kept in memory: {e}"),
    }

    let summary = orch.ledger().summarize();
    info!("📊 Ledger: {} total violation(s)", summary.total);
    for (vtype, count) in &summary.per_type {
        info!("    {vtype}: {count}");
    }
    if summary.repeat_offenders > 0 {
        info!("    repeat offenders: {}", summary.repeat_offenders);
    }
    if let Some(ts) = &summary.most_recent_timestamp {
        info!("    most recent: {ts}");
    }

    Ok(())
}
