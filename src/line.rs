// src/line.rs
//
// Holds the session's active violation line and the crossing predicate.
// Manual placement always wins over auto-detection; at most one line is
// active at a time.

use crate::collaborators::LineDetector;
use crate::geometry;
use crate::types::{Frame, LineConfig, Point, ViolationLine};
use anyhow::{bail, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Manual,
    Auto,
    None,
}

pub struct ViolationLineModel {
    config: LineConfig,
    manual: Option<ViolationLine>,
    auto: Option<ViolationLine>,
}

impl ViolationLineModel {
    pub fn new(config: LineConfig) -> Self {
        Self {
            config,
            manual: None,
            auto: None,
        }
    }

    /// Store a manually placed line. Clears any auto-detected line so the
    /// manual one is unambiguously the active line.
    pub fn set_manual(&mut self, p1: Point, p2: Point) -> Result<()> {
        let line = ViolationLine::new(p1, p2);
        if line.is_degenerate() {
            bail!("violation line endpoints must be distinct");
        }
        info!(
            "Violation line set manually: ({:.0},{:.0}) -> ({:.0},{:.0})",
            p1.x, p1.y, p2.x, p2.y
        );
        self.manual = Some(line);
        self.auto = None;
        Ok(())
    }

    /// Ask the road-marking heuristic for a candidate line. The result is
    /// stored as the active line only when no manual line exists, but is
    /// returned either way so callers can surface it to the user.
    pub fn auto_detect(&mut self, frame: &Frame, detector: &dyn LineDetector) -> Option<ViolationLine> {
        let candidate = detector.detect(frame);
        if let Some(line) = candidate {
            if line.is_degenerate() {
                debug!("Auto-detected line is degenerate, ignoring");
                return None;
            }
            if self.manual.is_none() {
                info!(
                    "📐 Auto-detected violation line: ({:.0},{:.0}) -> ({:.0},{:.0})",
                    line.p1.x, line.p1.y, line.p2.x, line.p2.y
                );
                self.auto = Some(line);
            }
        }
        candidate
    }

    pub fn active_line(&self) -> Option<ViolationLine> {
        self.manual.or(self.auto)
    }

    pub fn source(&self) -> LineSource {
        if self.manual.is_some() {
            LineSource::Manual
        } else if self.auto.is_some() {
            LineSource::Auto
        } else {
            LineSource::None
        }
    }

    /// False whenever no line is active.
    pub fn is_vehicle_crossing(&self, center: Point) -> bool {
        match self.active_line() {
            Some(line) => geometry::is_crossing(center, &line, self.config.crossing_tolerance_px),
            None => false,
        }
    }
}

/// Strict parser for user-supplied line coordinates: exactly two integer
/// `(x,y)` pairs, optionally wrapped in `[...]`, e.g. `(100,500),(1180,500)`.
/// Replaces the expression-evaluation the source tool used on raw user text —
/// anything that is not two plain pairs is rejected.
pub fn parse_line_coordinates(input: &str) -> Result<(Point, Point)> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        bail!("empty coordinate string");
    }
    let trimmed = compact
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(&compact);

    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| anyhow::anyhow!("expected two (x,y) pairs, got {input:?}"))?;

    let pairs: Vec<&str> = inner.split("),(").collect();
    if pairs.len() != 2 {
        bail!("expected exactly two (x,y) pairs, got {} in {input:?}", pairs.len());
    }

    let mut points = [Point::new(0.0, 0.0); 2];
    for (i, pair) in pairs.iter().enumerate() {
        let mut nums = pair.split(',');
        let (x, y) = match (nums.next(), nums.next(), nums.next()) {
            (Some(x), Some(y), None) => (x, y),
            _ => bail!("pair {:?} is not of the form x,y", pair),
        };
        let x: i32 = x
            .parse()
            .map_err(|_| anyhow::anyhow!("x coordinate {x:?} is not an integer"))?;
        let y: i32 = y
            .parse()
            .map_err(|_| anyhow::anyhow!("y coordinate {y:?} is not an integer"))?;
        if x < 0 || y < 0 {
            bail!("coordinates must be non-negative, got ({x},{y})");
        }
        points[i] = Point::new(x as f32, y as f32);
    }
    Ok((points[0], points[1]))
}
