// src/geometry.rs
//
// Pure geometry used by the line-crossing test and the tracker.
// Vertical and horizontal lines get exact fast paths; everything else uses
// the implicit line equation A*x + B*y + C = 0.

use crate::types::{Point, ViolationLine};

/// Euclidean distance between two centroids
pub fn centroid_distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Perpendicular distance from `point` to the infinite line through `p1`/`p2`.
/// Coincident endpoints degenerate to plain point distance.
pub fn distance_point_to_line(point: Point, p1: Point, p2: Point) -> f32 {
    if p1 == p2 {
        return centroid_distance(point, p1);
    }
    if p1.x == p2.x {
        // Vertical line — horizontal offset
        return (point.x - p1.x).abs();
    }
    if p1.y == p2.y {
        // Horizontal line — vertical offset
        return (point.y - p1.y).abs();
    }

    let a = p2.y - p1.y;
    let b = p1.x - p2.x;
    let c = p2.x * p1.y - p1.x * p2.y;
    (a * point.x + b * point.y + c).abs() / (a * a + b * b).sqrt()
}

/// Strict `<` so zero tolerance only ever matches a point exactly on the line.
/// A degenerate line never matches anything.
pub fn is_crossing(point: Point, line: &ViolationLine, tolerance: f32) -> bool {
    if line.is_degenerate() {
        return false;
    }
    distance_point_to_line(point, line.p1, line.p2) < tolerance
}
