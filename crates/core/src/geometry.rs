//! Overlay-space primitives
//!
//! Overlay space is the pixel coordinate system of the annotation layer:
//! origin at the layer's top-left corner, y growing downward.

use serde::{Deserialize, Serialize};

/// A point in overlay or viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Containment test with the edges grown by `tolerance`
    pub fn contains(&self, point: &Point, tolerance: f32) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.right() + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.bottom() + tolerance
    }

    /// Smallest rectangle covering all points; `None` for an empty slice
    pub fn bounding(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in &points[1..] {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// Distance from `point` to the segment `start..end`
pub fn distance_to_segment(point: &Point, start: &Point, end: &Point) -> f32 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start);
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = Point::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest)
}

/// Whether `point` lies within `tolerance` of the polyline
///
/// A single-point polyline is treated as a dot.
pub fn near_polyline(point: &Point, points: &[Point], tolerance: f32) -> bool {
    match points {
        [] => false,
        [only] => point.distance_to(only) <= tolerance,
        _ => points
            .windows(2)
            .any(|pair| distance_to_segment(point, &pair[0], &pair[1]) <= tolerance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance_and_midpoint() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.midpoint(&b), Point::new(1.5, 2.0));
    }

    #[test]
    fn test_rect_contains_with_tolerance() {
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(rect.contains(&Point::new(15.0, 15.0), 0.0));
        assert!(!rect.contains(&Point::new(32.0, 15.0), 0.0));
        assert!(rect.contains(&Point::new(32.0, 15.0), 3.0));
    }

    #[test]
    fn test_bounding_rect() {
        let rect = Rect::bounding(&[
            Point::new(5.0, 8.0),
            Point::new(1.0, 12.0),
            Point::new(3.0, 2.0),
        ])
        .unwrap();
        assert_eq!(rect, Rect::new(1.0, 2.0, 4.0, 10.0));
        assert!(Rect::bounding(&[]).is_none());
    }

    #[test]
    fn test_segment_distance() {
        let start = Point::new(0.0, 0.0);
        let end = Point::new(10.0, 0.0);
        assert!((distance_to_segment(&Point::new(5.0, 3.0), &start, &end) - 3.0).abs() < 1e-6);
        // Beyond the end the distance is to the endpoint.
        assert!((distance_to_segment(&Point::new(13.0, 4.0), &start, &end) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_near_polyline() {
        let line = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)];
        assert!(near_polyline(&Point::new(11.0, 5.0), &line, 2.0));
        assert!(!near_polyline(&Point::new(5.0, 5.0), &line, 2.0));
        assert!(near_polyline(&Point::new(1.0, 1.0), &line[..1], 2.0));
        assert!(!near_polyline(&Point::new(1.0, 1.0), &[], 2.0));
    }
}
