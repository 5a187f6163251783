//! Freehand stroke geometry: smoothing, bounds and distances

use serde::{Deserialize, Serialize};

use crate::transform::{DocPoint, DocRect};

/// Smoothing applied once when a stroke is completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    None,
    Low,
    #[default]
    Medium,
    High,
}

impl Smoothing {
    /// Weight of the neighbour mean when blending an interior point
    pub fn factor(self) -> f32 {
        match self {
            Smoothing::None => 0.0,
            Smoothing::Low => 0.1,
            Smoothing::Medium => 0.3,
            Smoothing::High => 0.5,
        }
    }
}

/// Blend each interior point with the mean of its neighbours
///
/// Neighbours are read from the unsmoothed input; endpoints are kept.
pub fn smooth(points: &[DocPoint], level: Smoothing) -> Vec<DocPoint> {
    let factor = level.factor();
    if factor == 0.0 || points.len() < 3 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(points.len());
    out.push(points[0]);
    for window in points.windows(3) {
        let (prev, p, next) = (window[0], window[1], window[2]);
        let mean_x = (prev.x + next.x) / 2.0;
        let mean_y = (prev.y + next.y) / 2.0;
        out.push(DocPoint::new(
            (1.0 - factor) * p.x + factor * mean_x,
            (1.0 - factor) * p.y + factor * mean_y,
        ));
    }
    out.push(points[points.len() - 1]);
    out
}

pub fn bounds(points: &[DocPoint]) -> Option<DocRect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(DocRect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

pub fn distance_to_segment(point: DocPoint, a: DocPoint, b: DocPoint) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return point.distance_to(&a);
    }
    let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    point.distance_to(&DocPoint::new(a.x + t * dx, a.y + t * dy))
}

/// Shortest distance from `point` to the polyline; infinite when empty
pub fn distance_to_polyline(point: DocPoint, points: &[DocPoint]) -> f32 {
    match points {
        [] => f32::INFINITY,
        [only] => point.distance_to(only),
        _ => points
            .windows(2)
            .map(|w| distance_to_segment(point, w[0], w[1]))
            .fold(f32::INFINITY, f32::min),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f32, f32)]) -> Vec<DocPoint> {
        raw.iter().map(|&(x, y)| DocPoint::new(x, y)).collect()
    }

    #[test]
    fn test_smoothing_factors() {
        assert_eq!(Smoothing::None.factor(), 0.0);
        assert_eq!(Smoothing::Low.factor(), 0.1);
        assert_eq!(Smoothing::Medium.factor(), 0.3);
        assert_eq!(Smoothing::High.factor(), 0.5);
    }

    #[test]
    fn test_smooth_blends_interior_points() {
        let input = pts(&[(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)]);
        let out = smooth(&input, Smoothing::High);

        assert_eq!(out[0], input[0]);
        assert_eq!(out[2], input[2]);
        // mean of neighbours is (10, 0); half way from (10, 10)
        assert_eq!(out[1], DocPoint::new(10.0, 5.0));
    }

    #[test]
    fn test_smooth_none_is_identity() {
        let input = pts(&[(0.0, 0.0), (3.0, 7.0), (5.0, 1.0), (9.0, 9.0)]);
        assert_eq!(smooth(&input, Smoothing::None), input);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds(&[]), None);
        let rect = bounds(&pts(&[(5.0, 9.0), (1.0, 3.0), (4.0, 12.0)])).unwrap();
        assert_eq!(rect, DocRect::new(1.0, 3.0, 4.0, 9.0));
    }

    #[test]
    fn test_polyline_distance() {
        let line = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        assert_eq!(distance_to_polyline(DocPoint::new(5.0, 2.0), &line), 2.0);
        assert_eq!(distance_to_polyline(DocPoint::new(13.0, 5.0), &line), 3.0);
        assert_eq!(distance_to_polyline(DocPoint::new(0.0, 0.0), &[]), f32::INFINITY);
    }
}
