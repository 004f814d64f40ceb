//! Hides sensitive parts of stored polylines before they are drawn.

use crate::geometry::{distance, LatLng};

#[derive(Clone, Debug, Default)]
pub struct PrivacyFilter {
    /// Meters trimmed from both ends of every line.
    pub start_end_range: f64,
    /// Points closer than `ignore_range` meters to any of these are dropped.
    pub ignore_points: Vec<LatLng>,
    pub ignore_range: f64,
}

impl PrivacyFilter {
    pub fn is_noop(&self) -> bool {
        self.start_end_range <= 0.0 && (self.ignore_points.is_empty() || self.ignore_range <= 0.0)
    }

    /// Returns `None` when nothing survives.
    pub fn apply(&self, points: &[LatLng]) -> Option<Vec<LatLng>> {
        if points.is_empty() {
            return Some(Vec::new());
        }
        let trimmed = self.trim_ends(points);
        let kept: Vec<LatLng> = trimmed
            .iter()
            .filter(|p| {
                !self
                    .ignore_points
                    .iter()
                    .any(|q| distance(p, q) < self.ignore_range)
            })
            .copied()
            .collect();
        if kept.is_empty() {
            None
        } else {
            Some(kept)
        }
    }

    fn trim_ends<'a>(&self, points: &'a [LatLng]) -> &'a [LatLng] {
        if self.start_end_range <= 0.0 {
            return points;
        }
        let last = points.len() - 1;
        let mut start = 0;
        let mut walked = 0.0;
        for i in 1..points.len() {
            walked += distance(&points[i], &points[i - 1]);
            if walked > self.start_end_range {
                start = i;
                break;
            }
        }
        let mut end = last;
        walked = 0.0;
        for i in (0..last).rev() {
            walked += distance(&points[i], &points[i + 1]);
            if walked > self.start_end_range {
                end = i;
                break;
            }
        }
        if start >= end {
            return &[];
        }
        &points[start..=end]
    }
}
