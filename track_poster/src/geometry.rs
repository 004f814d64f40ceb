//! Plane and geodetic helpers shared by the loader and every drawer.

use std::f64::consts::PI;
use std::ops::{Add, AddAssign, Mul, Sub};

use geo::Coord;
use serde::{Deserialize, Serialize};
use tracing::warn;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Decimal digits kept by the encoded-polyline format.
const POLYLINE_PRECISION: u32 = 5;

/// A point or extent on the page, in millimeters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct XY {
    pub x: f64,
    pub y: f64,
}

impl XY {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn min_component(&self) -> f64 {
        self.x.min(self.y)
    }
}

impl Add for XY {
    type Output = XY;

    fn add(self, other: XY) -> XY {
        XY::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for XY {
    fn add_assign(&mut self, other: XY) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for XY {
    type Output = XY;

    fn sub(self, other: XY) -> XY {
        XY::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for XY {
    type Output = XY;

    fn mul(self, factor: f64) -> XY {
        XY::new(self.x * factor, self.y * factor)
    }
}

impl Mul<XY> for f64 {
    type Output = XY;

    fn mul(self, xy: XY) -> XY {
        xy * self
    }
}

impl Mul for XY {
    type Output = XY;

    fn mul(self, other: XY) -> XY {
        XY::new(self.x * other.x, self.y * other.y)
    }
}

/// Closed numeric interval that only ever grows.
///
/// An empty range reports `0.0` for both bounds and for its diameter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ValueRange {
    bounds: Option<(f64, f64)>,
}

impl ValueRange {
    pub fn new() -> Self {
        Self { bounds: None }
    }

    pub fn from_pair(a: f64, b: f64) -> Self {
        let mut range = Self::new();
        range.extend(a);
        range.extend(b);
        range
    }

    pub fn is_valid(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn lower(&self) -> f64 {
        self.bounds.map_or(0.0, |(lo, _)| lo)
    }

    pub fn upper(&self) -> f64 {
        self.bounds.map_or(0.0, |(_, hi)| hi)
    }

    pub fn diameter(&self) -> f64 {
        self.bounds.map_or(0.0, |(lo, hi)| hi - lo)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.bounds
            .is_some_and(|(lo, hi)| lo <= value && value <= hi)
    }

    pub fn extend(&mut self, value: f64) {
        self.bounds = Some(match self.bounds {
            None => (value, value),
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
        });
    }
}

/// WGS84 coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Web-Mercator position, x in [0, 2], y growing southwards.
    pub fn to_xy(&self) -> XY {
        XY::new(lng2x(self.lng), lat2y(self.lat))
    }
}

pub fn lng2x(lng_deg: f64) -> f64 {
    lng_deg / 180.0 + 1.0
}

pub fn lat2y(lat_deg: f64) -> f64 {
    0.5 - (PI / 4.0 * (1.0 + lat_deg / 90.0)).tan().ln() / PI
}

pub fn y2lat(y: f64) -> f64 {
    90.0 * (4.0 / PI * (PI * (0.5 - y)).exp().atan() - 1.0)
}

/// Axis-aligned geodetic rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLngBounds {
    pub lat_lo: f64,
    pub lat_hi: f64,
    pub lng_lo: f64,
    pub lng_hi: f64,
}

impl LatLngBounds {
    pub fn from_point(p: LatLng) -> Self {
        Self {
            lat_lo: p.lat,
            lat_hi: p.lat,
            lng_lo: p.lng,
            lng_hi: p.lng,
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self::from_point(*p),
                Some(b) => b.extended(*p),
            })
        })
    }

    pub fn from_center_size(center: LatLng, dlat: f64, dlng: f64) -> Self {
        Self {
            lat_lo: (center.lat - dlat / 2.0).max(-90.0),
            lat_hi: (center.lat + dlat / 2.0).min(90.0),
            lng_lo: center.lng - dlng / 2.0,
            lng_hi: center.lng + dlng / 2.0,
        }
    }

    pub fn extended(mut self, p: LatLng) -> Self {
        self.lat_lo = self.lat_lo.min(p.lat);
        self.lat_hi = self.lat_hi.max(p.lat);
        self.lng_lo = self.lng_lo.min(p.lng);
        self.lng_hi = self.lng_hi.max(p.lng);
        self
    }

    pub fn union(self, other: LatLngBounds) -> Self {
        Self {
            lat_lo: self.lat_lo.min(other.lat_lo),
            lat_hi: self.lat_hi.max(other.lat_hi),
            lng_lo: self.lng_lo.min(other.lng_lo),
            lng_hi: self.lng_hi.max(other.lng_hi),
        }
    }

    pub fn contains(&self, p: &LatLng) -> bool {
        self.lat_lo <= p.lat && p.lat <= self.lat_hi && self.lng_lo <= p.lng && p.lng <= self.lng_hi
    }

    /// Span in projected (Mercator) units.
    pub fn projected_span(&self) -> XY {
        XY::new(
            lng2x(self.lng_hi) - lng2x(self.lng_lo),
            (lat2y(self.lat_lo) - lat2y(self.lat_hi)).abs(),
        )
    }

    /// Grow the rectangle around its projected center until it spans `span`
    /// Mercator units in each direction; never shrinks.
    pub fn grown_to_projected_span(&self, span: XY) -> Self {
        let own = self.projected_span();
        let cx = (lng2x(self.lng_lo) + lng2x(self.lng_hi)) / 2.0;
        let cy = (lat2y(self.lat_lo) + lat2y(self.lat_hi)) / 2.0;
        let half_x = own.x.max(span.x) / 2.0;
        let half_y = own.y.max(span.y) / 2.0;
        Self {
            lat_lo: y2lat(cy + half_y),
            lat_hi: y2lat(cy - half_y),
            lng_lo: (cx - half_x - 1.0) * 180.0,
            lng_hi: (cx + half_x - 1.0) * 180.0,
        }
    }
}

/// Project geodetic polylines into the `size` box at `offset`, preserving
/// aspect ratio and centering the bounding box.
///
/// Points outside `bbox` split a line. Returns nothing for a degenerate box.
pub fn project(
    bbox: &LatLngBounds,
    size: XY,
    offset: XY,
    lines: &[Vec<LatLng>],
) -> Vec<Vec<XY>> {
    let min_x = lng2x(bbox.lng_lo);
    let mut d_x = lng2x(bbox.lng_hi) - min_x;
    while d_x >= 2.0 {
        d_x -= 2.0;
    }
    while d_x < 0.0 {
        d_x += 2.0;
    }
    let min_y = lat2y(bbox.lat_lo);
    let max_y = lat2y(bbox.lat_hi);
    let d_y = (max_y - min_y).abs();
    if d_x == 0.0 || d_y == 0.0 || size.x <= 0.0 || size.y <= 0.0 {
        return Vec::new();
    }
    let scale = if size.x / size.y <= d_x / d_y {
        size.x / d_x
    } else {
        size.y / d_y
    };
    let origin = offset + 0.5 * (size - scale * XY::new(d_x, -d_y)) - scale * XY::new(min_x, min_y);

    let mut out = Vec::new();
    for line in lines {
        let mut current: Vec<XY> = Vec::new();
        for p in line {
            if bbox.contains(p) {
                current.push(origin + scale * p.to_xy());
            } else if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

/// Find the near-square layout of `count` equal cells inside `dimensions`
/// that wastes the least area. Returns `(cell_size, (columns, rows))`.
pub fn compute_grid(count: usize, dimensions: XY) -> Option<(f64, (usize, usize))> {
    let mut best: Option<(f64, (usize, usize))> = None;
    let mut min_waste = f64::INFINITY;
    let area = dimensions.x * dimensions.y;
    for count_x in 1..=count {
        let size_x = dimensions.x / count_x as f64;
        for count_y in 1..=count {
            if count_x * count_y < count {
                continue;
            }
            let size = size_x.min(dimensions.y / count_y as f64);
            let waste = area - count as f64 * size * size;
            if waste < 0.0 {
                continue;
            }
            if best.is_none() || waste < min_waste {
                best = Some((size, (count_x, count_y)));
                min_waste = waste;
            }
        }
    }
    best
}

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn distance(a: &LatLng, b: &LatLng) -> f64 {
    haversine_distance(a.lat, a.lng, b.lat, b.lng)
}

/// Summed great-circle length of one point sequence, in meters.
pub fn path_length(points: &[LatLng]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

/// Google encoded-polyline string with 1e-5 degree precision. Points outside
/// the valid coordinate range cannot be encoded and yield an empty string.
pub fn encode_polyline<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> String {
    let coords = points.into_iter().map(|p| Coord { x: p.lng, y: p.lat });
    polyline::encode_coordinates(coords, POLYLINE_PRECISION).unwrap_or_else(|e| {
        warn!("cannot encode polyline: {e}");
        String::new()
    })
}

/// Decode a Google encoded-polyline string. `None` on malformed input.
pub fn decode_polyline(encoded: &str) -> Option<Vec<LatLng>> {
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION).ok()?;
    Some(line.coords().map(|c| LatLng::new(c.y, c.x)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        let dist = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((dist - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn value_range_grows_monotonically() {
        let mut r = ValueRange::new();
        assert!(!r.is_valid());
        assert_eq!(r.diameter(), 0.0);
        r.extend(5.0);
        r.extend(2.0);
        r.extend(3.0);
        assert_eq!((r.lower(), r.upper()), (2.0, 5.0));
        assert!(r.contains(4.0));
        assert!(!r.contains(6.0));
    }

    #[test]
    fn compute_grid_fits_all_cells() {
        for n in 1..40 {
            let size = XY::new(180.0, 240.0);
            let (cell, (cx, cy)) = compute_grid(n, size).expect("grid");
            assert!(cx * cy >= n);
            assert!(size.x * size.y - n as f64 * cell * cell >= 0.0);
        }
        assert!(compute_grid(0, XY::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn compute_grid_single_cell_is_square() {
        let (cell, counts) = compute_grid(1, XY::new(100.0, 50.0)).unwrap();
        assert_eq!(counts, (1, 1));
        assert!((cell - 50.0).abs() < 1e-9);
    }

    #[test]
    fn known_polyline_encoding() {
        let points = vec![
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ];
        let encoded = encode_polyline(&points);
        assert_eq!(encoded, "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        let decoded = decode_polyline(&encoded).unwrap();
        assert_eq!(encode_polyline(&decoded), encoded);
        for (a, b) in decoded.iter().zip(points.iter()) {
            assert!((a.lat - b.lat).abs() < 1e-5 && (a.lng - b.lng).abs() < 1e-5);
        }
    }

    #[test]
    fn malformed_polyline_is_rejected() {
        assert!(decode_polyline("_p~iF~ps|U_").is_none());
        assert_eq!(decode_polyline("").unwrap(), Vec::<LatLng>::new());
        assert_eq!(encode_polyline(&[LatLng::new(95.0, 0.0)]), "");
    }

    #[test]
    fn project_centers_track_in_box() {
        let line = vec![LatLng::new(48.0, 11.0), LatLng::new(48.01, 11.01)];
        let bbox = LatLngBounds::from_points(&line).unwrap();
        let lines = project(&bbox, XY::new(100.0, 100.0), XY::new(10.0, 10.0), &[line]);
        assert_eq!(lines.len(), 1);
        for p in &lines[0] {
            assert!(p.x >= 10.0 - 1e-9 && p.x <= 110.0 + 1e-9);
            assert!(p.y >= 10.0 - 1e-9 && p.y <= 110.0 + 1e-9);
        }
        // north-east end is drawn above and to the right
        assert!(lines[0][1].x > lines[0][0].x);
        assert!(lines[0][1].y < lines[0][0].y);
    }

    #[test]
    fn project_degenerate_box_is_empty() {
        let line = vec![LatLng::new(48.0, 11.0), LatLng::new(48.01, 11.0)];
        let bbox = LatLngBounds::from_points(&line).unwrap();
        assert!(project(&bbox, XY::new(10.0, 10.0), XY::default(), &[line]).is_empty());
    }

    #[test]
    fn project_splits_lines_leaving_the_box() {
        let bbox = LatLngBounds {
            lat_lo: 0.0,
            lat_hi: 1.0,
            lng_lo: 0.0,
            lng_hi: 1.0,
        };
        let line = vec![
            LatLng::new(0.1, 0.1),
            LatLng::new(0.2, 0.2),
            LatLng::new(5.0, 5.0),
            LatLng::new(0.3, 0.3),
        ];
        let lines = project(&bbox, XY::new(10.0, 10.0), XY::default(), &[line]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 2);
        assert_eq!(lines[1].len(), 1);
    }

    #[test]
    fn mercator_inverse_round_trips() {
        for lat in [-60.0, -10.5, 0.0, 33.3, 71.0] {
            assert!((y2lat(lat2y(lat)) - lat).abs() < 1e-9);
        }
    }

    #[test]
    fn growing_bounds_keeps_center_and_reaches_span() {
        let b = LatLngBounds {
            lat_lo: 48.0,
            lat_hi: 48.01,
            lng_lo: 11.0,
            lng_hi: 11.01,
        };
        let grown = b.grown_to_projected_span(XY::new(0.001, 0.001));
        let span = grown.projected_span();
        assert!((span.x - 0.001).abs() < 1e-9);
        assert!((span.y - 0.001).abs() < 1e-9);
        assert!(grown.contains(&LatLng::new(48.005, 11.005)));
    }
}
