//! One normalized activity and the per-format parsers that produce it.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use geo::{algorithm::simplify::Simplify, Coord, LineString};
use serde::Serialize;

use crate::geometry::{distance, encode_polyline, path_length, LatLng, LatLngBounds};
use crate::timezone::{localize, TimezoneLookup};
use crate::TrackLoadError;

/// Garmin stores positions as 32-bit semicircles.
const SEMICIRCLE: f64 = 11_930_465.0;
/// Douglas-Peucker tolerance in degrees (about 10 m).
const SIMPLIFY_EPSILON_DEG: f64 = 0.0001;
/// Below this speed a GPX point pair counts as stopped.
const STOPPED_SPEED_KMH: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Gpx,
    Tcx,
    Fit,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Gpx => "gpx",
            FileType::Tcx => "tcx",
            FileType::Fit => "fit",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MovingSummary {
    /// Meters.
    pub distance: f64,
    pub moving_time: Duration,
    pub elapsed_time: Duration,
    /// Meters per second.
    pub average_speed: f64,
}

impl MovingSummary {
    fn from_parts(distance: f64, moving_time: Duration, elapsed_time: Duration) -> Self {
        let secs = moving_time.num_milliseconds() as f64 / 1000.0;
        Self {
            distance,
            moving_time,
            elapsed_time,
            average_speed: if secs > 0.0 { distance / secs } else { 0.0 },
        }
    }
}

#[derive(Clone, Debug)]
pub struct Track {
    /// Start time in epoch milliseconds.
    pub run_id: i64,
    pub file_names: Vec<String>,
    pub name: String,
    pub source: String,
    pub sport: String,
    pub polylines: Vec<Vec<LatLng>>,
    pub polyline_str: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_time_local: NaiveDateTime,
    pub end_time_local: NaiveDateTime,
    /// Meters.
    pub length: f64,
    pub average_heartrate: Option<f64>,
    pub elevation_gain: Option<f64>,
    pub moving: MovingSummary,
    pub start_latlng: Option<LatLng>,
    pub special: bool,
}

impl Track {
    fn new(file_name: &str, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            run_id: start_time.timestamp_millis(),
            file_names: vec![file_name.to_string()],
            name: String::new(),
            source: String::new(),
            sport: "Run".to_string(),
            polylines: Vec::new(),
            polyline_str: String::new(),
            start_time,
            end_time,
            start_time_local: start_time.naive_utc(),
            end_time_local: end_time.naive_utc(),
            length: 0.0,
            average_heartrate: None,
            elevation_gain: None,
            moving: MovingSummary::default(),
            start_latlng: None,
            special: false,
        }
    }

    /// Read and parse one file. The basename becomes the track's file name.
    pub fn load(
        path: &Path,
        file_type: FileType,
        lookup: &dyn TimezoneLookup,
    ) -> Result<Track, TrackLoadError> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Err(TrackLoadError::Empty);
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match file_type {
            FileType::Gpx => parse_gpx(&bytes, &file_name, lookup),
            FileType::Tcx => parse_tcx(&bytes, &file_name, lookup),
            FileType::Fit => parse_fit(&bytes, &file_name, lookup),
        }
    }

    /// Build a track from a stored activity row; points come from the encoded polyline.
    pub fn from_stored(
        run_id: i64,
        start_local: NaiveDateTime,
        elapsed_time: Duration,
        distance: f64,
        points: Vec<LatLng>,
    ) -> Track {
        let start = start_local.and_utc();
        let mut track = Track::new(&run_id.to_string(), start, start + elapsed_time);
        track.run_id = run_id;
        track.length = distance;
        track.moving = MovingSummary::from_parts(distance, elapsed_time, elapsed_time);
        track.start_latlng = points.first().copied();
        track.polylines = vec![points];
        track.finalize();
        track
    }

    pub fn points(&self) -> impl Iterator<Item = &LatLng> {
        self.polylines.iter().flatten()
    }

    pub fn has_points(&self) -> bool {
        self.polylines.iter().any(|l| !l.is_empty())
    }

    pub fn bbox(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(self.points())
    }

    /// Fold a temporally adjacent track into this one. Call [`Track::finalize`]
    /// once merging is done to refresh the encoded polyline.
    pub fn append(&mut self, other: Track) {
        self.end_time = other.end_time;
        self.end_time_local = other.end_time_local;
        self.length += other.length;
        let distance = self.moving.distance + other.moving.distance;
        let moving_time = self.moving.moving_time + other.moving.moving_time;
        let elapsed_time = self.moving.elapsed_time + other.moving.elapsed_time;
        self.moving = MovingSummary::from_parts(distance, moving_time, elapsed_time);
        self.polylines.extend(other.polylines);
        self.file_names.extend(other.file_names);
        self.special = self.special || other.special;
        self.average_heartrate = self.average_heartrate.or(other.average_heartrate);
        self.elevation_gain = match (self.elevation_gain, other.elevation_gain) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        };
        if self.start_latlng.is_none() {
            self.start_latlng = other.start_latlng;
        }
    }

    /// Re-encode the polyline string from the concatenation of all segments.
    pub fn finalize(&mut self) {
        self.polyline_str = encode_polyline(self.points());
    }

    fn set_points(&mut self, polylines: Vec<Vec<LatLng>>) {
        self.start_latlng = polylines.iter().flatten().next().copied();
        self.polylines = polylines;
        self.finalize();
    }

    fn localize(&mut self, source_offset: Option<FixedOffset>, lookup: &dyn TimezoneLookup) {
        let first = self.points().next().copied();
        let (start, end) = localize(
            self.start_time,
            self.end_time,
            source_offset,
            first.as_ref(),
            lookup,
        );
        self.start_time_local = start;
        self.end_time_local = end;
    }
}

fn parse_time(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim()).ok()
}

fn simplify(points: &[LatLng]) -> Vec<LatLng> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord { x: p.lng, y: p.lat })
        .collect::<Vec<_>>()
        .into();
    line.simplify(&SIMPLIFY_EPSILON_DEG)
        .0
        .into_iter()
        .map(|c| LatLng::new(c.y, c.x))
        .collect()
}

fn uphill(altitudes: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut prev: Option<f64> = None;
    let mut gain = None;
    for alt in altitudes {
        if let Some(p) = prev {
            let total = gain.get_or_insert(0.0);
            if alt > p {
                *total += alt - p;
            }
        }
        prev = Some(alt);
    }
    gain
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

struct GpxPoint {
    latlng: LatLng,
    time: Option<DateTime<FixedOffset>>,
    elevation: Option<f64>,
}

/// Heart-rate samples from `<hr>` children in any `trkpt` extension block.
fn gpx_heart_rates(text: &str) -> Vec<f64> {
    let Ok(doc) = roxmltree::Document::parse(text) else {
        return Vec::new();
    };
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "trkpt")
        .filter_map(|pt| {
            pt.descendants()
                .find(|n| n.is_element() && n.tag_name().name() == "hr")
                .and_then(|n| n.text())
                .and_then(|t| t.trim().parse::<f64>().ok())
        })
        .filter(|hr| *hr > 0.0)
        .collect()
}

fn moving_data(segments: &[Vec<GpxPoint>]) -> MovingSummary {
    let mut moving_secs = 0.0;
    let mut stopped_secs = 0.0;
    let mut moving_distance = 0.0;
    for segment in segments {
        for pair in segment.windows(2) {
            let (Some(t0), Some(t1)) = (pair[0].time, pair[1].time) else {
                continue;
            };
            let secs = (t1 - t0).num_milliseconds() as f64 / 1000.0;
            if secs <= 0.0 {
                continue;
            }
            let dist = distance(&pair[0].latlng, &pair[1].latlng);
            if dist / secs * 3.6 > STOPPED_SPEED_KMH {
                moving_secs += secs;
                moving_distance += dist;
            } else {
                stopped_secs += secs;
            }
        }
    }
    MovingSummary::from_parts(
        moving_distance,
        Duration::milliseconds((moving_secs * 1000.0) as i64),
        Duration::milliseconds(((moving_secs + stopped_secs) * 1000.0) as i64),
    )
}

pub fn parse_gpx(
    bytes: &[u8],
    file_name: &str,
    lookup: &dyn TimezoneLookup,
) -> Result<Track, TrackLoadError> {
    let text = String::from_utf8_lossy(bytes);
    let mut cursor = Cursor::new(text.as_bytes());
    let gpx = gpx::read(&mut cursor).map_err(|e| TrackLoadError::Gpx(e.to_string()))?;

    let mut segments: Vec<Vec<GpxPoint>> = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            let mut points = Vec::with_capacity(segment.points.len());
            for point in &segment.points {
                let time = match &point.time {
                    Some(time) => {
                        let iso = time.format().map_err(|e| TrackLoadError::Gpx(e.to_string()))?;
                        Some(
                            DateTime::parse_from_rfc3339(&iso)
                                .map_err(|e| TrackLoadError::Gpx(e.to_string()))?,
                        )
                    }
                    None => None,
                };
                let geo = point.point();
                points.push(GpxPoint {
                    latlng: LatLng::new(geo.y(), geo.x()),
                    time,
                    elevation: point.elevation,
                });
            }
            segments.push(points);
        }
    }

    let times = segments.iter().flatten().filter_map(|p| p.time);
    let start = times.clone().min().ok_or(TrackLoadError::MissingTime)?;
    let end = times.max().ok_or(TrackLoadError::MissingTime)?;
    let length: f64 = segments
        .iter()
        .map(|s| path_length(&s.iter().map(|p| p.latlng).collect::<Vec<_>>()))
        .sum();
    if length == 0.0 {
        return Err(TrackLoadError::EmptyTrack);
    }

    let mut track = Track::new(file_name, start.with_timezone(&Utc), end.with_timezone(&Utc));
    track.length = length;
    let first_track = gpx.tracks.first();
    if let Some(kind) = first_track.and_then(|t| t.type_.clone()) {
        track.sport = kind;
    }
    if let Some(creator) = &gpx.creator {
        track.source = creator.clone();
    }
    if let Some(source) = first_track.and_then(|t| t.source.clone()) {
        track.source = source;
    }
    track.name = gpx
        .metadata
        .as_ref()
        .and_then(|m| m.name.clone())
        .or_else(|| first_track.and_then(|t| t.name.clone()))
        .unwrap_or_else(|| format!("{} from {}", track.sport, track.source));

    track.moving = moving_data(&segments);
    track.elevation_gain = uphill(segments.iter().flatten().filter_map(|p| p.elevation));
    track.average_heartrate = mean(&gpx_heart_rates(&text));
    track.set_points(
        segments
            .iter()
            .map(|s| simplify(&s.iter().map(|p| p.latlng).collect::<Vec<_>>()))
            .collect(),
    );
    if track.source == "xingzhe" {
        // this vendor already records local wall-clock time
        if let Some(number) = first_track.and_then(|t| t.number) {
            track.run_id = number as i64;
        }
    } else {
        track.localize(Some(*start.offset()), lookup);
    }
    Ok(track)
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn child_f64(node: roxmltree::Node, name: &str) -> Option<f64> {
    child(node, name)
        .and_then(|n| n.text())
        .and_then(|t| t.trim().parse().ok())
}

fn nested_value(node: roxmltree::Node, name: &str) -> Option<f64> {
    child(node, name).and_then(|n| child_f64(n, "Value"))
}

pub fn parse_tcx(
    bytes: &[u8],
    file_name: &str,
    lookup: &dyn TimezoneLookup,
) -> Result<Track, TrackLoadError> {
    let text = String::from_utf8_lossy(bytes);
    let doc = roxmltree::Document::parse(&text).map_err(|e| TrackLoadError::Tcx(e.to_string()))?;
    let root = doc.root_element();
    let is = |n: &roxmltree::Node, name: &str| n.is_element() && n.tag_name().name() == name;

    let mut times = Vec::new();
    let mut positions = Vec::new();
    let mut altitudes = Vec::new();
    let mut heart_rates = Vec::new();
    let mut last_distance = None;
    for tp in root.descendants().filter(|n| is(n, "Trackpoint")) {
        if let Some(t) = child(tp, "Time").and_then(|n| n.text()).and_then(parse_time) {
            times.push(t);
        }
        if let Some(pos) = child(tp, "Position") {
            if let (Some(lat), Some(lng)) = (
                child_f64(pos, "LatitudeDegrees"),
                child_f64(pos, "LongitudeDegrees"),
            ) {
                positions.push(LatLng::new(lat, lng));
            }
        }
        if let Some(alt) = child_f64(tp, "AltitudeMeters") {
            altitudes.push(alt);
        }
        if let Some(hr) = nested_value(tp, "HeartRateBpm") {
            heart_rates.push(hr);
        }
        if let Some(d) = child_f64(tp, "DistanceMeters") {
            last_distance = Some(d);
        }
    }

    let laps: Vec<_> = root.descendants().filter(|n| is(n, "Lap")).collect();
    let lap_distance: f64 = laps.iter().filter_map(|l| child_f64(*l, "DistanceMeters")).sum();
    let length = if lap_distance > 0.0 {
        lap_distance
    } else {
        last_distance.unwrap_or_else(|| path_length(&positions))
    };

    let (Some(start), Some(end)) = (times.first().copied(), times.last().copied()) else {
        return Err(TrackLoadError::EmptyTrack);
    };
    if positions.is_empty() && length as i64 == 0 {
        return Err(TrackLoadError::Tcx(
            "no distance and no position values".to_string(),
        ));
    }

    let mut track = Track::new(file_name, start.with_timezone(&Utc), end.with_timezone(&Utc));
    track.length = length;
    if let Some(sport) = root
        .descendants()
        .find(|n| is(n, "Activity"))
        .and_then(|a| a.attribute("Sport"))
    {
        track.sport = match sport {
            "Running" => "Run".to_string(),
            "Biking" => "Ride".to_string(),
            other => other.to_string(),
        };
    }
    track.average_heartrate = mean(&heart_rates).or_else(|| {
        mean(
            &laps
                .iter()
                .filter_map(|l| nested_value(*l, "AverageHeartRateBpm"))
                .collect::<Vec<_>>(),
        )
    });
    track.elevation_gain = uphill(altitudes);
    let elapsed = end - start;
    track.moving = MovingSummary::from_parts(length, elapsed, elapsed);
    if !positions.is_empty() {
        track.set_points(vec![positions]);
        track.localize(Some(*start.offset()), lookup);
    }
    Ok(track)
}

fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    match value {
        fitparser::Value::Float32(v) => Some(*v as f64),
        fitparser::Value::Float64(v) => Some(*v),
        fitparser::Value::SInt8(v) => Some(*v as f64),
        fitparser::Value::UInt8(v) | fitparser::Value::UInt8z(v) | fitparser::Value::Byte(v) => {
            Some(*v as f64)
        }
        fitparser::Value::SInt16(v) => Some(*v as f64),
        fitparser::Value::UInt16(v) | fitparser::Value::UInt16z(v) => Some(*v as f64),
        fitparser::Value::SInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32(v) | fitparser::Value::UInt32z(v) => Some(*v as f64),
        fitparser::Value::SInt64(v) => Some(*v as f64),
        fitparser::Value::UInt64(v) | fitparser::Value::UInt64z(v) => Some(*v as f64),
        fitparser::Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
}

#[derive(Default)]
struct FitSession {
    start_time: Option<DateTime<Utc>>,
    total_elapsed_time: Option<f64>,
    total_distance: Option<f64>,
    total_moving_time: Option<f64>,
    total_timer_time: Option<f64>,
    avg_speed: Option<f64>,
    enhanced_avg_speed: Option<f64>,
    avg_heart_rate: Option<f64>,
    total_ascent: Option<f64>,
    sport: Option<String>,
}

pub fn parse_fit(
    bytes: &[u8],
    file_name: &str,
    lookup: &dyn TimezoneLookup,
) -> Result<Track, TrackLoadError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let records = from_bytes(bytes).map_err(|e| TrackLoadError::Fit(e.to_string()))?;
    let mut session: Option<FitSession> = None;
    let mut points = Vec::new();
    let mut source_offset = None;

    for record in records.into_iter() {
        match record.kind() {
            MesgNum::Record => {
                let mut lat = None;
                let mut lng = None;
                for field in record.fields() {
                    match field.name() {
                        "position_lat" => lat = fit_value_to_f64(field.value()),
                        "position_long" => lng = fit_value_to_f64(field.value()),
                        _ => {}
                    }
                }
                if let (Some(lat), Some(lng)) = (lat, lng) {
                    points.push(LatLng::new(lat / SEMICIRCLE, lng / SEMICIRCLE));
                }
            }
            MesgNum::Session if session.is_none() => {
                let mut s = FitSession::default();
                for field in record.fields() {
                    let value = field.value();
                    match field.name() {
                        "start_time" => {
                            if let fitparser::Value::Timestamp(ts) = value {
                                s.start_time = Some(ts.with_timezone(&Utc));
                            }
                        }
                        "total_elapsed_time" => s.total_elapsed_time = fit_value_to_f64(value),
                        "total_distance" => s.total_distance = fit_value_to_f64(value),
                        "total_moving_time" => s.total_moving_time = fit_value_to_f64(value),
                        "total_timer_time" => s.total_timer_time = fit_value_to_f64(value),
                        "avg_speed" => s.avg_speed = fit_value_to_f64(value),
                        "enhanced_avg_speed" => s.enhanced_avg_speed = fit_value_to_f64(value),
                        "avg_heart_rate" => s.avg_heart_rate = fit_value_to_f64(value),
                        "total_ascent" => s.total_ascent = fit_value_to_f64(value),
                        "sport" => {
                            if let fitparser::Value::String(sport) = value {
                                s.sport = Some(sport.to_lowercase());
                            }
                        }
                        _ => {}
                    }
                }
                session = Some(s);
            }
            MesgNum::Activity => {
                let mut timestamp = None;
                let mut local = None;
                for field in record.fields() {
                    if let fitparser::Value::Timestamp(ts) = field.value() {
                        match field.name() {
                            "timestamp" => timestamp = Some(ts.timestamp()),
                            "local_timestamp" => local = Some(ts.timestamp()),
                            _ => {}
                        }
                    }
                }
                if let (Some(utc), Some(local)) = (timestamp, local) {
                    source_offset = FixedOffset::east_opt((local - utc) as i32);
                }
            }
            _ => {}
        }
    }

    let session = session.ok_or_else(|| TrackLoadError::Fit("no session message".to_string()))?;
    let start = session.start_time.ok_or(TrackLoadError::MissingTime)?;
    let elapsed_secs = session.total_elapsed_time.unwrap_or(0.0);
    let elapsed = Duration::milliseconds((elapsed_secs * 1000.0) as i64);
    let mut track = Track::new(file_name, start, start + elapsed);
    let length = session.total_distance.unwrap_or(0.0);
    track.length = length;
    track.average_heartrate = session.avg_heart_rate;
    track.elevation_gain = session.total_ascent;
    if let Some(sport) = session.sport {
        track.sport = sport;
    }
    let moving_secs = session
        .total_moving_time
        .or(session.total_timer_time)
        .unwrap_or(elapsed_secs);
    track.moving = MovingSummary {
        distance: length,
        moving_time: Duration::milliseconds((moving_secs * 1000.0) as i64),
        elapsed_time: elapsed,
        average_speed: session
            .enhanced_avg_speed
            .filter(|v| *v > 0.0)
            .or(session.avg_speed)
            .unwrap_or(0.0),
    };
    if !points.is_empty() {
        track.set_points(vec![points]);
    }
    track.localize(source_offset, lookup);
    Ok(track)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::timezone::FixedZone;
    use chrono::TimeZone;

    /// A northbound run with a slight eastward bow: steps of 0.0005 deg
    /// latitude, 20 s apart.
    pub(crate) fn gpx_run(start: DateTime<Utc>, steps: usize, with_hr: bool) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test-device" xmlns="http://www.topografix.com/GPX/1/1" xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
<trk><name>Morning Run</name><type>Run</type><trkseg>
"#,
        );
        for i in 0..=steps {
            let t = start + Duration::seconds(20 * i as i64);
            let hr = if with_hr {
                format!(
                    "<extensions><gpxtpx:TrackPointExtension><gpxtpx:hr>{}</gpxtpx:hr></gpxtpx:TrackPointExtension></extensions>",
                    140 + (i % 3) * 10
                )
            } else {
                String::new()
            };
            out.push_str(&format!(
                r#"<trkpt lat="{:.6}" lon="{:.6}"><ele>{}</ele><time>{}</time>{}</trkpt>
"#,
                48.0 + 0.0005 * i as f64,
                11.0 + 0.0003 * (i as f64 * std::f64::consts::PI / 45.0).sin(),
                500 + (i % 2),
                t.format("%Y-%m-%dT%H:%M:%SZ"),
                hr
            ));
        }
        out.push_str("</trkseg></trk></gpx>\n");
        out
    }

    pub(crate) fn run_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn gpx_five_km_run() {
        let xml = gpx_run(run_start(), 90, false);
        let track = parse_gpx(xml.as_bytes(), "run.gpx", &FixedZone::utc()).unwrap();
        assert!((track.length - 5004.0).abs() < 10.0, "{}", track.length);
        assert_eq!(track.average_heartrate, None);
        assert_eq!(track.name, "Morning Run");
        assert_eq!(track.sport, "Run");
        assert_eq!(track.source, "test-device");
        assert_eq!(track.run_id, run_start().timestamp_millis());
        assert_eq!(track.start_time_local.to_string(), "2024-03-15 08:00:00");
        assert_eq!(track.end_time - track.start_time, Duration::seconds(1800));
        assert!(track.moving.moving_time > Duration::zero());
        assert_eq!(track.elevation_gain, Some(45.0));
        let kept = track.polylines[0].len();
        assert!(kept >= 3 && kept < 91, "{kept}");
        assert_eq!(
            crate::geometry::decode_polyline(&track.polyline_str).unwrap().len(),
            kept
        );
    }

    #[test]
    fn gpx_heart_rate_from_extensions() {
        let xml = gpx_run(run_start(), 8, true);
        let track = parse_gpx(xml.as_bytes(), "hr.gpx", &FixedZone::utc()).unwrap();
        let hr = track.average_heartrate.unwrap();
        assert!(hr > 140.0 && hr < 160.0);
    }

    #[test]
    fn gpx_local_time_uses_lookup() {
        let xml = gpx_run(run_start(), 10, false);
        let zone = FixedZone(FixedOffset::east_opt(3600).unwrap());
        let track = parse_gpx(xml.as_bytes(), "tz.gpx", &zone).unwrap();
        assert_eq!(track.start_time_local.to_string(), "2024-03-15 09:00:00");
        assert_eq!(
            track.start_time_local - track.start_time.naive_utc(),
            track.end_time_local - track.end_time.naive_utc()
        );
    }

    #[test]
    fn gpx_without_time_is_rejected() {
        let xml = r#"<?xml version="1.0"?><gpx version="1.1" creator="x" xmlns="http://www.topografix.com/GPX/1/1"><trk><trkseg><trkpt lat="1" lon="1"/><trkpt lat="1.1" lon="1"/></trkseg></trk></gpx>"#;
        let err = parse_gpx(xml.as_bytes(), "t.gpx", &FixedZone::utc()).unwrap_err();
        assert!(matches!(err, TrackLoadError::MissingTime));
    }

    #[test]
    fn gpx_garbage_is_rejected() {
        let err = parse_gpx(b"not xml at all", "bad.gpx", &FixedZone::utc()).unwrap_err();
        assert!(matches!(err, TrackLoadError::Gpx(_)));
    }

    const TCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
 <Activities><Activity Sport="Running"><Id>2023-06-01T06:00:00Z</Id>
  <Lap StartTime="2023-06-01T06:00:00Z">
   <TotalTimeSeconds>600</TotalTimeSeconds><DistanceMeters>2000</DistanceMeters>
   <AverageHeartRateBpm><Value>150</Value></AverageHeartRateBpm>
   <Track>
    <Trackpoint><Time>2023-06-01T06:00:00Z</Time><Position><LatitudeDegrees>52.0</LatitudeDegrees><LongitudeDegrees>13.0</LongitudeDegrees></Position><AltitudeMeters>30</AltitudeMeters></Trackpoint>
    <Trackpoint><Time>2023-06-01T06:05:00Z</Time><Position><LatitudeDegrees>52.01</LatitudeDegrees><LongitudeDegrees>13.0</LongitudeDegrees></Position><AltitudeMeters>35</AltitudeMeters></Trackpoint>
    <Trackpoint><Time>2023-06-01T06:10:00Z</Time><Position><LatitudeDegrees>52.0</LatitudeDegrees><LongitudeDegrees>13.0</LongitudeDegrees></Position><AltitudeMeters>31</AltitudeMeters></Trackpoint>
   </Track>
  </Lap>
 </Activity></Activities>
</TrainingCenterDatabase>"#;

    #[test]
    fn tcx_uses_lap_metadata() {
        let track = parse_tcx(TCX.as_bytes(), "a.tcx", &FixedZone::utc()).unwrap();
        assert_eq!(track.length, 2000.0);
        assert_eq!(track.average_heartrate, Some(150.0));
        assert_eq!(track.moving.moving_time, Duration::seconds(600));
        assert_eq!(track.moving.elapsed_time, track.moving.moving_time);
        assert_eq!(track.polylines[0].len(), 3);
        assert_eq!(track.elevation_gain, Some(5.0));
        assert_eq!(track.sport, "Run");
    }

    #[test]
    fn tcx_without_content_is_rejected() {
        let xml = r#"<TrainingCenterDatabase><Activities><Activity Sport="Running"><Lap><Track>
            <Trackpoint><Time>2023-06-01T06:00:00Z</Time></Trackpoint>
            </Track></Lap></Activity></Activities></TrainingCenterDatabase>"#;
        assert!(parse_tcx(xml.as_bytes(), "b.tcx", &FixedZone::utc()).is_err());
    }

    #[test]
    fn append_sums_and_defers_encoding() {
        let zone = FixedZone::utc();
        let mut a = parse_gpx(gpx_run(run_start(), 20, false).as_bytes(), "a.gpx", &zone).unwrap();
        let b = parse_gpx(
            gpx_run(run_start() + Duration::minutes(45), 20, false).as_bytes(),
            "b.gpx",
            &zone,
        )
        .unwrap();
        let expected_len = a.length + b.length;
        let expected_moving = a.moving.moving_time + b.moving.moving_time;
        let before = a.polyline_str.clone();
        a.append(b);
        assert_eq!(a.polyline_str, before);
        a.finalize();
        assert_ne!(a.polyline_str, before);
        assert_eq!(a.length, expected_len);
        assert_eq!(a.moving.moving_time, expected_moving);
        assert_eq!(a.file_names, vec!["a.gpx", "b.gpx"]);
        assert_eq!(a.elevation_gain, Some(20.0));
    }

    #[test]
    fn stored_row_decodes_polyline() {
        let start = chrono::NaiveDate::from_ymd_opt(2022, 5, 1)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        let points = vec![LatLng::new(40.0, -74.0), LatLng::new(40.01, -74.0)];
        let t = Track::from_stored(42, start, Duration::minutes(30), 1200.0, points);
        assert_eq!(t.file_names, vec!["42"]);
        assert_eq!(t.start_time_local, start);
        assert_eq!(t.end_time_local, start + Duration::minutes(30));
        assert!(!t.polyline_str.is_empty());
    }
}
