//! Discovers input files, parses them in parallel, then filters and merges.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::geometry::decode_polyline;
use crate::privacy::PrivacyFilter;
use crate::timezone::TimezoneLookup;
use crate::track::{FileType, Track};
use crate::year_range::YearRange;
use crate::{PosterError, TrackLoadError};

/// Tracks starting within this many seconds after the previous one ended are merged.
const MERGE_GAP_SECS: i64 = 3600;
const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// Meters; shorter merged tracks are dropped.
    pub min_length: f64,
    pub special_file_names: HashSet<String>,
    pub year_range: YearRange,
    /// Display names keyed by file basename up to the first dot.
    pub title_overrides: HashMap<String, String>,
    /// File names already ingested on a previous run.
    pub synced_files: HashSet<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            min_length: 100.0,
            special_file_names: HashSet::new(),
            year_range: YearRange::new(),
            title_overrides: HashMap::new(),
            synced_files: HashSet::new(),
        }
    }
}

pub struct TrackLoader {
    options: LoaderOptions,
    lookup: Arc<dyn TimezoneLookup>,
}

impl TrackLoader {
    pub fn new(options: LoaderOptions, lookup: Arc<dyn TimezoneLookup>) -> Self {
        Self { options, lookup }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn load_tracks(&self, data_dir: &Path, file_type: FileType) -> Result<Vec<Track>, PosterError> {
        let files = self.list_data_files(data_dir, file_type)?;
        info!(
            "{} files: {}",
            file_type.extension().to_uppercase(),
            files.len()
        );

        let loaded = self.load_data_tracks(&files, file_type);
        info!("Conventionally loaded tracks: {}", loaded.len());

        let tracks = self.filter_tracks(loaded.into_values().collect());
        Ok(self.finish(tracks))
    }

    /// Read stored activities ordered by local start; `only_with_polyline`
    /// skips rows whose polyline is empty.
    pub fn load_tracks_from_db(
        &self,
        db_path: &Path,
        only_with_polyline: bool,
        privacy: Option<&PrivacyFilter>,
    ) -> Result<Vec<Track>, PosterError> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let query = if only_with_polyline {
            "SELECT run_id, start_date_local, elapsed_time, distance, summary_polyline
             FROM activities WHERE summary_polyline != '' ORDER BY start_date_local"
        } else {
            "SELECT run_id, start_date_local, elapsed_time, distance, summary_polyline
             FROM activities ORDER BY start_date_local"
        };
        let mut stmt = conn.prepare(query)?;
        let rows = stmt.query_map([], |row| {
            let run_id: i64 = row.get(0)?;
            let start: String = row.get(1)?;
            let elapsed = parse_elapsed(row.get_ref(2)?);
            let distance: Option<f64> = row.get(3)?;
            let polyline: Option<String> = row.get(4)?;
            Ok((run_id, start, elapsed, distance.unwrap_or(0.0), polyline.unwrap_or_default()))
        })?;

        let mut tracks = Vec::new();
        for row in rows {
            let (run_id, start, elapsed, distance, polyline) = row?;
            let Ok(start_local) = NaiveDateTime::parse_from_str(&start, DB_TIME_FORMAT) else {
                warn!(run_id, start = %start, "skipping activity with unreadable start date");
                continue;
            };
            let mut points = if polyline.is_empty() {
                Vec::new()
            } else {
                decode_polyline(&polyline).unwrap_or_else(|| {
                    warn!(run_id, "ignoring malformed polyline");
                    Vec::new()
                })
            };
            if let Some(filter) = privacy {
                points = filter.apply(&points).unwrap_or_default();
            }
            tracks.push(Track::from_stored(run_id, start_local, elapsed, distance, points));
        }
        info!("All tracks: {}", tracks.len());
        let tracks = self.filter_tracks(tracks);
        info!("After filter tracks: {}", tracks.len());
        Ok(self.finish(tracks))
    }

    fn finish(&self, tracks: Vec<Track>) -> Vec<Track> {
        merge_tracks(tracks)
            .into_iter()
            .filter(|t| t.length >= self.options.min_length)
            .collect()
    }

    fn list_data_files(&self, data_dir: &Path, file_type: FileType) -> Result<Vec<PathBuf>, PosterError> {
        if !data_dir.is_dir() {
            return Err(PosterError::Parameter(format!(
                "Not a directory: {}",
                data_dir.display()
            )));
        }
        let suffix = format!(".{}", file_type.extension());
        let mut files = Vec::new();
        for entry in fs::read_dir(data_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') || self.options.synced_files.contains(name) {
                continue;
            }
            if name.ends_with(&suffix) && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_data_tracks(&self, files: &[PathBuf], file_type: FileType) -> BTreeMap<PathBuf, Track> {
        let lookup = self.lookup.as_ref();
        let results: Vec<(&PathBuf, Result<Track, TrackLoadError>)> = files
            .par_iter()
            .map(|path| (path, Track::load(path, file_type, lookup)))
            .collect();

        let mut tracks = BTreeMap::new();
        for (path, result) in results {
            match result {
                Ok(mut track) => {
                    if let Some(title) = self.title_override(path) {
                        track.name = title.clone();
                    }
                    tracks.insert(path.clone(), track);
                }
                Err(err) => warn!("Error while loading {}: {}", path.display(), err),
            }
        }
        tracks
    }

    fn title_override(&self, path: &Path) -> Option<&String> {
        let name = path.file_name()?.to_str()?;
        let stem = name.split('.').next()?;
        self.options.title_overrides.get(stem)
    }

    fn filter_tracks(&self, tracks: Vec<Track>) -> Vec<Track> {
        let mut kept = Vec::with_capacity(tracks.len());
        for mut t in tracks {
            let file_name = t.file_names.first().cloned().unwrap_or_default();
            if t.length as i64 == 0 {
                info!("{file_name}: skipping empty track");
            } else if !self.options.year_range.contains(&t.start_time_local) {
                info!(
                    "{file_name}: skipping track with wrong year {}",
                    t.start_time_local.format("%Y")
                );
            } else {
                t.special = self.options.special_file_names.contains(&file_name);
                kept.push(t);
            }
        }
        kept
    }
}

/// Sort by local start and fold each track into its predecessor when it
/// starts strictly after the previous recording ended, less than an hour
/// later, with the same sport. Overlapping or duplicate recordings stay apart.
pub fn merge_tracks(mut tracks: Vec<Track>) -> Vec<Track> {
    tracks.sort_by_key(|t| t.start_time_local);
    let total = tracks.len();
    let mut merged: Vec<Track> = Vec::with_capacity(total);
    let mut touched: Vec<bool> = Vec::with_capacity(total);
    let mut last_end: Option<NaiveDateTime> = None;
    for t in tracks {
        let end = t.end_time_local;
        let adjacent = last_end.is_some_and(|last_end| {
            let gap = (t.start_time_local - last_end).num_seconds();
            0 < gap && gap < MERGE_GAP_SECS
        }) && merged.last().is_some_and(|last| last.sport == t.sport);
        match (adjacent, merged.last_mut()) {
            (true, Some(last)) => {
                debug!(into = ?last.file_names, from = ?t.file_names, "merging");
                last.append(t);
                if let Some(flag) = touched.last_mut() {
                    *flag = true;
                }
            }
            _ => {
                merged.push(t);
                touched.push(false);
            }
        }
        last_end = Some(end);
    }
    for (track, touched) in merged.iter_mut().zip(touched) {
        if touched {
            track.finalize();
        }
    }
    info!("Merged {} track(s)", total - merged.len());
    merged
}

fn parse_elapsed(value: ValueRef<'_>) -> Duration {
    match value {
        ValueRef::Integer(secs) => Duration::seconds(secs),
        ValueRef::Real(secs) => Duration::milliseconds((secs * 1000.0) as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(parse_elapsed_text)
            .unwrap_or_else(Duration::zero),
        _ => Duration::zero(),
    }
}

/// Accepts an epoch-based datetime (`1970-01-01 00:42:10.000000`),
/// `H:MM:SS` or plain seconds.
fn parse_elapsed_text(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<f64>() {
        return Some(Duration::milliseconds((secs * 1000.0) as i64));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?.and_hms_opt(0, 0, 0)?;
        return Some(dt - epoch);
    }
    let parts: Vec<f64> = s
        .split(':')
        .map(|p| p.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [h, m, sec] => Some(Duration::milliseconds(
            ((h * 3600.0 + m * 60.0 + sec) * 1000.0) as i64,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone::FixedZone;
    use crate::track::tests::{gpx_run, run_start};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn loader(options: LoaderOptions) -> TrackLoader {
        TrackLoader::new(options, Arc::new(FixedZone::utc()))
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn empty_directory_yields_no_tracks() {
        let dir = tempdir().unwrap();
        let tracks = loader(LoaderOptions::default())
            .load_tracks(dir.path(), FileType::Gpx)
            .unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn missing_directory_is_a_parameter_error() {
        let dir = tempdir().unwrap();
        let err = loader(LoaderOptions::default())
            .load_tracks(&dir.path().join("nope"), FileType::Gpx)
            .unwrap_err();
        assert!(matches!(err, PosterError::Parameter(_)));
    }

    #[test]
    fn single_run_loads_and_bad_files_are_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "run.gpx", &gpx_run(run_start(), 90, false));
        write(dir.path(), "empty.gpx", "");
        write(dir.path(), "broken.gpx", "<gpx");
        write(dir.path(), ".hidden.gpx", &gpx_run(run_start(), 90, false));
        write(dir.path(), "other.tcx", "<x/>");
        let tracks = loader(LoaderOptions::default())
            .load_tracks(dir.path(), FileType::Gpx)
            .unwrap();
        assert_eq!(tracks.len(), 1);
        assert!((tracks[0].length - 5000.0).abs() < 20.0);
        assert_eq!(tracks[0].average_heartrate, None);
    }

    #[test]
    fn runs_45_minutes_apart_merge() {
        let dir = tempdir().unwrap();
        // each run lasts 10 minutes
        write(dir.path(), "a.gpx", &gpx_run(run_start(), 30, false));
        write(
            dir.path(),
            "b.gpx",
            &gpx_run(run_start() + Duration::minutes(55), 30, false),
        );
        let options = LoaderOptions::default();
        let single = loader(options.clone())
            .load_tracks(dir.path(), FileType::Gpx)
            .unwrap();
        assert_eq!(single.len(), 1);
        let t = &single[0];
        assert_eq!(t.file_names.len(), 2);
        assert!((t.length - 2.0 * 1668.0).abs() < 10.0);
        assert_eq!(t.moving.moving_time, Duration::minutes(20));
    }

    #[test]
    fn runs_two_hours_apart_stay_separate() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.gpx", &gpx_run(run_start(), 30, false));
        write(
            dir.path(),
            "b.gpx",
            &gpx_run(run_start() + Duration::hours(2), 30, false),
        );
        let tracks = loader(LoaderOptions::default())
            .load_tracks(dir.path(), FileType::Gpx)
            .unwrap();
        assert_eq!(tracks.len(), 2);
        for pair in tracks.windows(2) {
            let gap = pair[1].start_time_local - pair[0].end_time_local;
            assert!(gap.num_seconds() >= MERGE_GAP_SECS || pair[0].sport != pair[1].sport);
        }
    }

    fn ten_minute_run(start: chrono::DateTime<Utc>, name: &str) -> Track {
        crate::track::parse_gpx(gpx_run(start, 30, false).as_bytes(), name, &FixedZone::utc())
            .unwrap()
    }

    fn merged_names(tracks: Vec<Track>) -> Vec<Vec<String>> {
        merge_tracks(tracks)
            .into_iter()
            .map(|t| t.file_names)
            .collect()
    }

    #[test]
    fn duplicate_recordings_stay_separate() {
        let dir = tempdir().unwrap();
        let run = gpx_run(run_start(), 30, false);
        write(dir.path(), "watch.gpx", &run);
        write(dir.path(), "phone.gpx", &run);
        let tracks = loader(LoaderOptions::default())
            .load_tracks(dir.path(), FileType::Gpx)
            .unwrap();
        assert_eq!(tracks.len(), 2);
        for t in &tracks {
            assert_eq!(t.file_names.len(), 1);
            assert!((t.length - 1668.0).abs() < 10.0);
        }
    }

    #[test]
    fn merge_gap_is_exclusive_at_both_ends() {
        let end = run_start() + Duration::minutes(10);
        let cases = [
            (Duration::zero(), 2),
            (Duration::seconds(1), 1),
            (Duration::seconds(MERGE_GAP_SECS - 1), 1),
            (Duration::seconds(MERGE_GAP_SECS), 2),
            (Duration::minutes(-5), 2),
        ];
        for (gap, expected) in cases {
            let tracks = vec![
                ten_minute_run(run_start(), "a.gpx"),
                ten_minute_run(end + gap, "b.gpx"),
            ];
            assert_eq!(merge_tracks(tracks).len(), expected, "gap {gap}");
        }
    }

    #[test]
    fn gap_is_measured_from_the_previous_recording() {
        // b starts inside a, c starts five minutes after b ends
        let tracks = vec![
            ten_minute_run(run_start(), "a.gpx"),
            ten_minute_run(run_start() + Duration::minutes(5), "b.gpx"),
            ten_minute_run(run_start() + Duration::minutes(20), "c.gpx"),
        ];
        assert_eq!(
            merged_names(tracks),
            vec![vec!["a.gpx".to_string()], vec!["b.gpx".to_string(), "c.gpx".to_string()]]
        );
    }

    #[test]
    fn year_range_min_length_special_and_titles() {
        let dir = tempdir().unwrap();
        for year in [2022, 2023, 2024] {
            let start = Utc.with_ymd_and_hms(year, 5, 1, 7, 0, 0).unwrap();
            write(dir.path(), &format!("{year}.gpx"), &gpx_run(start, 30, false));
        }
        let short = Utc.with_ymd_and_hms(2023, 9, 1, 7, 0, 0).unwrap();
        write(dir.path(), "short.gpx", &gpx_run(short, 1, false));
        let options = LoaderOptions {
            year_range: "2023".parse().unwrap(),
            special_file_names: ["2023.gpx".to_string()].into(),
            title_overrides: [("2023".to_string(), "Spring 10K".to_string())].into(),
            ..LoaderOptions::default()
        };
        let tracks = loader(options).load_tracks(dir.path(), FileType::Gpx).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].file_names, vec!["2023.gpx"]);
        assert!(tracks[0].special);
        assert_eq!(tracks[0].name, "Spring 10K");
        assert!(tracks.iter().all(|t| t.length >= 100.0));
    }

    #[test]
    fn synced_files_are_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "old.gpx", &gpx_run(run_start(), 30, false));
        let options = LoaderOptions {
            synced_files: ["old.gpx".to_string()].into(),
            ..LoaderOptions::default()
        };
        let tracks = loader(options).load_tracks(dir.path(), FileType::Gpx).unwrap();
        assert!(tracks.is_empty());
    }

    fn activity_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE activities (
                run_id INTEGER PRIMARY KEY, start_date_local TEXT,
                elapsed_time DATETIME, distance REAL, summary_polyline TEXT);
             INSERT INTO activities VALUES
                (1, '2024-01-02 07:00:00', '1970-01-01 00:30:00.000000', 5000.0, '_p~iF~ps|U_ulLnnqC'),
                (2, '2024-01-05 07:00:00', 1800, 4000.0, ''),
                (3, '2024-01-09 07:00:00', '0:25:00', 3000.0, '_p~iF~ps|U_ulLnnqC');",
        )
        .unwrap();
    }

    #[test]
    fn loads_stored_activities() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("data.db");
        activity_db(&db);
        let l = loader(LoaderOptions::default());
        let all = l.load_tracks_from_db(&db, false, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].moving.elapsed_time, Duration::minutes(30));
        assert_eq!(all[1].moving.elapsed_time, Duration::minutes(30));
        assert_eq!(all[2].moving.elapsed_time, Duration::minutes(25));
        assert_eq!(all[0].polylines[0].len(), 2);

        let with_lines = l.load_tracks_from_db(&db, true, None).unwrap();
        assert_eq!(with_lines.len(), 2);
        assert!(with_lines.iter().all(|t| t.has_points()));
    }

    #[test]
    fn elapsed_text_forms() {
        assert_eq!(parse_elapsed_text("90"), Some(Duration::seconds(90)));
        assert_eq!(parse_elapsed_text("1:00:05"), Some(Duration::seconds(3605)));
        assert_eq!(parse_elapsed_text("soon"), None);
    }
}
