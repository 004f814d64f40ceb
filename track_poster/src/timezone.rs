//! UTC offset resolution for turning track timestamps into local wall-clock time.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use tracing::debug;
use tzf_rs::DefaultFinder;

use crate::geometry::LatLng;
use crate::PosterError;

/// Cache resolution for coordinate lookups, in buckets per degree.
const BUCKETS_PER_DEGREE: f64 = 100.0;

pub trait TimezoneLookup: Send + Sync {
    /// Current UTC offset at `point`, `None` when no zone is known there.
    fn utc_offset(&self, point: &LatLng) -> Option<FixedOffset>;
}

fn current_offset(tz: &Tz) -> FixedOffset {
    Utc::now().with_timezone(tz).offset().fix()
}

/// Point-in-polygon IANA zone lookup with a per-bucket offset cache.
pub struct TzfLookup {
    finder: DefaultFinder,
    cache: DashMap<(i64, i64), Option<FixedOffset>>,
}

impl TzfLookup {
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
            cache: DashMap::new(),
        }
    }

    fn bucket(point: &LatLng) -> (i64, i64) {
        (
            (point.lat * BUCKETS_PER_DEGREE).floor() as i64,
            (point.lng * BUCKETS_PER_DEGREE).floor() as i64,
        )
    }
}

impl Default for TzfLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneLookup for TzfLookup {
    fn utc_offset(&self, point: &LatLng) -> Option<FixedOffset> {
        let key = Self::bucket(point);
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }
        let name = self.finder.get_tz_name(point.lng, point.lat);
        let offset = match name.parse::<Tz>() {
            Ok(tz) => Some(current_offset(&tz)),
            Err(_) => {
                debug!(zone = name, lat = point.lat, lng = point.lng, "unknown timezone");
                None
            }
        };
        self.cache.insert(key, offset);
        offset
    }
}

/// One zone for every point, as selected with `--timezone`.
pub struct NamedZone(Tz);

impl NamedZone {
    pub fn parse(name: &str) -> Result<Self, PosterError> {
        name.parse::<Tz>()
            .map(NamedZone)
            .map_err(|_| PosterError::Parameter(format!("Unknown timezone: {name}")))
    }
}

impl TimezoneLookup for NamedZone {
    fn utc_offset(&self, _point: &LatLng) -> Option<FixedOffset> {
        Some(current_offset(&self.0))
    }
}

/// A constant offset regardless of position.
pub struct FixedZone(pub FixedOffset);

impl FixedZone {
    pub fn utc() -> Self {
        FixedZone(Utc.fix())
    }
}

impl TimezoneLookup for FixedZone {
    fn utc_offset(&self, _point: &LatLng) -> Option<FixedOffset> {
        Some(self.0)
    }
}

/// Shift `start`/`end` into local time with one offset for both.
///
/// A non-zero offset carried by the source wins; otherwise the zone of
/// `first_point` is looked up. No point (or no zone) means UTC.
pub fn localize(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source_offset: Option<FixedOffset>,
    first_point: Option<&LatLng>,
    lookup: &dyn TimezoneLookup,
) -> (NaiveDateTime, NaiveDateTime) {
    let offset = source_offset
        .filter(|o| o.local_minus_utc() != 0)
        .or_else(|| first_point.and_then(|p| lookup.utc_offset(p)))
        .unwrap_or_else(|| Utc.fix());
    (
        start.with_timezone(&offset).naive_local(),
        end.with_timezone(&offset).naive_local(),
    )
}
