use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};

use crate::PosterError;

/// Inclusive span of calendar years plus a tally of years that actually hold data.
///
/// An unbounded range (parsed from `"all"` or freshly created) contains every year.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct YearRange {
    bounds: Option<(i32, i32)>,
    years_with_data: BTreeMap<i32, usize>,
}

impl YearRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(year: i32) -> Self {
        Self {
            bounds: Some((year, year)),
            years_with_data: BTreeMap::new(),
        }
    }

    pub fn from_year(&self) -> Option<i32> {
        self.bounds.map(|(lo, _)| lo)
    }

    pub fn to_year(&self) -> Option<i32> {
        self.bounds.map(|(_, hi)| hi)
    }

    pub fn is_bounded(&self) -> bool {
        self.bounds.is_some()
    }

    /// Widen the range to include `t` and record that its year has data.
    pub fn add(&mut self, t: &NaiveDateTime) {
        let year = t.year();
        self.bounds = Some(match self.bounds {
            None => (year, year),
            Some((lo, hi)) => (lo.min(year), hi.max(year)),
        });
        *self.years_with_data.entry(year).or_insert(0) += 1;
    }

    pub fn contains(&self, t: &NaiveDateTime) -> bool {
        self.contains_year(t.year())
    }

    pub fn contains_year(&self, year: i32) -> bool {
        match self.bounds {
            None => true,
            Some((lo, hi)) => lo <= year && year <= hi,
        }
    }

    /// Number of years spanned, `None` while unbounded.
    pub fn count(&self) -> Option<usize> {
        self.bounds.map(|(lo, hi)| (hi - lo + 1) as usize)
    }

    /// Number of distinct years that received at least one [`YearRange::add`].
    pub fn real_year(&self) -> usize {
        self.years_with_data.len()
    }

    pub fn years(&self) -> Vec<i32> {
        match self.bounds {
            None => Vec::new(),
            Some((lo, hi)) => (lo..=hi).collect(),
        }
    }
}

impl FromStr for YearRange {
    type Err = PosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PosterError::Parameter(format!("Bad year range: {s}"));
        let parse_year = |part: &str| -> Result<i32, PosterError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        if s == "all" {
            return Ok(Self::new());
        }
        let bounds = match s.split_once('-') {
            None => {
                let year = parse_year(s)?;
                (year, year)
            }
            Some((a, b)) => {
                let (y1, y2) = (parse_year(a)?, parse_year(b)?);
                if y1 > y2 {
                    return Err(invalid());
                }
                (y1, y2)
            }
        };
        Ok(Self {
            bounds: Some(bounds),
            years_with_data: BTreeMap::new(),
        })
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            None => write!(f, "all"),
            Some((lo, hi)) if lo == hi => write!(f, "{lo}"),
            Some((lo, hi)) => write!(f, "{lo}-{hi}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(year: i32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn parses_and_formats() {
        for s in ["all", "2021", "2019-2023"] {
            let parsed: YearRange = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        let r: YearRange = "2019-2023".parse().unwrap();
        assert_eq!(r.count(), Some(5));
        assert!(r.contains(&at(2020)));
        assert!(!r.contains(&at(2024)));
    }

    #[test]
    fn rejects_inverted_and_garbage() {
        assert!("2020-2019".parse::<YearRange>().is_err());
        assert!("20x0".parse::<YearRange>().is_err());
        assert!("-2020".parse::<YearRange>().is_err());
        assert!("".parse::<YearRange>().is_err());
    }

    #[test]
    fn add_tracks_years_with_data() {
        let mut r = YearRange::new();
        assert!(r.contains(&at(1990)));
        assert_eq!(r.count(), None);
        r.add(&at(2022));
        r.add(&at(2020));
        r.add(&at(2022));
        assert_eq!(r.from_year(), Some(2020));
        assert_eq!(r.to_year(), Some(2022));
        assert_eq!(r.count(), Some(3));
        assert_eq!(r.real_year(), 2);
        assert_eq!(r.years(), vec![2020, 2021, 2022]);
    }
}
