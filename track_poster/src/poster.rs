//! Aggregated track data plus the page layout around the selected drawer.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use tracing::info;

use crate::color::Rgb;
use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::{ValueRange, XY};
use crate::i18n::Translator;
use crate::svg::{rect, text, SvgDocument};
use crate::track::Track;
use crate::year_range::YearRange;
use crate::PosterError;

pub const METERS_PER_MILE: f64 = 1609.344;
/// Height given back by pages drawn without header and footer.
const HEADER_FOOTER_HEIGHT: f64 = 100.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum GithubStyle {
    /// Each year's first column starts on Jan 1's weekday.
    #[default]
    AlignFirstday,
    /// Each year's first column starts on the Monday on or before Jan 1.
    AlignMonday,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    pub background: Rgb,
    pub text: Rgb,
    pub track: Rgb,
    pub track2: Rgb,
    pub special: Rgb,
    pub special2: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        let track = Rgb::new(0x4d, 0xd2, 0xff);
        let special = Rgb::new(0xff, 0xff, 0x00);
        Self {
            background: Rgb::new(0x22, 0x22, 0x22),
            text: Rgb::new(0xff, 0xff, 0xff),
            track,
            track2: track,
            special,
            special2: special,
        }
    }
}

impl Palette {
    /// Dark scheme for body-only posters; colors the user changed are kept.
    pub fn plain(&self) -> Palette {
        let default = Palette::default();
        let pick = |current: Rgb, default: Rgb, plain: Rgb| if current == default { plain } else { current };
        Palette {
            background: pick(self.background, default.background, Rgb::new(0x1a, 0x1a, 0x1a)),
            text: pick(self.text, default.text, Rgb::new(0xe1, 0xed, 0x5e)),
            track: pick(self.track, default.track, Rgb::new(0xff, 0x00, 0x00)),
            track2: pick(self.track2, default.track2, Rgb::new(0xff, 0x00, 0x00)),
            special: pick(self.special, default.special, Rgb::new(0xff, 0xff, 0x00)),
            special2: self.special2,
        }
    }
}

/// Two thresholds in kilometers marking "special" distances.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpecialDistance {
    pub lower: f64,
    pub upper: f64,
}

impl Default for SpecialDistance {
    fn default() -> Self {
        Self {
            lower: 10.0,
            upper: 20.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    pub count: usize,
    /// Distances in meters.
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Distinct (year, ISO week) pairs with at least one track.
    pub weeks: usize,
}

impl Statistics {
    pub fn weekly(&self) -> f64 {
        if self.weeks == 0 {
            0.0
        } else {
            self.count as f64 / self.weeks as f64
        }
    }
}

/// Tracks and their derived indexes, built once and read by drawers.
#[derive(Clone, Debug, Default)]
pub struct TrackSet {
    tracks: Vec<Track>,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
    length_range: ValueRange,
    length_range_by_date: ValueRange,
    years: YearRange,
}

impl TrackSet {
    /// Index `tracks` by local start day. With `years` given, only tracks in
    /// that span are indexed; otherwise the span is computed from the tracks.
    pub fn new(tracks: Vec<Track>, years: Option<YearRange>) -> Self {
        let forced = years.is_some();
        let mut years = years.unwrap_or_default();
        for t in &tracks {
            if !forced || years.contains(&t.start_time_local) {
                years.add(&t.start_time_local);
            }
        }
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        let mut length_range = ValueRange::new();
        for (idx, t) in tracks.iter().enumerate() {
            if !years.contains(&t.start_time_local) {
                continue;
            }
            by_date.entry(t.start_time_local.date()).or_default().push(idx);
            length_range.extend(t.length);
        }
        let mut length_range_by_date = ValueRange::new();
        for indices in by_date.values() {
            length_range_by_date.extend(indices.iter().map(|i| tracks[*i].length).sum());
        }
        Self {
            tracks,
            by_date,
            length_range,
            length_range_by_date,
            years,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn years(&self) -> &YearRange {
        &self.years
    }

    pub fn length_range(&self) -> &ValueRange {
        &self.length_range
    }

    pub fn length_range_by_date(&self) -> &ValueRange {
        &self.length_range_by_date
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.by_date.keys()
    }

    pub fn tracks_on(&self, date: &NaiveDate) -> impl Iterator<Item = &Track> {
        self.by_date
            .get(date)
            .into_iter()
            .flatten()
            .map(|i| &self.tracks[*i])
    }

    pub fn has_tracks_on(&self, date: &NaiveDate) -> bool {
        self.by_date.contains_key(date)
    }

    /// Summed meters of tracks starting on `date`.
    pub fn day_length(&self, date: &NaiveDate) -> f64 {
        self.tracks_on(date).map(|t| t.length).sum()
    }

    pub fn year_total(&self, year: i32) -> f64 {
        self.tracks
            .iter()
            .filter(|t| t.start_time_local.year() == year)
            .map(|t| t.length)
            .sum()
    }

    pub fn statistics(&self) -> Statistics {
        let mut range = ValueRange::new();
        let mut total = 0.0;
        let mut weeks = HashSet::new();
        for t in &self.tracks {
            total += t.length;
            range.extend(t.length);
            let date = t.start_time_local.date();
            weeks.insert((date.year(), date.iso_week().week()));
        }
        let count = self.tracks.len();
        Statistics {
            count,
            total,
            average: if count == 0 { 0.0 } else { total / count as f64 },
            min: range.lower(),
            max: range.upper(),
            weeks: weeks.len(),
        }
    }
}

pub struct Poster {
    pub athlete: String,
    pub title: String,
    pub units: Units,
    pub colors: Palette,
    pub special_distance: SpecialDistance,
    /// Page size in millimeters.
    pub width: f64,
    pub height: f64,
    pub github_style: GithubStyle,
    /// Reference "current" time for age and day counts.
    pub now: NaiveDateTime,
    translator: Translator,
    tracks: TrackSet,
}

impl Default for Poster {
    fn default() -> Self {
        Self::new()
    }
}

impl Poster {
    pub fn new() -> Self {
        Self {
            athlete: "John Doe".to_string(),
            title: "MY TRACKS".to_string(),
            units: Units::Metric,
            colors: Palette::default(),
            special_distance: SpecialDistance::default(),
            width: 200.0,
            height: 300.0,
            github_style: GithubStyle::AlignFirstday,
            now: Local::now().naive_local(),
            translator: Translator::identity(),
            tracks: TrackSet::default(),
        }
    }

    pub fn set_language(&mut self, translator: Translator) {
        self.translator = translator;
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn trans(&self, text: &str) -> String {
        self.translator.translate(text)
    }

    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = TrackSet::new(tracks, None);
    }

    /// Like [`Poster::set_tracks`] but restricts the indexed span to `years`.
    pub fn set_tracks_for_years(&mut self, tracks: Vec<Track>, years: YearRange) {
        self.tracks = TrackSet::new(tracks, Some(years));
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    /// Meters to kilometers or miles.
    pub fn m2u(&self, meters: f64) -> f64 {
        match self.units {
            Units::Metric => 0.001 * meters,
            Units::Imperial => meters / METERS_PER_MILE,
        }
    }

    pub fn u(&self) -> &'static str {
        match self.units {
            Units::Metric => "km",
            Units::Imperial => "mi",
        }
    }

    pub fn format_float(&self, value: f64) -> String {
        self.translator.format_float(value)
    }

    pub fn format_distance(&self, meters: f64) -> String {
        format!("{} {}", self.format_float(self.m2u(meters)), self.u())
    }

    pub fn draw(&self, drawer: &dyn TracksDrawer, output: &Path) -> Result<(), PosterError> {
        let doc = self.render(drawer)?;
        doc.save(output)?;
        info!(drawer = drawer.name(), output = %output.display(), "poster written");
        Ok(())
    }

    pub fn render(&self, drawer: &dyn TracksDrawer) -> Result<SvgDocument, PosterError> {
        let colors = if drawer.body_only() {
            self.colors.plain()
        } else {
            self.colors.clone()
        };
        let ctx = DrawContext::new(self, colors);
        let height = if drawer.body_only() {
            self.height - HEADER_FOOTER_HEIGHT
        } else {
            self.height
        };
        if height <= 0.0 {
            return Err(PosterError::Parameter(format!(
                "page height {} leaves no room to draw",
                self.height
            )));
        }
        let mut doc = SvgDocument::new(self.width, height);
        doc.add(
            rect(XY::default(), XY::new(self.width, height))
                .attr("fill", ctx.colors.background.hex()),
        );
        if drawer.body_only() {
            drawer.draw(&ctx, &mut doc, XY::new(self.width - 20.0, height), XY::new(10.0, 0.0))?;
        } else {
            self.draw_header(&ctx, &mut doc);
            self.draw_footer(&ctx, &mut doc);
            drawer.draw(
                &ctx,
                &mut doc,
                XY::new(self.width - 20.0, self.height - 30.0 - 30.0),
                XY::new(10.0, 30.0),
            )?;
        }
        Ok(doc)
    }

    /// Draws one `year_YYYY.svg` into `dir` for every year of the current
    /// range, each indexed on its own. The full dataset is restored afterwards.
    pub fn draw_each_year(
        &mut self,
        drawer: &dyn TracksDrawer,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, PosterError> {
        let all = std::mem::take(&mut self.tracks);
        let result = all
            .years()
            .years()
            .into_iter()
            .map(|year| {
                let tracks = all
                    .tracks()
                    .iter()
                    .filter(|t| t.start_time_local.year() == year)
                    .cloned()
                    .collect();
                self.tracks = TrackSet::new(tracks, Some(YearRange::single(year)));
                let path = dir.join(format!("year_{year}.svg"));
                self.draw(drawer, &path).map(|()| path)
            })
            .collect();
        self.tracks = all;
        result
    }

    fn draw_header(&self, ctx: &DrawContext, doc: &mut SvgDocument) {
        doc.add(
            text(self.title.clone(), XY::new(10.0, 20.0))
                .attr("fill", ctx.colors.text.hex())
                .attr("style", "font-size:12px; font-family:Arial; font-weight:bold;"),
        );
    }

    fn draw_footer(&self, ctx: &DrawContext, doc: &mut SvgDocument) {
        let text_color = ctx.colors.text.hex();
        let header_style = "font-size:4px; font-family:Arial";
        let value_style = "font-size:9px; font-family:Arial";
        let small_value_style = "font-size:3px; font-family:Arial";
        let h = self.height;
        let stats = self.tracks.statistics();

        let mut label = |content: String, x: f64, y: f64, style: &str| {
            doc.add(
                text(content, XY::new(x, y))
                    .attr("fill", text_color.clone())
                    .attr("style", style.to_string()),
            );
        };
        label(self.trans("ATHLETE"), 10.0, h - 20.0, header_style);
        label(self.athlete.clone(), 10.0, h - 10.0, value_style);
        label(self.trans("SPECIAL TRACKS"), 65.0, h - 20.0, header_style);
        label(
            format!("{} {:.1} km", self.trans("Over"), self.special_distance.lower),
            70.0,
            h - 14.5,
            small_value_style,
        );
        label(
            format!("{} {:.1} km", self.trans("Over"), self.special_distance.upper),
            70.0,
            h - 10.5,
            small_value_style,
        );
        label(self.trans("STATISTICS"), 120.0, h - 20.0, header_style);
        label(
            format!("{}: {}", self.trans("Number"), stats.count),
            120.0,
            h - 15.0,
            small_value_style,
        );
        label(
            format!("{}: {}", self.trans("Weekly"), self.format_float(stats.weekly())),
            120.0,
            h - 10.0,
            small_value_style,
        );
        let rows = [
            ("Total", stats.total, 141.0, h - 15.0),
            ("Avg", stats.average, 141.0, h - 10.0),
            ("Min", stats.min, 167.0, h - 15.0),
            ("Max", stats.max, 167.0, h - 10.0),
        ];
        for (name, meters, x, y) in rows {
            label(
                format!("{}: {}", self.trans(name), self.format_distance(meters)),
                x,
                y,
                small_value_style,
            );
        }

        doc.add(rect(XY::new(65.0, h - 17.0), XY::new(2.6, 2.6)).attr("fill", ctx.colors.special.hex()));
        doc.add(rect(XY::new(65.0, h - 13.0), XY::new(2.6, 2.6)).attr("fill", ctx.colors.special2.hex()));
    }
}
