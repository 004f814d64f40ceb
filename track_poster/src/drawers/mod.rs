//! Interchangeable poster bodies. Each drawer registers its own flags and
//! renders into the area the poster hands it.

use std::collections::BTreeMap;

use clap::{ArgMatches, Command};

use crate::color::{interpolate_color, Rgb};
use crate::geometry::{ValueRange, XY};
use crate::poster::{Palette, Poster, TrackSet};
use crate::svg::SvgDocument;
use crate::PosterError;

mod circular;
mod geo_grid;
mod github;
mod grid;
mod month_of_life;
mod plain;
mod year_summary;

pub use circular::CircularDrawer;
pub use geo_grid::GeoGridDrawer;
pub use github::GithubDrawer;
pub use grid::GridDrawer;
pub use month_of_life::MonthOfLifeDrawer;
pub use plain::PlainDrawer;
pub use year_summary::YearSummaryDrawer;

pub trait TracksDrawer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register this drawer's flags on the command line.
    fn create_args(&self, cmd: Command) -> Command {
        cmd
    }

    fn fetch_args(&mut self, _matches: &ArgMatches) -> Result<(), PosterError> {
        Ok(())
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        size: XY,
        offset: XY,
    ) -> Result<(), PosterError>;

    /// Whether the poster skips header and footer for this drawer.
    fn body_only(&self) -> bool {
        false
    }
}

/// Every drawer keyed by its `--type` name.
pub fn registry() -> BTreeMap<&'static str, Box<dyn TracksDrawer>> {
    let drawers: Vec<Box<dyn TracksDrawer>> = vec![
        Box::new(GridDrawer),
        Box::new(CircularDrawer::default()),
        Box::new(GithubDrawer::default()),
        Box::new(GeoGridDrawer),
        Box::new(MonthOfLifeDrawer::default()),
        Box::new(YearSummaryDrawer::default()),
        Box::new(PlainDrawer::default()),
    ];
    drawers.into_iter().map(|d| (d.name(), d)).collect()
}

/// What a drawer sees: the poster, read-only, and the palette in effect.
pub struct DrawContext<'a> {
    pub poster: &'a Poster,
    pub colors: Palette,
}

impl<'a> DrawContext<'a> {
    pub fn new(poster: &'a Poster, colors: Palette) -> Self {
        Self { poster, colors }
    }

    pub fn tracks(&self) -> &'a TrackSet {
        self.poster.tracks()
    }

    /// Position of `length` within `range`, blended between the primary and
    /// secondary color of the track or special pair.
    pub fn color(&self, range: &ValueRange, length: f64, is_special: bool) -> Rgb {
        let (c1, c2) = if is_special {
            (self.colors.special, self.colors.special2)
        } else {
            (self.colors.track, self.colors.track2)
        };
        if range.diameter() == 0.0 {
            return c1;
        }
        interpolate_color(&c1, &c2, (length - range.lower()) / range.diameter())
    }

    /// [`DrawContext::color`] with the distance bands applied: a length between
    /// the two thresholds (or a marked track) uses the special pair, a length
    /// at or over the upper one is forced to `special2`.
    pub fn special_color(&self, range: &ValueRange, meters: f64, marked: bool) -> Rgb {
        let km = meters / 1000.0;
        let sd = self.poster.special_distance;
        if km >= sd.upper {
            return self.colors.special2;
        }
        let in_band = sd.lower < km && km < sd.upper;
        self.color(range, meters, marked || in_band)
    }
}
