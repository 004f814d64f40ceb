//! Activity-track poster rendering: load GPX/TCX/FIT files or stored
//! activities, aggregate them, and draw one SVG poster per run.

use thiserror::Error;

pub mod color;
pub mod drawers;
pub mod geometry;
pub mod i18n;
pub mod loader;
pub mod poster;
pub mod privacy;
pub mod svg;
pub mod timezone;
pub mod track;
pub mod year_range;

pub use color::Rgb;
pub use drawers::{DrawContext, TracksDrawer};
pub use geometry::{LatLng, LatLngBounds, ValueRange, XY};
pub use loader::{LoaderOptions, TrackLoader};
pub use poster::{Palette, Poster, TrackSet, Units};
pub use svg::SvgDocument;
pub use track::{FileType, Track};
pub use year_range::YearRange;

/// Failure to turn one input file into a track. Logged and skipped by the loader.
#[derive(Error, Debug)]
pub enum TrackLoadError {
    #[error("empty file")]
    Empty,
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse GPX file: {0}")]
    Gpx(String),
    #[error("failed to parse TCX file: {0}")]
    Tcx(String),
    #[error("failed to parse FIT file: {0}")]
    Fit(String),
    #[error("track has no start or end time")]
    MissingTime,
    #[error("track is empty")]
    EmptyTrack,
}

#[derive(Error, Debug)]
pub enum PosterError {
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error(transparent)]
    TrackLoad(#[from] TrackLoadError),
    #[error("{0}")]
    Render(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}
