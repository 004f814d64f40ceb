use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use track_poster::drawers::registry;
use track_poster::geometry::decode_polyline;
use track_poster::i18n::Translator;
use track_poster::poster::{GithubStyle, SpecialDistance};
use track_poster::privacy::PrivacyFilter;
use track_poster::timezone::{NamedZone, TimezoneLookup, TzfLookup};
use track_poster::{
    FileType, LoaderOptions, Palette, Poster, Rgb, Track, TrackLoader, Units, YearRange,
};

#[derive(Parser, Debug)]
#[command(
    name = "create_poster",
    author,
    version,
    about = "Render a collection of activity tracks into an SVG poster",
    long_about = None
)]
struct Cli {
    /// Directory containing the activity files
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    gpx_dir: PathBuf,

    /// Format of the files in --gpx-dir
    #[arg(long, value_enum, default_value_t = FileType::Gpx)]
    file_type: FileType,

    /// Name of the output SVG file
    #[arg(long, default_value = "poster.svg", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Language of labels and month names, e.g. de_DE
    #[arg(long, default_value = "")]
    language: String,

    /// Directory with <language>.json translation catalogs
    #[arg(long, default_value = "locale", value_hint = ValueHint::DirPath)]
    locale_dir: PathBuf,

    /// Filter tracks by year: "YYYY", "YYYY-YYYY" or "all"
    #[arg(long, default_value = "all")]
    year: String,

    /// Title to display (default: translated "MY TRACKS")
    #[arg(long)]
    title: Option<String>,

    /// Athlete name to display
    #[arg(long, default_value = "John Doe")]
    athlete: String,

    /// Mark a track file from --gpx-dir as special; may be repeated
    #[arg(long = "special", value_name = "FILE", action = ArgAction::Append)]
    special: Vec<String>,

    /// Type of poster to create
    #[arg(long = "type", default_value = "grid")]
    drawer_type: String,

    #[arg(long, default_value = "#222222", value_name = "COLOR")]
    background_color: String,

    #[arg(long, default_value = "#4DD2FF", value_name = "COLOR")]
    track_color: String,

    /// Secondary track color for gradients (default: --track-color)
    #[arg(long, value_name = "COLOR")]
    track_color2: Option<String>,

    #[arg(long, default_value = "#FFFFFF", value_name = "COLOR")]
    text_color: String,

    #[arg(long, default_value = "#FFFF00", value_name = "COLOR")]
    special_color: String,

    /// Secondary special color (default: --special-color)
    #[arg(long, value_name = "COLOR")]
    special_color2: Option<String>,

    #[arg(long, value_enum, default_value_t = Units::Metric)]
    units: Units,

    /// Lower special distance in km, colored with the special color
    #[arg(long, default_value_t = 10.0)]
    special_distance: f64,

    /// Upper special distance in km, colored with the second special color
    #[arg(long, default_value_t = 20.0)]
    special_distance2: f64,

    /// Tracks shorter than this many km are dropped
    #[arg(long, default_value_t = 1.0)]
    min_distance: f64,

    /// Page width in millimeters
    #[arg(long, default_value_t = 200.0)]
    width: f64,

    /// Page height in millimeters (the github type computes its own)
    #[arg(long, default_value_t = 300.0)]
    height: f64,

    #[arg(long, value_enum, default_value_t = GithubStyle::AlignFirstday)]
    github_style: GithubStyle,

    /// Only draw tracks of this sport, or "all"
    #[arg(long, default_value = "all")]
    sport_type: String,

    /// Read activities from the SQLite store instead of --gpx-dir
    #[arg(long, action = ArgAction::SetTrue)]
    from_db: bool,

    #[arg(long, default_value = "data.db", value_hint = ValueHint::FilePath)]
    db_file: PathBuf,

    /// IANA zone used for every track instead of a per-position lookup
    #[arg(long, value_name = "ZONE")]
    timezone: Option<String>,

    /// JSON object mapping file stems to track names
    #[arg(long, value_hint = ValueHint::FilePath)]
    title_overrides: Option<PathBuf>,

    /// JSON list of already imported files (default: <gpx-dir>/imported.json)
    #[arg(long, value_hint = ValueHint::FilePath)]
    synced_file: Option<PathBuf>,

    /// Apply the privacy filter to stored polylines
    #[arg(long, env = "IGNORE_BEFORE_SAVING", action = ArgAction::SetTrue)]
    ignore_before_saving: bool,

    /// Encoded polyline whose surroundings are hidden
    #[arg(long, env = "IGNORE_POLYLINE")]
    ignore_polyline: Option<String>,

    /// Meters hidden around each point of --ignore-polyline
    #[arg(long, env = "IGNORE_RANGE", default_value_t = 0.0)]
    ignore_range: f64,

    /// Meters hidden at both ends of every track
    #[arg(long, env = "IGNORE_START_END_RANGE", default_value_t = 0.0)]
    ignore_start_end_range: f64,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Also write log output to FILE
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    logfile: Option<PathBuf>,
}

fn main() -> Result<()> {
    let mut drawers = registry();
    let names: Vec<&'static str> = drawers.keys().copied().collect();
    let mut cmd = Cli::command().mut_arg("drawer_type", |arg| {
        arg.value_parser(PossibleValuesParser::new(names))
    });
    for drawer in drawers.values() {
        cmd = drawer.create_args(cmd);
    }
    let matches = cmd.get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    init_logging(cli.verbose, cli.logfile.as_deref())?;

    let mut drawer = drawers
        .remove(cli.drawer_type.as_str())
        .ok_or_else(|| anyhow!("unknown poster type {}", cli.drawer_type))?;
    drawer.fetch_args(&matches)?;

    let year_range: YearRange = cli.year.parse()?;
    let lookup: Arc<dyn TimezoneLookup> = match &cli.timezone {
        Some(zone) => Arc::new(NamedZone::parse(zone)?),
        None => Arc::new(TzfLookup::new()),
    };

    let synced_path = cli
        .synced_file
        .clone()
        .unwrap_or_else(|| cli.gpx_dir.join("imported.json"));
    let options = LoaderOptions {
        min_length: cli.min_distance * 1000.0,
        special_file_names: cli.special.iter().cloned().collect(),
        year_range: year_range.clone(),
        title_overrides: match &cli.title_overrides {
            Some(path) => read_json::<HashMap<String, String>>(path)?,
            None => HashMap::new(),
        },
        synced_files: if synced_path.is_file() {
            read_json::<HashSet<String>>(&synced_path)?
        } else {
            HashSet::new()
        },
    };
    let loader = TrackLoader::new(options, lookup);

    let mut tracks = if cli.from_db {
        let privacy = privacy_filter(&cli)?;
        loader
            .load_tracks_from_db(&cli.db_file, cli.drawer_type == "grid", privacy.as_ref())
            .with_context(|| format!("failed to load activities from {}", cli.db_file.display()))?
    } else {
        loader.load_tracks(&cli.gpx_dir, cli.file_type)?
    };
    if cli.sport_type != "all" {
        tracks.retain(|t: &Track| t.sport == cli.sport_type);
    }
    if tracks.is_empty() {
        warn!("no tracks to draw");
        return Ok(());
    }

    let mut poster = Poster::new();
    if !cli.language.is_empty() {
        poster.set_language(Translator::for_language(&cli.language, &cli.locale_dir)?);
    }
    poster.athlete = cli.athlete.clone();
    poster.title = cli
        .title
        .clone()
        .unwrap_or_else(|| poster.trans("MY TRACKS"));
    poster.special_distance = SpecialDistance {
        lower: cli.special_distance,
        upper: cli.special_distance2,
    };
    poster.colors = palette(&cli)?;
    poster.units = cli.units;
    poster.width = cli.width;
    poster.height = cli.height;
    poster.github_style = cli.github_style;
    if year_range.is_bounded() {
        poster.set_tracks_for_years(tracks, year_range);
    } else {
        poster.set_tracks(tracks);
    }
    if drawer.name() == "github" {
        poster.height = 55.0 + 43.0 * poster.tracks().years().real_year() as f64;
    }

    info!(
        "Creating poster of type {} with {} tracks and storing it in file {}...",
        drawer.name(),
        poster.tracks().len(),
        cli.output.display()
    );
    poster
        .draw(drawer.as_ref(), &cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    if drawer.name() == "circular" {
        let year_dir = per_year_dir(&cli.output);
        fs::create_dir_all(&year_dir)
            .with_context(|| format!("failed to create {}", year_dir.display()))?;
        let written = poster
            .draw_each_year(drawer.as_ref(), &year_dir)
            .with_context(|| format!("failed to write yearly posters to {}", year_dir.display()))?;
        info!("Wrote {} yearly posters to {}", written.len(), year_dir.display());
    }
    Ok(())
}

/// Directory for `year_YYYY.svg` files: next to the main output, or `assets`.
fn per_year_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("assets"),
    }
}

fn init_logging(verbose: bool, logfile: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = match logfile {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install the log subscriber")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn palette(cli: &Cli) -> Result<Palette> {
    let color = |value: &str| -> Result<Rgb> { Ok(value.parse::<Rgb>()?) };
    let track = color(&cli.track_color)?;
    let special = color(&cli.special_color)?;
    Ok(Palette {
        background: color(&cli.background_color)?,
        text: color(&cli.text_color)?,
        track,
        track2: cli.track_color2.as_deref().map(color).transpose()?.unwrap_or(track),
        special,
        special2: cli
            .special_color2
            .as_deref()
            .map(color)
            .transpose()?
            .unwrap_or(special),
    })
}

fn privacy_filter(cli: &Cli) -> Result<Option<PrivacyFilter>> {
    if !cli.ignore_before_saving {
        return Ok(None);
    }
    let ignore_points = match cli.ignore_polyline.as_deref() {
        Some(encoded) if !encoded.is_empty() => decode_polyline(encoded)
            .ok_or_else(|| anyhow!("IGNORE_POLYLINE is not a valid encoded polyline"))?,
        _ => Vec::new(),
    };
    let filter = PrivacyFilter {
        start_end_range: cli.ignore_start_end_range,
        ignore_points,
        ignore_range: cli.ignore_range,
    };
    Ok((!filter.is_noop()).then_some(filter))
}
