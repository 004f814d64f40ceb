use clap::{value_parser, Arg, ArgMatches, Command};
use tracing::info;

use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::{project, LatLng, LatLngBounds, XY};
use crate::svg::{polyline, SvgDocument};
use crate::PosterError;

const EARTH_RADIUS_KM: f64 = 6378.1;
/// (opacity, width) of the stacked strokes, widest first.
const STROKES: [(f64, f64); 3] = [(0.1, 5.0), (0.2, 2.0), (1.0, 0.3)];

/// Every track overlaid on one shared projection filling the page.
#[derive(Clone, Debug, Default)]
pub struct PlainDrawer {
    center: Option<LatLng>,
    radius_km: Option<f64>,
}

impl PlainDrawer {
    pub fn centered(center: LatLng, radius_km: Option<f64>) -> Result<Self, PosterError> {
        if !center.is_valid() {
            return Err(PosterError::Parameter(format!(
                "Not a valid LAT,LNG pair: {},{}",
                center.lat, center.lng
            )));
        }
        if let Some(radius) = radius_km {
            validate_radius(radius)?;
        }
        Ok(Self {
            center: Some(center),
            radius_km,
        })
    }

    fn bbox(&self, ctx: &DrawContext) -> Option<LatLngBounds> {
        let tracks = ctx.tracks().tracks();
        let Some(center) = self.center else {
            return tracks
                .iter()
                .filter_map(|t| t.bbox())
                .reduce(LatLngBounds::union);
        };
        info!(lat = center.lat, lng = center.lng, "forcing heatmap center");
        let (dlat, dlng) = match self.radius_km {
            Some(radius) => {
                let quarter = EARTH_RADIUS_KM * std::f64::consts::PI / 2.0;
                let dlat = 90.0 * radius / quarter;
                (dlat, dlat / center.lat.to_radians().cos())
            }
            None => tracks
                .iter()
                .flat_map(|t| t.points())
                .fold((0.0f64, 0.0f64), |(dlat, dlng), p| {
                    let mut d = (center.lng - p.lng).abs() % 360.0;
                    if d > 180.0 {
                        d = 360.0 - d;
                    }
                    (dlat.max((center.lat - p.lat).abs()), dlng.max(d))
                }),
        };
        Some(LatLngBounds::from_center_size(center, 2.0 * dlat, 2.0 * dlng))
    }
}

fn parse_center(value: &str) -> Result<LatLng, PosterError> {
    let invalid = || PosterError::Parameter(format!("Not a valid LAT,LNG pair: {value}"));
    let (lat, lng) = value.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
    let center = LatLng::new(lat, lng);
    if !center.is_valid() {
        return Err(invalid());
    }
    Ok(center)
}

fn validate_radius(radius: f64) -> Result<(), PosterError> {
    if radius > 0.0 {
        Ok(())
    } else {
        Err(PosterError::Parameter(format!(
            "Not a valid radius: {radius} (must be > 0)"
        )))
    }
}

impl TracksDrawer for PlainDrawer {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn create_args(&self, cmd: Command) -> Command {
        cmd.next_help_heading("Plain Type Options")
            .arg(
                Arg::new("heatmap_center")
                    .long("heatmap-center")
                    .value_name("LAT,LNG")
                    .help("Center of the overlay (default: automatic)."),
            )
            .arg(
                Arg::new("heatmap_radius")
                    .long("heatmap-radius")
                    .value_name("RADIUS_KM")
                    .value_parser(value_parser!(f64))
                    .help("Scale so that a circle of RADIUS_KM around the center is visible."),
            )
    }

    fn fetch_args(&mut self, matches: &ArgMatches) -> Result<(), PosterError> {
        self.center = matches
            .get_one::<String>("heatmap_center")
            .map(|s| parse_center(s))
            .transpose()?;
        self.radius_km = matches.get_one::<f64>("heatmap_radius").copied();
        if let Some(radius) = self.radius_km {
            validate_radius(radius)?;
            if self.center.is_none() {
                return Err(PosterError::Parameter(
                    "--heatmap-radius needs --heatmap-center".into(),
                ));
            }
        }
        Ok(())
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        size: XY,
        offset: XY,
    ) -> Result<(), PosterError> {
        let Some(bbox) = self.bbox(ctx) else {
            return Ok(());
        };
        let tracks = ctx.tracks();
        for track in tracks.tracks() {
            let color = ctx.color(tracks.length_range(), track.length, track.special).hex();
            for line in project(&bbox, size, offset, &track.polylines) {
                for (opacity, width) in STROKES {
                    doc.add(
                        polyline(&line)
                            .attr("stroke", color.clone())
                            .num_attr("stroke-opacity", opacity)
                            .num_attr("stroke-width", width),
                    );
                }
            }
        }
        Ok(())
    }

    fn body_only(&self) -> bool {
        true
    }
}
