use chrono::{Datelike, NaiveDate};
use clap::{Arg, ArgMatches, Command};

use crate::color::Rgb;
use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::XY;
use crate::svg::{circle, SvgDocument};
use crate::PosterError;

const TOTAL_MONTHS: usize = 1200;
const PAST_COLOR: Rgb = Rgb::new(0x80, 0x80, 0x80);
const FUTURE_COLOR: Rgb = Rgb::new(0x44, 0x44, 0x44);

/// A hundred years of months as dots, starting at the birth month.
#[derive(Clone, Debug, Default)]
pub struct MonthOfLifeDrawer {
    birth: Option<(i32, u32)>,
}

impl MonthOfLifeDrawer {
    pub fn with_birth(birth: &str) -> Result<Self, PosterError> {
        Ok(Self {
            birth: Some(parse_birth(birth)?),
        })
    }
}

fn parse_birth(value: &str) -> Result<(i32, u32), PosterError> {
    let invalid = || PosterError::Parameter("Invalid birth date format, must be YYYY-MM".into());
    let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

fn missing_birth() -> PosterError {
    PosterError::Parameter("Birth date parameter --birth is required in format YYYY-MM".into())
}

impl TracksDrawer for MonthOfLifeDrawer {
    fn name(&self) -> &'static str {
        "monthoflife"
    }

    fn create_args(&self, cmd: Command) -> Command {
        cmd.next_help_heading("Month of Life Type Options").arg(
            Arg::new("birth")
                .long("birth")
                .value_name("YYYY-MM")
                .help("Birth date in format YYYY-MM"),
        )
    }

    fn fetch_args(&mut self, matches: &ArgMatches) -> Result<(), PosterError> {
        let birth = matches.get_one::<String>("birth").ok_or_else(missing_birth)?;
        self.birth = Some(parse_birth(birth)?);
        Ok(())
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        size: XY,
        offset: XY,
    ) -> Result<(), PosterError> {
        let (birth_year, birth_month) = self.birth.ok_or_else(missing_birth)?;
        let poster = ctx.poster;
        let sd = poster.special_distance;
        let range = ctx.tracks().length_range_by_date();

        let cols = ((size.x / size.y * (TOTAL_MONTHS as f64).sqrt()) as usize).max(1);
        let rows = TOTAL_MONTHS.div_ceil(cols);
        let spacing = XY::new(size.x / cols as f64, size.y / rows as f64);
        let radius = spacing.min_component() / 2.0 * 0.85;

        let mut month_distances = vec![0.0; TOTAL_MONTHS];
        for track in ctx.tracks().tracks() {
            let start = track.start_time_local;
            let idx = (start.year() - birth_year) as i64 * 12 + start.month() as i64
                - birth_month as i64;
            if let Ok(idx) = usize::try_from(idx) {
                if idx < TOTAL_MONTHS {
                    month_distances[idx] += track.length;
                }
            }
        }

        for (idx, &distance) in month_distances.iter().enumerate() {
            let months = birth_month as usize - 1 + idx;
            let year = birth_year + (months / 12) as i32;
            let month = (months % 12) as u32 + 1;
            let center = offset
                + spacing * XY::new((idx % cols) as f64 + 0.5, (idx / cols) as f64 + 0.5);

            let is_past = NaiveDate::from_ymd_opt(year, month, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .is_some_and(|d| d < poster.now);
            let mut color = if is_past { PAST_COLOR } else { FUTURE_COLOR };
            let age = (year - birth_year) + (month as i32 - birth_month as i32).div_euclid(12);
            let mut title = format!("{year}-{month:02} ({age} years old)");
            if distance > 0.0 {
                let units = poster.m2u(distance);
                color = if units >= sd.upper {
                    ctx.colors.special2
                } else {
                    ctx.color(range, distance, sd.lower < units)
                };
                title = format!("{title} {} {}", poster.format_float(units), poster.u());
            }
            doc.add(circle(center, radius).attr("fill", color.hex()).title(title));
        }
        Ok(())
    }
}
