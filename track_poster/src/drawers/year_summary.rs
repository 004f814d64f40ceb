use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use clap::{value_parser, Arg, ArgMatches, Command};

use crate::color::Rgb;
use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::XY;
use crate::svg::{circle, text, SvgDocument};
use crate::track::Track;
use crate::PosterError;

const DIM: Rgb = Rgb::new(0x55, 0x55, 0x55);
const MARATHON_KM: f64 = 42.0;
const HALF_MARATHON_KM: f64 = 21.0;
const TEN_K_KM: f64 = 10.0;

/// Single-year dashboard: headline figures on the left, a month by day dot
/// matrix on the right.
#[derive(Clone, Debug, Default)]
pub struct YearSummaryDrawer {
    year: Option<i32>,
}

impl YearSummaryDrawer {
    pub fn for_year(year: i32) -> Self {
        Self { year: Some(year) }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct YearStats {
    runs: usize,
    /// Meters.
    total: f64,
    longest: f64,
    marathons: usize,
    half_marathons: usize,
    ten_ks: usize,
    moving_secs: f64,
    streak: usize,
}

impl YearStats {
    fn collect(tracks: &[&Track]) -> Self {
        let mut stats = YearStats {
            runs: tracks.len(),
            ..Default::default()
        };
        for track in tracks {
            stats.total += track.length;
            stats.longest = stats.longest.max(track.length);
            // race buckets use raw kilometers whatever the display units
            let km = track.length / 1000.0;
            if km >= MARATHON_KM {
                stats.marathons += 1;
            } else if km >= HALF_MARATHON_KM {
                stats.half_marathons += 1;
            } else if km >= TEN_K_KM {
                stats.ten_ks += 1;
            }
            let moving = track.moving.moving_time.num_milliseconds() as f64 / 1000.0;
            stats.moving_secs += if moving > 0.0 {
                moving
            } else {
                (track.end_time - track.start_time).num_seconds().max(0) as f64
            };
        }
        stats.streak = longest_streak(tracks.iter().map(|t| t.start_time_local.date()));
        stats
    }
}

/// Longest run of consecutive calendar days.
fn longest_streak(dates: impl IntoIterator<Item = NaiveDate>) -> usize {
    let dates: BTreeSet<NaiveDate> = dates.into_iter().collect();
    let mut best = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        current = match previous {
            Some(p) if p.succ_opt() == Some(date) => current + 1,
            _ => 1,
        };
        best = best.max(current);
        previous = Some(date);
    }
    best
}

/// Seconds per distance unit as `M'SS"`.
fn format_pace(seconds: f64, distance_units: f64) -> String {
    if seconds <= 0.0 || distance_units <= 0.0 {
        return "0'00\"".to_string();
    }
    let pace = (seconds / distance_units) as u64;
    format!("{}'{:02}\"", pace / 60, pace % 60)
}

impl YearSummaryDrawer {
    fn dot_color(&self, ctx: &DrawContext, meters: f64) -> Rgb {
        let km = meters / 1000.0;
        let sd = ctx.poster.special_distance;
        if km <= 0.0 {
            DIM
        } else if km >= sd.upper {
            ctx.colors.special
        } else {
            DIM.lerp(&ctx.colors.track, (km / sd.lower).min(1.0))
        }
    }

    fn draw_dots(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        year: i32,
        by_day: &BTreeMap<NaiveDate, f64>,
        start: XY,
        size: XY,
    ) {
        let spacing = XY::new(size.x / 12.0, size.y / 31.0);
        let radius = spacing.min_component() / 2.0 * 0.75;
        let poster = ctx.poster;
        for month in 1..=12u32 {
            for day in 1..=31u32 {
                let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                    continue;
                };
                let center = start
                    + spacing * XY::new(month as f64 - 0.5, day as f64 - 0.5);
                let meters = by_day.get(&date).copied().unwrap_or(0.0);
                let mut title = date.format("%Y-%m-%d").to_string();
                if meters > 0.0 {
                    title = format!("{title}: {}", poster.format_distance(meters));
                }
                doc.add(
                    circle(center, radius)
                        .attr("fill", self.dot_color(ctx, meters).hex())
                        .title(title),
                );
            }
        }
    }
}

impl TracksDrawer for YearSummaryDrawer {
    fn name(&self) -> &'static str {
        "year_summary"
    }

    fn create_args(&self, cmd: Command) -> Command {
        cmd.next_help_heading("Year Summary Type Options").arg(
            Arg::new("summary_year")
                .long("summary-year")
                .value_name("YEAR")
                .value_parser(value_parser!(i32))
                .help("Year to generate summary for (default: current year)"),
        )
    }

    fn fetch_args(&mut self, matches: &ArgMatches) -> Result<(), PosterError> {
        self.year = matches.get_one::<i32>("summary_year").copied();
        Ok(())
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        size: XY,
        offset: XY,
    ) -> Result<(), PosterError> {
        let poster = ctx.poster;
        let year = self.year.unwrap_or_else(|| poster.now.year());
        let all = ctx.tracks().tracks();
        let year_tracks: Vec<&Track> = all
            .iter()
            .filter(|t| t.start_time_local.year() == year)
            .collect();
        let stats = YearStats::collect(&year_tracks);
        let text_color = ctx.colors.text.hex();

        let left = offset.x + 6.0;
        let left_width = size.x * 0.40;
        let right = offset.x + left_width;

        let mut label = |content: String, at: XY, font: f64, bold: bool, fill: String| {
            let style = if bold {
                format!("font-size:{font}px; font-family:Arial; font-weight:bold;")
            } else {
                format!("font-size:{font}px; font-family:Arial;")
            };
            doc.add(text(content, at).attr("fill", fill).attr("style", style));
        };

        let headline = match all.iter().map(|t| t.start_time_local).min() {
            Some(first) => format!(
                "{} {} {}",
                poster.trans("Running for"),
                (poster.now - first).num_days(),
                poster.trans("Days")
            ),
            None => format!("{} {year}", poster.trans("Year")),
        };
        label(headline, XY::new(left, offset.y + 14.0), 6.0, false, DIM.hex());
        label(poster.trans("Races"), XY::new(left, offset.y + 34.0), 6.0, false, DIM.hex());

        let races = [
            ("Full", stats.marathons),
            ("Half", stats.half_marathons),
            ("10K", stats.ten_ks),
        ];
        let mut y = offset.y + 54.0;
        let mut shown = 0;
        for (name, count) in races.into_iter().filter(|(_, c)| *c > 0) {
            shown += 1;
            label(shown.to_string(), XY::new(left, y), 8.0, false, DIM.hex());
            label(poster.trans(name), XY::new(left + 12.0, y), 10.0, true, text_color.clone());
            label(format!("{count}x"), XY::new(left + 38.0, y), 6.0, false, DIM.hex());
            y += 18.0;
        }

        let stats_y = if shown == 0 {
            offset.y + 72.0
        } else {
            offset.y + 54.0 + shown as f64 * 18.0 + 26.0
        };
        label(poster.trans("Stats"), XY::new(left, stats_y - 6.0), 6.0, false, DIM.hex());

        let units_total = poster.m2u(stats.total);
        let items = [
            ("Distance", format!("{}", units_total as i64), poster.u()),
            ("Runs", stats.runs.to_string(), ""),
            ("Avg Pace", format_pace(stats.moving_secs, units_total), ""),
            ("Streak", stats.streak.to_string(), "d"),
            ("Time", format!("{}", (stats.moving_secs / 3600.0) as i64), "h"),
            ("Longest", poster.format_float(poster.m2u(stats.longest)), poster.u()),
        ];
        for (i, (name, value, unit)) in items.into_iter().enumerate() {
            let x = if i % 2 == 0 { left } else { left + 42.0 };
            let y = stats_y + (i / 2) as f64 * 28.0;
            label(poster.trans(name), XY::new(x, y), 5.0, false, DIM.hex());
            let width = value.chars().count() as f64 * 6.0;
            label(value, XY::new(x, y + 11.0), 10.0, true, text_color.clone());
            if !unit.is_empty() {
                label(unit.to_string(), XY::new(x + width, y + 11.0), 6.0, false, DIM.hex());
            }
        }

        let dots_start = XY::new(right, offset.y + 8.0);
        let dots_size = XY::new(size.x - left_width - 8.0, size.y - 16.0);
        let row = dots_size.y / 31.0;
        let runner_y = dots_start.y + 27.5 * row;
        let athlete = if poster.athlete.is_empty() {
            poster.trans("Runner")
        } else {
            poster.athlete.clone()
        };
        label(poster.trans("Runner"), XY::new(left, runner_y - 4.0), 5.0, false, DIM.hex());
        label(athlete, XY::new(left, runner_y + 6.0), 8.0, true, text_color.clone());
        label(
            format!("{}/{year}", env!("CARGO_PKG_NAME")),
            XY::new(left, dots_start.y + 30.5 * row + 3.0),
            7.0,
            false,
            DIM.hex(),
        );

        let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for track in &year_tracks {
            *by_day.entry(track.start_time_local.date()).or_default() += track.length;
        }
        self.draw_dots(ctx, doc, year, &by_day, dots_start, dots_size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawers::tests::{by_name, render, title_of};
    use crate::poster::tests::{poster_with, run};

    fn texts(doc: &SvgDocument) -> Vec<String> {
        by_name(doc, "text")
            .into_iter()
            .filter_map(|t| t.text_content().map(str::to_string))
            .collect()
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let d = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        assert_eq!(longest_streak(Vec::new()), 0);
        assert_eq!(longest_streak([d(3, 1)]), 1);
        assert_eq!(
            longest_streak([d(2, 28), d(2, 29), d(3, 1), d(3, 1), d(3, 5), d(3, 6)]),
            3
        );
    }

    #[test]
    fn pace_is_minutes_and_seconds() {
        assert_eq!(format_pace(1800.0, 5.0), "6'00\"");
        assert_eq!(format_pace(1799.0, 5.0), "5'59\"");
        assert_eq!(format_pace(0.0, 5.0), "0'00\"");
        assert_eq!(format_pace(1800.0, 0.0), "0'00\"");
    }

    #[test]
    fn race_buckets_use_raw_kilometers() {
        let ten = run(2024, 3, 15, 8, 180, "a.gpx");
        let five = run(2024, 3, 16, 8, 90, "b.gpx");
        let stats = YearStats::collect(&[&ten, &five]);
        assert_eq!(stats.runs, 2);
        assert_eq!((stats.marathons, stats.half_marathons, stats.ten_ks), (0, 0, 1));
        assert_eq!(stats.streak, 2);
        assert!((stats.moving_secs - 5400.0).abs() < 1.0);
    }

    #[test]
    fn dashboard_for_one_year() {
        let poster = poster_with(vec![
            run(2023, 12, 30, 8, 40, "old.gpx"),
            run(2024, 3, 15, 8, 90, "a.gpx"),
            run(2024, 3, 16, 8, 180, "b.gpx"),
            run(2024, 3, 17, 8, 40, "c.gpx"),
        ]);
        let doc = render(&poster, &YearSummaryDrawer::for_year(2024));

        let dots = by_name(&doc, "circle");
        assert_eq!(dots.len(), 366);
        let active: Vec<_> = dots
            .iter()
            .filter_map(|c| title_of(c))
            .filter(|t| t.contains(':'))
            .collect();
        assert_eq!(active, ["2024-03-15: 5.0 km", "2024-03-16: 10.0 km", "2024-03-17: 2.2 km"]);

        let texts = texts(&doc);
        // 2023-12-30 08:00 to 2024-12-31 12:00
        assert!(texts.contains(&"Running for 367 Days".to_string()));
        assert!(texts.contains(&"10K".to_string()));
        assert!(!texts.contains(&"Half".to_string()));
        assert!(texts.contains(&"track_poster/2024".to_string()));
        assert!(texts.contains(&"John Doe".to_string()));
        assert!(texts.contains(&"17".to_string()));
    }

    #[test]
    fn dots_scale_towards_track_color() {
        let poster = poster_with(vec![
            run(2024, 3, 15, 8, 90, "a.gpx"),
            run(2024, 3, 16, 8, 400, "b.gpx"),
        ]);
        let drawer = YearSummaryDrawer::for_year(2024);
        let ctx = DrawContext::new(&poster, poster.colors.clone());
        assert_eq!(drawer.dot_color(&ctx, 0.0), DIM);
        assert_eq!(drawer.dot_color(&ctx, 25_000.0), ctx.colors.special);
        assert_eq!(drawer.dot_color(&ctx, 15_000.0), ctx.colors.track);
        let half = drawer.dot_color(&ctx, 5_000.0);
        assert_ne!(half, DIM);
        assert_ne!(half, ctx.colors.track);
    }
}
