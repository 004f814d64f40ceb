use chrono::{Datelike, Duration, NaiveDate};
use clap::{Arg, ArgMatches, Command};

use crate::color::Rgb;
use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::XY;
use crate::poster::GithubStyle;
use crate::svg::{rect, text, SvgDocument};
use crate::PosterError;

const YEAR_SIZE: f64 = 10.0;
const CELL: f64 = 2.6;
const STRIDE: f64 = 3.5;
const WEEKS: usize = 54;

/// Contribution-calendar layout: one 7-row block of day cells per year.
#[derive(Clone, Debug)]
pub struct GithubDrawer {
    empty_color: Rgb,
}

impl Default for GithubDrawer {
    fn default() -> Self {
        Self {
            empty_color: Rgb::new(0x44, 0x44, 0x44),
        }
    }
}

impl GithubDrawer {
    fn draw_year(&self, ctx: &DrawContext, doc: &mut SvgDocument, offset: XY, year: i32, total: &str) {
        let poster = ctx.poster;
        let tracks = ctx.tracks();
        let text_color = ctx.colors.text.hex();

        doc.add(
            text(year.to_string(), offset)
                .attr("fill", text_color.clone())
                .attr("dominant-baseline", "hanging")
                .attr("style", "font-size:4px; font-family:Arial;"),
        );
        doc.add(
            text(
                format!("{total} {}", poster.u()),
                offset + XY::new(165.0, 5.0),
            )
            .attr("fill", text_color.clone())
            .attr("dominant-baseline", "hanging")
            .attr("style", "font-size:3px; font-family:Arial;"),
        );
        for month in 1..=12u32 {
            doc.add(
                text(
                    poster.translator().month_abbr(month),
                    offset + XY::new(15.5 * (month - 1) as f64, 14.0),
                )
                .attr("fill", text_color.clone())
                .attr("style", "font-size:2.5px; font-family:Arial"),
            );
        }

        let Some(jan_first) = NaiveDate::from_ymd_opt(year, 1, 1) else {
            return;
        };
        let jan_weekday = jan_first.weekday().num_days_from_monday();
        let (mut date, mut first_weekday) = match poster.github_style {
            GithubStyle::AlignFirstday => (jan_first, jan_weekday),
            GithubStyle::AlignMonday => (jan_first - Duration::days(jan_weekday.into()), 0),
        };

        let mut rect_x = offset.x;
        for week in 0..WEEKS {
            if week > 0 {
                first_weekday = 0;
            }
            let mut rect_y = offset.y + YEAR_SIZE + 2.0 + STRIDE * first_weekday as f64;
            for _ in 0..(7 - first_weekday) {
                if date.year() > year {
                    break;
                }
                rect_y += STRIDE;
                let mut title = date.format("%Y-%m-%d").to_string();
                let color = if tracks.has_tracks_on(&date) {
                    let length = tracks.day_length(&date);
                    title = format!("{title} {}", poster.format_distance(length));
                    ctx.special_color(tracks.length_range_by_date(), length, false)
                } else {
                    self.empty_color
                };
                doc.add(
                    rect(XY::new(rect_x, rect_y), XY::new(CELL, CELL))
                        .attr("rx", "0.3")
                        .attr("fill", color.hex())
                        .title(title),
                );
                date += Duration::days(1);
            }
            rect_x += STRIDE;
        }
    }
}

impl TracksDrawer for GithubDrawer {
    fn name(&self) -> &'static str {
        "github"
    }

    fn create_args(&self, cmd: Command) -> Command {
        cmd.next_help_heading("Github Type Options").arg(
            Arg::new("github_empty_data_color")
                .long("empty-data-color")
                .value_name("COLOR")
                .default_value("#444444")
                .help("Color for empty dates in github style poster."),
        )
    }

    fn fetch_args(&mut self, matches: &ArgMatches) -> Result<(), PosterError> {
        if let Some(color) = matches.get_one::<String>("github_empty_data_color") {
            self.empty_color = color.parse()?;
        }
        Ok(())
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        _size: XY,
        mut offset: XY,
    ) -> Result<(), PosterError> {
        let poster = ctx.poster;
        for year in ctx.tracks().years().years().into_iter().rev() {
            let total = poster.m2u(ctx.tracks().year_total(year));
            // years that round to nothing are not drawn
            if total < 0.05 {
                continue;
            }
            let total = poster.format_float(total);
            self.draw_year(ctx, doc, offset, year, &total);
            offset.y += STRIDE * 9.0 + YEAR_SIZE + 1.0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawers::tests::{by_name, render, title_of};
    use crate::poster::tests::{poster_with, run};

    fn cells(doc: &SvgDocument) -> Vec<(f64, f64, String, String)> {
        by_name(doc, "rect")
            .into_iter()
            .filter(|r| r.get_attr("width") == Some("2.6") && title_of(r).is_some())
            .map(|r| {
                (
                    r.get_attr("x").unwrap_or_default().parse().unwrap(),
                    r.get_attr("y").unwrap_or_default().parse().unwrap(),
                    r.get_attr("fill").unwrap_or_default().to_string(),
                    title_of(r).unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn single_run_paints_one_cell() {
        let poster = poster_with(vec![run(2024, 3, 15, 8, 90, "a.gpx")]);
        let doc = render(&poster, &GithubDrawer::default());
        let cells = cells(&doc);
        assert_eq!(cells.len(), 366);
        let painted: Vec<_> = cells.iter().filter(|c| c.2 != "#444444").collect();
        assert_eq!(painted.len(), 1);
        assert_eq!(painted[0].3, "2024-03-15 5.0 km");
        assert_eq!(cells[0].3, "2024-01-01");
    }

    #[test]
    fn first_column_starts_at_january_weekday() {
        // 2024-01-01 is a Monday, 2023-01-01 a Sunday
        let poster = poster_with(vec![run(2023, 6, 1, 8, 40, "a.gpx")]);
        let doc = render(&poster, &GithubDrawer::default());
        let cells = cells(&doc);
        assert_eq!(cells[0].3, "2023-01-01");
        assert_eq!(cells[1].3, "2023-01-02");
        // Sunday sits in the last row of the first column, Monday opens the second
        assert!(cells[1].0 > cells[0].0);
        assert!(cells[1].1 < cells[0].1);
    }

    #[test]
    fn align_monday_starts_in_previous_year() {
        let mut poster = poster_with(vec![run(2023, 6, 1, 8, 40, "a.gpx")]);
        poster.github_style = GithubStyle::AlignMonday;
        let doc = render(&poster, &GithubDrawer::default());
        let cells = cells(&doc);
        assert_eq!(cells[0].3, "2022-12-26");
        assert_eq!(cells[6].3, "2023-01-01");
    }

    #[test]
    fn years_are_newest_first_and_empty_years_skipped() {
        let poster = poster_with(vec![
            run(2022, 5, 1, 8, 40, "a.gpx"),
            run(2024, 5, 1, 8, 40, "b.gpx"),
        ]);
        let doc = render(&poster, &GithubDrawer::default());
        let labels: Vec<_> = by_name(&doc, "text")
            .into_iter()
            .filter_map(|t| t.text_content())
            .filter(|t| t.len() == 4 && t.starts_with("20"))
            .collect();
        assert_eq!(labels, ["2024", "2022"]);
    }
}
