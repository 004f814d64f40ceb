use chrono::{Datelike, Duration, NaiveDate};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::color::Rgb;
use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::{compute_grid, ValueRange, XY};
use crate::poster::{Units, METERS_PER_MILE};
use crate::svg::{circle, line, rect, Element, SvgDocument};
use crate::PosterError;

const RING_STEPS: [f64; 4] = [1.0, 5.0, 10.0, 50.0];

/// One disk per year; each day is an angular sector whose length grows with
/// the distance covered that day.
#[derive(Clone, Debug)]
pub struct CircularDrawer {
    rings: bool,
    ring_color: Rgb,
}

impl Default for CircularDrawer {
    fn default() -> Self {
        Self {
            rings: false,
            ring_color: Rgb::new(0xa9, 0xa9, 0xa9),
        }
    }
}

impl CircularDrawer {
    pub fn with_rings(mut self, color: Rgb) -> Self {
        self.rings = true;
        self.ring_color = color;
        self
    }

    fn draw_year(&self, ctx: &DrawContext, doc: &mut SvgDocument, size: XY, offset: XY, year: i32) {
        let min_size = size.min_component();
        let outer_radius = 0.5 * min_size - 6.0;
        let radius_range = ValueRange::from_pair(outer_radius / 4.0, outer_radius);
        let center = offset + 0.5 * size;
        let text_color = ctx.colors.text.hex();

        if self.rings {
            self.draw_rings(ctx, doc, center, &radius_range);
        }

        doc.add(
            Element::new("text")
                .attr("x", crate::svg::num(center.x))
                .attr("y", crate::svg::num(center.y))
                .attr("fill", text_color.clone())
                .attr("text-anchor", "middle")
                .attr("alignment-baseline", "middle")
                .attr(
                    "style",
                    format!(
                        "dominant-baseline: central; font-size:{}px; font-family:Arial;",
                        crate::svg::num(min_size * 4.0 / 80.0)
                    ),
                )
                .text(year.to_string()),
        );
        let month_style = format!(
            "font-size:{}px; font-family:Arial;",
            crate::svg::num(min_size * 3.0 / 80.0)
        );

        let Some(first) = NaiveDate::from_ymd_opt(year, 1, 1) else {
            return;
        };
        let days_in_year: f64 = if first.leap_year() { 366.0 } else { 365.0 };
        let df = 360.0 / days_in_year;
        let tracks = ctx.tracks();
        let mut date = first;
        let mut day = 0.0_f64;
        while date.year() == year {
            let a1 = (day * df).to_radians();
            let a2 = ((day + 1.0) * df).to_radians();
            if date.day() == 1 {
                let last_day = days_in_month(date) as f64;
                let a3 = ((day + last_day - 1.0) * df).to_radians();
                let (sin_a1, cos_a1) = a1.sin_cos();
                let (sin_a3, cos_a3) = a3.sin_cos();
                let r1 = outer_radius + 1.0;
                let r2 = outer_radius + 6.0;
                let r3 = outer_radius + 2.0;
                let direction = XY::new(sin_a1, -cos_a1);
                doc.add(
                    line(center + r1 * direction, center + r2 * direction)
                        .attr("stroke", text_color.clone())
                        .attr("stroke-width", "0.3"),
                );
                let id = format!("month-{year}-{:02}", date.month());
                doc.add(
                    Element::new("path")
                        .attr("id", id.clone())
                        .attr(
                            "d",
                            format!(
                                "M{},{} a{},{} 0 0,1 {},{}",
                                crate::svg::num(center.x + r3 * sin_a1),
                                crate::svg::num(center.y - r3 * cos_a1),
                                crate::svg::num(r3),
                                crate::svg::num(r3),
                                crate::svg::num(r3 * (sin_a3 - sin_a1)),
                                crate::svg::num(r3 * (cos_a1 - cos_a3)),
                            ),
                        )
                        .attr("fill", "none")
                        .attr("stroke", "none"),
                );
                doc.add(
                    Element::new("text")
                        .attr("fill", text_color.clone())
                        .attr("text-anchor", "middle")
                        .attr("style", month_style.clone())
                        .child(
                            Element::new("textPath")
                                .attr("xlink:href", format!("#{id}"))
                                .attr("startOffset", crate::svg::num(0.5 * r3 * (a3 - a1)))
                                .text(ctx.poster.translator().month_full(date.month())),
                        ),
                );
            }
            if tracks.has_tracks_on(&date) {
                let length = tracks.day_length(&date);
                let special = tracks.tracks_on(&date).any(|t| t.special);
                let by_date = tracks.length_range_by_date();
                let color = ctx.color(by_date, length, special);
                let r2 = if by_date.upper() > 0.0 {
                    radius_range.lower() + radius_range.diameter() * length / by_date.upper()
                } else {
                    radius_range.upper()
                };
                doc.add(sector(center, a1, a2, radius_range.lower(), r2).attr("fill", color.hex()));
            }
            day += 1.0;
            date += Duration::days(1);
        }
    }

    /// Largest step in {1, 5, 10, 50} units that fits under the longest day,
    /// preferring one that gives at most five rings.
    fn ring_distance(units: Units, longest_day: f64) -> Option<f64> {
        let unit = match units {
            Units::Metric => 1000.0,
            Units::Imperial => METERS_PER_MILE,
        };
        let mut chosen = None;
        for step in RING_STEPS {
            let distance = step * unit;
            if longest_day < distance {
                continue;
            }
            chosen = Some(distance);
            if longest_day / distance <= 5.0 {
                break;
            }
        }
        chosen
    }

    fn draw_rings(&self, ctx: &DrawContext, doc: &mut SvgDocument, center: XY, radius_range: &ValueRange) {
        let upper = ctx.tracks().length_range_by_date().upper();
        let Some(step) = Self::ring_distance(ctx.poster.units, upper) else {
            return;
        };
        let mut distance = step;
        while distance < upper {
            let radius = radius_range.lower() + radius_range.diameter() * distance / upper;
            doc.add(
                circle(center, radius)
                    .attr("stroke", self.ring_color.hex())
                    .attr("stroke-opacity", "0.2")
                    .attr("fill", "none")
                    .attr("stroke-width", "0.3"),
            );
            distance += step;
        }
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .map_or(31, |last| last.day())
}

/// Annular sector between radii `r1` and `r2`, clockwise from `a1` to `a2`.
fn sector(center: XY, a1: f64, a2: f64, r1: f64, r2: f64) -> Element {
    let (sin_a1, cos_a1) = a1.sin_cos();
    let (sin_a2, cos_a2) = a2.sin_cos();
    let n = crate::svg::num;
    Element::new("path")
        .attr(
            "d",
            format!(
                "M{},{} l{},{} a{},{} 0 0,0 {},{} l{},{}",
                n(center.x + r1 * sin_a1),
                n(center.y - r1 * cos_a1),
                n((r2 - r1) * sin_a1),
                n((r1 - r2) * cos_a1),
                n(r2),
                n(r2),
                n(r2 * (sin_a2 - sin_a1)),
                n(r2 * (cos_a1 - cos_a2)),
                n((r1 - r2) * sin_a2),
                n((r2 - r1) * cos_a2),
            ),
        )
        .attr("stroke", "none")
}

impl TracksDrawer for CircularDrawer {
    fn name(&self) -> &'static str {
        "circular"
    }

    fn create_args(&self, cmd: Command) -> Command {
        cmd.next_help_heading("Circular Type Options")
            .arg(
                Arg::new("circular_rings")
                    .long("circular-rings")
                    .action(ArgAction::SetTrue)
                    .help("Draw distance rings."),
            )
            .arg(
                Arg::new("circular_ring_color")
                    .long("circular-ring-color")
                    .value_name("COLOR")
                    .default_value("darkgrey")
                    .help("Color of distance rings."),
            )
    }

    fn fetch_args(&mut self, matches: &ArgMatches) -> Result<(), PosterError> {
        self.rings = matches.get_flag("circular_rings");
        if let Some(color) = matches.get_one::<String>("circular_ring_color") {
            self.ring_color = color.parse()?;
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
        doc.add(rect(offset, size).attr("fill", ctx.colors.background.hex()));
        let years = ctx.tracks().years().years();
        if years.is_empty() {
            return Ok(());
        }
        let (_, (count_x, count_y)) = compute_grid(years.len(), size)
            .ok_or_else(|| PosterError::Render("Unable to compute grid.".to_string()))?;
        let cell_size = size * XY::new(1.0 / count_x as f64, 1.0 / count_y as f64);
        let margin = XY::new(
            if count_x <= 1 { 0.0 } else { 4.0 },
            if count_y <= 1 { 0.0 } else { 4.0 },
        );
        let sub_size = cell_size - 2.0 * margin;
        for (i, year) in years.into_iter().enumerate() {
            let cell = XY::new((i % count_x) as f64, (i / count_x) as f64);
            self.draw_year(ctx, doc, sub_size, offset + margin + cell_size * cell, year);
        }
        Ok(())
    }
    fn body_only(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawers::tests::{by_name, render};
    use crate::poster::tests::{poster_with, run};

    #[test]
    fn ring_step_keeps_at_most_five_rings() {
        assert_eq!(CircularDrawer::ring_distance(Units::Metric, 500.0), None);
        assert_eq!(CircularDrawer::ring_distance(Units::Metric, 4_000.0), Some(1_000.0));
        assert_eq!(CircularDrawer::ring_distance(Units::Metric, 21_000.0), Some(5_000.0));
        assert_eq!(CircularDrawer::ring_distance(Units::Metric, 42_195.0), Some(10_000.0));
        let miles = CircularDrawer::ring_distance(Units::Imperial, 30_000.0).unwrap();
        assert!((miles - 5.0 * METERS_PER_MILE).abs() < 1e-9);
        assert!(30_000.0 / miles <= 5.0);
    }

    #[test]
    fn one_sector_per_active_day_and_twelve_month_labels() {
        let poster = poster_with(vec![
            run(2024, 3, 15, 8, 90, "a.gpx"),
            run(2024, 3, 15, 17, 40, "b.gpx"),
            run(2024, 7, 2, 8, 40, "c.gpx"),
        ]);
        let doc = render(&poster, &CircularDrawer::default());
        let sectors: Vec<_> = by_name(&doc, "path")
            .into_iter()
            .filter(|p| p.get_attr("stroke") == Some("none") && p.get_attr("fill") != Some("none"))
            .collect();
        assert_eq!(sectors.len(), 2);
        assert_eq!(by_name(&doc, "textPath").len(), 12);
        assert!(by_name(&doc, "circle").is_empty());
    }

    #[test]
    fn rings_are_drawn_when_enabled() {
        let poster = poster_with(vec![run(2024, 3, 15, 8, 90, "a.gpx")]);
        let drawer = CircularDrawer::default().with_rings(Rgb::new(0xa9, 0xa9, 0xa9));
        let doc = render(&poster, &drawer);
        // 5.004 km longest day, 5 km step
        assert_eq!(by_name(&doc, "circle").len(), 1);
    }

    #[test]
    fn empty_dataset_renders_background_only() {
        let doc = render(&poster_with(Vec::new()), &CircularDrawer::default());
        assert!(by_name(&doc, "textPath").is_empty());
    }

    #[test]
    fn page_is_body_only_on_the_dark_palette() {
        let poster = poster_with(vec![run(2024, 3, 15, 8, 90, "a.gpx")]);
        let doc = render(&poster, &CircularDrawer::default());
        assert_eq!(doc.size(), XY::new(200.0, 200.0));
        assert_eq!(doc.elements()[0].get_attr("fill"), Some("#1a1a1a"));
        let texts: Vec<_> = by_name(&doc, "text")
            .into_iter()
            .filter_map(|t| t.text_content())
            .collect();
        assert!(texts.contains(&"2024"));
        assert!(!texts.contains(&"MY TRACKS"));
    }

    #[test]
    fn month_lengths() {
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(days_in_month(feb), 29);
        let dec = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(days_in_month(dec), 31);
    }
}
