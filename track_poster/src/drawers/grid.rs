use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::{compute_grid, project, LatLngBounds, XY};
use crate::svg::{polyline, SvgDocument};
use crate::track::Track;
use crate::PosterError;

/// One cell per track, newest first, every track drawn at the same scale.
#[derive(Clone, Copy, Debug, Default)]
pub struct GridDrawer;

impl TracksDrawer for GridDrawer {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        size: XY,
        offset: XY,
    ) -> Result<(), PosterError> {
        let tracks = ctx.tracks().tracks();
        let span = tracks
            .iter()
            .filter_map(|t| t.bbox())
            .map(|b| b.projected_span())
            .fold(XY::default(), |acc, s| XY::new(acc.x.max(s.x), acc.y.max(s.y)));
        draw_cells(ctx, doc, size, offset, |t| {
            t.bbox().map(|b| b.grown_to_projected_span(span))
        })
    }
}

/// Lay tracks out on a near-square grid and project each into its cell
/// through the box returned by `bbox_of`.
pub(super) fn draw_cells(
    ctx: &DrawContext,
    doc: &mut SvgDocument,
    size: XY,
    mut offset: XY,
    bbox_of: impl Fn(&Track) -> Option<LatLngBounds>,
) -> Result<(), PosterError> {
    let tracks = ctx.tracks().tracks();
    if tracks.is_empty() {
        return Err(PosterError::Render("No tracks to draw".to_string()));
    }
    let (cell_size, (count_x, count_y)) = compute_grid(tracks.len(), size)
        .ok_or_else(|| PosterError::Render("Unable to compute grid.".to_string()))?;
    let spacing_x = if count_x <= 1 {
        0.0
    } else {
        (size.x - cell_size * count_x as f64) / (count_x - 1) as f64
    };
    let spacing_y = if count_y <= 1 {
        0.0
    } else {
        (size.y - cell_size * count_y as f64) / (count_y - 1) as f64
    };
    offset.x += (size.x - count_x as f64 * cell_size - (count_x as f64 - 1.0) * spacing_x) / 2.0;
    offset.y += (size.y - count_y as f64 * cell_size - (count_y as f64 - 1.0) * spacing_y) / 2.0;
    let cell = XY::new(cell_size, cell_size);
    for (index, track) in tracks.iter().rev().enumerate() {
        let p = XY::new((index % count_x) as f64, (index / count_x) as f64)
            * XY::new(cell_size + spacing_x, cell_size + spacing_y);
        draw_track(ctx, doc, track, bbox_of(track), 0.9 * cell, offset + 0.05 * cell + p);
    }
    Ok(())
}

fn draw_track(
    ctx: &DrawContext,
    doc: &mut SvgDocument,
    track: &Track,
    bbox: Option<LatLngBounds>,
    size: XY,
    offset: XY,
) {
    let Some(bbox) = bbox else {
        return;
    };
    let poster = ctx.poster;
    let color = ctx.special_color(ctx.tracks().length_range_by_date(), track.length, track.special);
    let title = format!(
        "{} {}",
        track.start_time_local.format("%Y-%m-%d"),
        poster.format_distance(track.length)
    );
    for line in project(&bbox, size, offset, &track.polylines) {
        doc.add(
            polyline(&line)
                .attr("stroke", color.hex())
                .attr("stroke-width", "0.5")
                .title(title.clone())
                .desc(track.run_id.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawers::tests::{by_name, render, title_of, y_extent};
    use crate::poster::tests::{poster_with, run};

    #[test]
    fn no_tracks_is_an_error() {
        let poster = poster_with(Vec::new());
        let err = poster.render(&GridDrawer).unwrap_err();
        assert_eq!(err.to_string(), "No tracks to draw");
    }

    #[test]
    fn one_polyline_per_track_with_tooltips() {
        let poster = poster_with(vec![
            run(2024, 3, 15, 8, 90, "a.gpx"),
            run(2024, 3, 17, 8, 40, "b.gpx"),
        ]);
        let doc = render(&poster, &GridDrawer);
        let lines = by_name(&doc, "polyline");
        assert_eq!(lines.len(), 2);
        // newest track takes the first cell
        assert_eq!(title_of(lines[0]), Some("2024-03-17 2.2 km"));
        assert_eq!(title_of(lines[1]), Some("2024-03-15 5.0 km"));
        let desc: Vec<_> = lines[1].children().iter().filter(|c| c.name() == "desc").collect();
        assert_eq!(desc.len(), 1);
    }

    #[test]
    fn common_scale_keeps_relative_sizes() {
        let poster = poster_with(vec![
            run(2024, 3, 15, 8, 90, "long.gpx"),
            run(2024, 3, 17, 8, 30, "short.gpx"),
        ]);
        let doc = render(&poster, &GridDrawer);
        let lines = by_name(&doc, "polyline");
        let (short, long) = (y_extent(lines[0]), y_extent(lines[1]));
        assert!((long / short - 3.0).abs() < 0.05, "{long} {short}");
    }
}
