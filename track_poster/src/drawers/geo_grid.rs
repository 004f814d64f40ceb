use crate::drawers::grid::draw_cells;
use crate::drawers::{DrawContext, TracksDrawer};
use crate::geometry::XY;
use crate::svg::SvgDocument;
use crate::PosterError;

/// Grid of route shapes, each track fitted to its own bounding box.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeoGridDrawer;

impl TracksDrawer for GeoGridDrawer {
    fn name(&self) -> &'static str {
        "geogrid"
    }

    fn draw(
        &self,
        ctx: &DrawContext,
        doc: &mut SvgDocument,
        size: XY,
        offset: XY,
    ) -> Result<(), PosterError> {
        draw_cells(ctx, doc, size, offset, |t| t.bbox())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawers::tests::{by_name, render, y_extent};
    use crate::poster::tests::{poster_with, run};

    #[test]
    fn every_track_fills_its_cell() {
        let poster = poster_with(vec![
            run(2024, 3, 15, 8, 90, "long.gpx"),
            run(2024, 3, 17, 8, 30, "short.gpx"),
        ]);
        let doc = render(&poster, &GeoGridDrawer);
        let lines = by_name(&doc, "polyline");
        assert_eq!(lines.len(), 2);
        let (a, b) = (y_extent(lines[0]), y_extent(lines[1]));
        assert!((a - b).abs() < 1e-3, "{a} {b}");
    }

    #[test]
    fn empty_poster_fails() {
        assert!(poster_with(Vec::new()).render(&GeoGridDrawer).is_err());
    }
}
