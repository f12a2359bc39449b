// THEORY:
// The `heatmap` module turns a `ScoutSummary` into something a person can look
// at: an image the size of the camera frame, each bucket filled with a colour
// for how long visitors spent there relative to the busiest bucket.
//
// Buckets nobody visited are left dark so the visited area stands out, the same
// way the live visual tester dims inactive chunks.

use crate::core_modules::summary::{BucketGrid, ScoutSummary};
use crate::error::ScoutError;
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::Path;
use tracing::info;

/// Fill colour for buckets with no recorded visits.
pub const UNVISITED: Rgb<u8> = Rgb([24, 24, 24]);

/// Maps a normalised heat in `[0, 1]` onto a blue -> yellow -> red ramp.
pub fn heat_color(heat: f32) -> Rgb<u8> {
    let heat = if heat.is_finite() { heat.clamp(0.0, 1.0) } else { 0.0 };

    let (r, g, b) = if heat <= 0.5 {
        // Blue to yellow
        let ratio = heat / 0.5;
        (255.0 * ratio, 255.0 * ratio, 255.0 * (1.0 - ratio))
    } else {
        // Yellow to red
        let ratio = (heat - 0.5) / 0.5;
        (255.0, 255.0 * (1.0 - ratio), 0.0)
    };

    Rgb([r.round() as u8, g.round() as u8, b.round() as u8])
}

/// Renders `summary` at the frame resolution of `grid`.
pub fn render(summary: &ScoutSummary, grid: &BucketGrid) -> RgbImage {
    let width = grid.frame_width.max(0) as u32;
    let height = grid.frame_height.max(0) as u32;
    let bucket_w = grid.bucket_width().max(1) as u32;
    let bucket_h = grid.bucket_height().max(1) as u32;
    let hottest = summary.max_visit_time();

    ImageBuffer::from_fn(width, height, |x, y| {
        let col = (x / bucket_w) as usize;
        let row = (y / bucket_h) as usize;

        let visit_time = summary
            .visit_time_buckets
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .unwrap_or(0.0);

        if visit_time <= 0.0 || hottest <= 0.0 {
            UNVISITED
        } else {
            heat_color(visit_time / hottest)
        }
    })
}

/// Renders `summary` and writes it to `path`. The format follows the file extension.
pub fn save(summary: &ScoutSummary, grid: &BucketGrid, path: &Path) -> Result<(), ScoutError> {
    render(summary, grid).save(path)?;
    info!(path = %path.display(), owner = %summary.owner_id, "heatmap written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ramp_endpoints() {
        assert_eq!(heat_color(0.0), Rgb([0, 0, 255]));
        assert_eq!(heat_color(0.5), Rgb([255, 255, 0]));
        assert_eq!(heat_color(1.0), Rgb([255, 0, 0]));
        assert_eq!(heat_color(f32::NAN), heat_color(0.0));
        assert_eq!(heat_color(7.0), heat_color(1.0));
    }

    #[test]
    fn image_matches_the_frame_and_buckets() {
        let grid = BucketGrid::new(200, 100, 4, 2);
        let mut summary = ScoutSummary::for_grid(Uuid::nil(), &grid);
        summary.visit_time_buckets[1][3] = 4.0;
        summary.visit_time_buckets[0][0] = 2.0;

        let img = render(&summary, &grid);

        assert_eq!(img.dimensions(), (200, 100));
        // Row 1, column 3 is the hottest bucket.
        assert_eq!(*img.get_pixel(175, 75), heat_color(1.0));
        assert_eq!(*img.get_pixel(10, 10), heat_color(0.5));
        assert_eq!(*img.get_pixel(75, 25), UNVISITED);
    }

    #[test]
    fn empty_summary_renders_dark() {
        let grid = BucketGrid::new(40, 20, 2, 2);
        let summary = ScoutSummary::for_grid(Uuid::nil(), &grid);

        assert!(render(&summary, &grid).pixels().all(|p| *p == UNVISITED));
    }

    #[test]
    fn saves_a_png() {
        let grid = BucketGrid::new(40, 20, 2, 2);
        let summary = ScoutSummary::for_grid(Uuid::nil(), &grid);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.png");

        save(&summary, &grid, &path).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (40, 20));
    }
}
