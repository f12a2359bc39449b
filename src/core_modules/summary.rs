// THEORY:
// The `summary` module holds the long-lived output of the scout: a coarse
// occupancy heatmap per sensor. The frame is divided into a fixed grid of
// buckets (`BucketGrid`). Each bucket accumulates how long visitors spent in it
// and how many distinct interactions passed through it.
//
// Key architectural principles:
// 1.  **Fixed Shape**: The grid dimensions are part of the deployment, not the
//     data. A summary built for one grid cannot be folded into another, and
//     `check_shape` refuses to try.
// 2.  **Row-Major**: Buckets are indexed `[row][column]`, i.e. `[y][x]`, so a
//     summary serializes in the same order an image is scanned.
// 3.  **Grow Only**: Counters only ever increase. The one exception is an
//     explicit `clear`, which an operator uses to start a fresh survey.

use crate::core_modules::geometry::Aabb;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The bucket layout used to summarise a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketGrid {
    /// Width of the camera frame in pixels.
    pub frame_width: i32,
    /// Height of the camera frame in pixels.
    pub frame_height: i32,
    /// Number of buckets across the frame.
    pub columns: usize,
    /// Number of buckets down the frame.
    pub rows: usize,
}

impl BucketGrid {
    pub fn new(frame_width: i32, frame_height: i32, columns: usize, rows: usize) -> Self {
        Self {
            frame_width,
            frame_height,
            columns,
            rows,
        }
    }

    /// Width of a single bucket in pixels. Remainder pixels on the right are not covered.
    pub fn bucket_width(&self) -> i32 {
        self.frame_width / self.columns.max(1) as i32
    }

    /// Height of a single bucket in pixels. Remainder pixels at the bottom are not covered.
    pub fn bucket_height(&self) -> i32 {
        self.frame_height / self.rows.max(1) as i32
    }

    /// The pixel box covered by the bucket at `(row, col)`.
    pub fn bucket_aabb(&self, row: usize, col: usize) -> Aabb {
        Aabb::from_index(
            col as i32,
            row as i32,
            self.bucket_width(),
            self.bucket_height(),
        )
    }
}

impl Default for BucketGrid {
    fn default() -> Self {
        Self::new(1920, 1080, 20, 20)
    }
}

/// Accumulated occupancy of one sensor's field of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutSummary {
    /// The sensor this summary belongs to.
    pub owner_id: Uuid,
    /// Number of interactions folded into this summary.
    pub visitor_count: i64,
    /// Seconds of visitor presence per bucket, `[row][column]`.
    pub visit_time_buckets: Vec<Vec<f32>>,
    /// Number of interactions that touched each bucket, `[row][column]`.
    pub visitor_buckets: Vec<Vec<i32>>,
}

impl ScoutSummary {
    /// An empty summary with a `rows` by `cols` bucket grid.
    pub fn new(owner_id: Uuid, rows: usize, cols: usize) -> Self {
        Self {
            owner_id,
            visitor_count: 0,
            visit_time_buckets: vec![vec![0.0; cols]; rows],
            visitor_buckets: vec![vec![0; cols]; rows],
        }
    }

    pub fn for_grid(owner_id: Uuid, grid: &BucketGrid) -> Self {
        Self::new(owner_id, grid.rows, grid.columns)
    }

    pub fn rows(&self) -> usize {
        self.visit_time_buckets.len()
    }

    pub fn columns(&self) -> usize {
        self.visit_time_buckets.first().map_or(0, Vec::len)
    }

    /// Fails unless both bucket arrays are exactly `grid.rows` by `grid.columns`.
    pub fn check_shape(&self, grid: &BucketGrid) -> Result<(), StoreError> {
        let times_ok = fits_grid(&self.visit_time_buckets, grid);
        let visitors_ok = fits_grid(&self.visitor_buckets, grid);

        if times_ok && visitors_ok {
            Ok(())
        } else {
            Err(StoreError::GridMismatch {
                rows: grid.rows,
                cols: grid.columns,
                actual_rows: self.rows(),
                actual_cols: self.columns(),
            })
        }
    }

    /// The largest visit time held by any bucket.
    pub fn max_visit_time(&self) -> f32 {
        self.visit_time_buckets
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f32::max)
    }

    /// Zeroes every counter, keeping the grid shape and owner.
    pub fn clear(&mut self) {
        self.visitor_count = 0;
        self.visit_time_buckets
            .iter_mut()
            .flatten()
            .for_each(|t| *t = 0.0);
        self.visitor_buckets
            .iter_mut()
            .flatten()
            .for_each(|v| *v = 0);
    }
}

fn fits_grid<T>(buckets: &[Vec<T>], grid: &BucketGrid) -> bool {
    buckets.len() == grid.rows && buckets.iter().all(|row| row.len() == grid.columns)
}
