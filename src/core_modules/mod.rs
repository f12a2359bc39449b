pub mod geometry;
pub mod heatmap;
pub mod interaction;
pub mod scene;
pub mod shaft;
pub mod simplify;
pub mod summary;
pub mod waypoint;
