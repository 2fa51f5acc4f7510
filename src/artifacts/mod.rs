mod checkpoint;
mod grid;
mod plot;
mod sink;

pub use checkpoint::Checkpoint;
pub use grid::render_grid;
pub use plot::{LossReport, render_loss_curve};
pub use sink::FsSink;

use std::path::PathBuf;

use image::GrayImage;

use crate::Result;

/// Where a run persists what it produces.
///
/// Every method returns the location written to.
pub trait ArtifactSink {
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf>;

    /// Persists the visualization grid of a 1-based epoch.
    fn save_grid(&mut self, epoch: usize, grid: &GrayImage) -> Result<PathBuf>;

    /// Persists the loss curve and the report it was drawn from.
    fn save_loss_curve(&mut self, report: &LossReport) -> Result<PathBuf>;
}
