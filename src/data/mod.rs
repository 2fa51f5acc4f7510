mod dataset;
mod loader;
pub mod mnist;

pub use dataset::ImageDataset;
pub use loader::DataLoader;

use ndarray::ArrayView4;
use rand::rngs::StdRng;

/// What a data source hands out when asked for the next batch.
#[derive(Debug)]
pub enum Fetch<'a> {
    /// Images shaped `[batch, height, width, 1]`, normalized into the run's output range.
    Batch(ArrayView4<'a, f32>),
    /// Every sample was already handed out this epoch.
    EndOfEpoch,
}

/// A blocking supplier of real image batches.
pub trait DataSource {
    /// Rewinds the source, reshuffling its samples with `rng`.
    fn begin_epoch(&mut self, rng: &mut StdRng);

    /// Returns the next batch of this epoch or `Fetch::EndOfEpoch` once it's exhausted.
    fn next_batch(&mut self) -> Fetch<'_>;

    /// The `(height, width)` of every image.
    fn image_shape(&self) -> (usize, usize);

    /// The amount of samples in an epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
