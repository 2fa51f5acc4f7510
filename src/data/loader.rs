use ndarray::{Array4, Axis, s};
use rand::{rngs::StdRng, seq::SliceRandom};

use super::{DataSource, Fetch, ImageDataset};

/// Hands out borrowed batches of an owned dataset, reshuffling it every epoch.
///
/// Only the visiting order is shuffled, a shuffled batch is gathered into a reused buffer.
#[derive(Debug, Clone)]
pub struct DataLoader {
    images: Array4<f32>,
    order: Vec<usize>,
    batch: Array4<f32>,
    batch_size: usize,
    shuffle: bool,
    cursor: usize,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The images to iterate over.
    /// * `batch_size` - The amount of images per batch, the last one of an epoch may be shorter.
    /// * `shuffle` - Whether every epoch visits the images in a new random order.
    pub fn new(dataset: ImageDataset, batch_size: usize, shuffle: bool) -> Self {
        let images = dataset.into_inner();
        let (n, h, w, c) = images.dim();

        Self {
            images,
            order: (0..n).collect(),
            batch: Array4::zeros((0, h, w, c)),
            batch_size: batch_size.max(1),
            shuffle,
            cursor: 0,
        }
    }
}

impl DataSource for DataLoader {
    fn begin_epoch(&mut self, rng: &mut StdRng) {
        self.cursor = 0;

        if self.shuffle {
            self.order.shuffle(rng);
        }
    }

    fn next_batch(&mut self) -> Fetch<'_> {
        let len = self.len();
        if self.cursor >= len {
            return Fetch::EndOfEpoch;
        }

        let start = self.cursor;
        let end = (start + self.batch_size).min(len);
        self.cursor = end;

        if !self.shuffle {
            return Fetch::Batch(self.images.slice(s![start..end, .., .., ..]));
        }

        let (_, h, w, c) = self.images.dim();
        let n = end - start;
        if self.batch.len_of(Axis(0)) != n {
            self.batch = Array4::zeros((n, h, w, c));
        }

        for (mut dst, &i) in self.batch.outer_iter_mut().zip(&self.order[start..end]) {
            dst.assign(&self.images.index_axis(Axis(0), i));
        }

        Fetch::Batch(self.batch.view())
    }

    fn image_shape(&self) -> (usize, usize) {
        let (_, h, w, _) = self.images.dim();
        (h, w)
    }

    fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }
}
