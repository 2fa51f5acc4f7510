use ndarray::{Array4, ArrayView4, Axis};

use crate::{Result, WganErr, config::OutputRange};

/// An in-memory set of single channel images.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    images: Array4<f32>,
}

impl ImageDataset {
    /// Creates a new dataset from already normalized images.
    ///
    /// # Errors
    /// Fails if `images` is empty or isn't shaped `[n, height, width, 1]`.
    pub fn new(images: Array4<f32>) -> Result<Self> {
        let (n, h, w, c) = images.dim();

        if c != 1 {
            return Err(WganErr::Dataset(format!(
                "expected single channel images, got {c} channels"
            )));
        }

        if n == 0 || h == 0 || w == 0 {
            return Err(WganErr::Dataset(format!(
                "dataset must not be empty, got {n} images of {h}x{w}"
            )));
        }

        Ok(Self { images })
    }

    /// Creates a new dataset from raw row-major `u8` pixels, mapping them into `range`.
    ///
    /// # Arguments
    /// * `shape` - The `(n, height, width)` of the pixel buffer.
    /// * `pixels` - `n * height * width` grayscale pixels.
    /// * `range` - The value range the images are normalized into.
    pub fn from_pixels(
        shape: (usize, usize, usize),
        pixels: &[u8],
        range: OutputRange,
    ) -> Result<Self> {
        let (n, h, w) = shape;
        let values = pixels.iter().map(|&p| range.from_pixel(p)).collect();
        let images = Array4::from_shape_vec((n, h, w, 1), values)?;
        Self::new(images)
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `(height, width)` of every image.
    pub fn image_shape(&self) -> (usize, usize) {
        let (_, h, w, _) = self.images.dim();
        (h, w)
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.images.view()
    }

    pub(super) fn into_inner(self) -> Array4<f32> {
        self.images
    }
}
