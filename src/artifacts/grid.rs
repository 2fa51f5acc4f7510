use image::{GrayImage, Luma};
use ndarray::ArrayView4;

use crate::{Result, WganErr, config::OutputRange};

/// Tiles `block * block` images into one grayscale grid, row by row.
///
/// # Arguments
/// * `images` - Exactly `block * block` images shaped `[n, height, width, 1]`.
/// * `block` - The amount of tiles on each side of the grid.
/// * `range` - The value range the images are in, mapped back to `[0, 255]`.
///
/// # Returns
/// An image `block * width` pixels wide and `block * height` pixels tall.
pub fn render_grid(images: ArrayView4<f32>, block: usize, range: OutputRange) -> Result<GrayImage> {
    let (n, h, w, c) = images.dim();

    if n != block * block || c != 1 {
        return Err(WganErr::Dataset(format!(
            "a {block}x{block} grid needs {} single channel images, got {n} with {c} channels",
            block * block
        )));
    }

    let mut grid = GrayImage::new((block * w) as u32, (block * h) as u32);

    for (i, tile) in images.outer_iter().enumerate() {
        let (x0, y0) = ((i % block) * w, (i / block) * h);

        for ((y, x, _), &value) in tile.indexed_iter() {
            let pixel = Luma([range.to_pixel(value)]);
            grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, pixel);
        }
    }

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;

    #[test]
    fn grid_dimensions_follow_the_block_size() {
        for block in 1..4 {
            let images = Array4::zeros((block * block, 3, 5, 1));

            let grid = render_grid(images.view(), block, OutputRange::Tanh).unwrap();

            assert_eq!(grid.dimensions(), ((block * 5) as u32, (block * 3) as u32));
        }
    }

    #[test]
    fn tiles_are_placed_row_by_row_and_unscaled() {
        let images = Array4::from_shape_fn((4, 2, 2, 1), |(i, _, _, _)| match i {
            0 => -1.,
            1 => 1.,
            2 => 0.,
            _ => 5.,
        });

        let grid = render_grid(images.view(), 2, OutputRange::Tanh).unwrap();

        assert_eq!(grid.get_pixel(0, 0).0, [0]);
        assert_eq!(grid.get_pixel(3, 1).0, [255]);
        assert_eq!(grid.get_pixel(1, 2).0, [128]);
        assert_eq!(grid.get_pixel(2, 3).0, [255]);
    }

    #[test]
    fn wrong_tile_count_is_rejected() {
        let images = Array4::zeros((3, 2, 2, 1));

        assert!(render_grid(images.view(), 2, OutputRange::Sigmoid).is_err());
    }
}
