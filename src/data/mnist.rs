//! Reader for the IDX image files the MNIST family of datasets ships in.

use std::{fs, path::Path};

use super::ImageDataset;
use crate::{Result, WganErr, config::OutputRange};

const IMAGES_MAGIC: u32 = 0x0000_0803;
const HEADER_LEN: usize = 16;

/// The training images file expected inside every dataset directory.
pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";

/// Loads `<data_dir>/<dataset>/train-images-idx3-ubyte`, normalizing it into `range`.
pub fn load<P: AsRef<Path>>(data_dir: P, dataset: &str, range: OutputRange) -> Result<ImageDataset> {
    let path = data_dir.as_ref().join(dataset).join(TRAIN_IMAGES);
    let bytes = fs::read(&path).map_err(|e| {
        WganErr::Dataset(format!("couldn't read {}: {e}", path.display()))
    })?;

    parse_images(&bytes, range)
}

/// Parses an in-memory IDX3 image file.
pub fn parse_images(bytes: &[u8], range: OutputRange) -> Result<ImageDataset> {
    if bytes.len() < HEADER_LEN {
        return Err(WganErr::Dataset(format!(
            "idx file too short for its header, got {} bytes",
            bytes.len()
        )));
    }

    let field = |i: usize| {
        let start = i * 4;
        u32::from_be_bytes([bytes[start], bytes[start + 1], bytes[start + 2], bytes[start + 3]])
    };

    let magic = field(0);
    if magic != IMAGES_MAGIC {
        return Err(WganErr::Dataset(format!(
            "bad idx magic number {magic:#010x}, expected {IMAGES_MAGIC:#010x}"
        )));
    }

    let (n, rows, cols) = (field(1) as usize, field(2) as usize, field(3) as usize);
    let pixels = &bytes[HEADER_LEN..];
    let expected = n
        .checked_mul(rows)
        .and_then(|v| v.checked_mul(cols))
        .ok_or_else(|| {
            WganErr::Dataset(format!("idx header describes too many pixels, {n} images of {rows}x{cols}"))
        })?;

    if pixels.len() != expected {
        return Err(WganErr::Dataset(format!(
            "idx header describes {n} images of {rows}x{cols} ({expected} bytes), got {} bytes",
            pixels.len()
        )));
    }

    ImageDataset::from_pixels((n, rows, cols), pixels, range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for field in [IMAGES_MAGIC, n, rows, cols] {
            bytes.extend(field.to_be_bytes());
        }
        bytes.extend(pixels);
        bytes
    }

    #[test]
    fn parses_images() {
        let bytes = idx(2, 2, 3, &[0, 255, 0, 255, 0, 255, 10, 20, 30, 40, 50, 60]);

        let ds = parse_images(&bytes, OutputRange::Sigmoid).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.image_shape(), (2, 3));
        assert_eq!(ds.view()[[0, 0, 1, 0]], 1.);
        assert_eq!(ds.view()[[1, 1, 2, 0]], 60. / 255.);
    }

    #[test]
    fn rejects_bad_headers_and_truncated_data() {
        let mut bad_magic = idx(1, 1, 1, &[0]);
        bad_magic[3] = 0x01;

        assert!(matches!(parse_images(&bad_magic, OutputRange::Tanh), Err(WganErr::Dataset(_))));
        assert!(matches!(
            parse_images(&idx(2, 2, 2, &[0; 5]), OutputRange::Tanh),
            Err(WganErr::Dataset(_))
        ));
        assert!(matches!(parse_images(&[0; 4], OutputRange::Tanh), Err(WganErr::Dataset(_))));
        assert!(matches!(
            parse_images(&idx(u32::MAX, u32::MAX, u32::MAX, &[]), OutputRange::Tanh),
            Err(WganErr::Dataset(_))
        ));
    }

    #[test]
    fn missing_file_is_a_dataset_error() {
        let dir = std::env::temp_dir().join("wgan-mnist-missing");

        assert!(matches!(
            load(&dir, "digits", OutputRange::Tanh),
            Err(WganErr::Dataset(_))
        ));
    }
}
