use std::{
    fs,
    io::{self, Cursor},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use image::{GrayImage, ImageFormat, RgbImage};
use log::{debug, warn};

use super::{ArtifactSink, Checkpoint, LossReport, plot};
use crate::{Result, WganErr, config::TrainingConfig};

const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Persists artifacts as files under the run's asset and checkpoint directories.
#[derive(Debug, Clone)]
pub struct FsSink {
    assets_dir: PathBuf,
    ckpt_dir: PathBuf,
    name: String,
    dataset: String,
    retries: usize,
    backoff: Duration,
}

impl FsSink {
    /// Creates a new `FsSink`, directories are created on the first write.
    ///
    /// # Arguments
    /// * `assets_dir` - Where grids and loss curves go.
    /// * `ckpt_dir` - Where checkpoints go.
    /// * `name` - The run name checkpoints are named after.
    /// * `dataset` - The dataset name images are named after.
    pub fn new(
        assets_dir: impl Into<PathBuf>,
        ckpt_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            ckpt_dir: ckpt_dir.into(),
            name: name.into(),
            dataset: dataset.into(),
            retries: 0,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(
            config.assets_dir(),
            config.ckpt_dir(),
            config.name.clone(),
            config.dataset.clone(),
        )
        .with_retries(config.artifact_retries, DEFAULT_BACKOFF)
    }

    /// Sets how many times, and how far apart, transiently failing writes are retried.
    pub fn with_retries(mut self, retries: usize, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// `<assets_dir>/<dataset>-e<epoch>.png`, for a 1-based epoch.
    pub fn grid_path(&self, epoch: usize) -> PathBuf {
        self.assets_dir
            .join(format!("{}-e{epoch:03}.png", self.dataset))
    }

    /// `<ckpt_dir>/<name>-e<epoch>.ckpt`, for a 1-based epoch.
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.ckpt_dir.join(Checkpoint::file_name(&self.name, epoch))
    }

    /// `<assets_dir>/<dataset>-losses.png`, the report sits next to it as `.json`.
    pub fn loss_curve_path(&self) -> PathBuf {
        self.assets_dir.join(format!("{}-losses.png", self.dataset))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        retry_write(path, self.retries, self.backoff, || {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(path, bytes)
        })?;

        debug!(bytes = bytes.len(); "wrote {}", path.display());
        Ok(())
    }
}

impl ArtifactSink for FsSink {
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.checkpoint_path(checkpoint.epoch);
        self.write(&path, &checkpoint.to_bytes()?)?;
        Ok(path)
    }

    fn save_grid(&mut self, epoch: usize, grid: &GrayImage) -> Result<PathBuf> {
        let path = self.grid_path(epoch);
        self.write(&path, &encode_png(grid, &path)?)?;
        Ok(path)
    }

    fn save_loss_curve(&mut self, report: &LossReport) -> Result<PathBuf> {
        let path = self.loss_curve_path();
        let curve = plot::render_loss_curve(report, plot::WIDTH, plot::HEIGHT);
        self.write(&path, &encode_png(&curve, &path)?)?;

        let json_path = path.with_extension("json");
        let json = serde_json::to_vec_pretty(report).map_err(|e| WganErr::ArtifactWrite {
            path: json_path.clone(),
            attempts: 0,
            source: io::Error::other(e),
        })?;
        self.write(&json_path, &json)?;

        Ok(path)
    }
}

trait PngEncode {
    fn encode(&self, out: &mut Cursor<&mut Vec<u8>>) -> image::ImageResult<()>;
}

impl PngEncode for GrayImage {
    fn encode(&self, out: &mut Cursor<&mut Vec<u8>>) -> image::ImageResult<()> {
        self.write_to(out, ImageFormat::Png)
    }
}

impl PngEncode for RgbImage {
    fn encode(&self, out: &mut Cursor<&mut Vec<u8>>) -> image::ImageResult<()> {
        self.write_to(out, ImageFormat::Png)
    }
}

fn encode_png<I: PngEncode>(img: &I, path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.encode(&mut Cursor::new(&mut bytes))
        .map_err(|e| WganErr::ArtifactWrite {
            path: path.to_path_buf(),
            attempts: 0,
            source: io::Error::other(e),
        })?;

    Ok(bytes)
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Runs `write` until it succeeds, retrying transient failures up to `retries` times.
///
/// # Errors
/// `WganErr::ArtifactWrite` with the last failure once retries are exhausted or on the first
/// non transient failure.
pub(crate) fn retry_write<F>(path: &Path, retries: usize, backoff: Duration, mut write: F) -> Result<()>
where
    F: FnMut() -> io::Result<()>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match write() {
            Ok(()) => return Ok(()),
            Err(e) if is_transient(&e) && attempts <= retries => {
                warn!(attempt = attempts; "transient failure writing {}: {e}, retrying", path.display());
                thread::sleep(backoff * attempts as u32);
            }
            Err(source) => {
                return Err(WganErr::ArtifactWrite {
                    path: path.to_path_buf(),
                    attempts,
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{LossHistory, LossRecord};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wgan-sink-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn transient_failures_are_retried() {
        let mut calls = 0;

        let result = retry_write(Path::new("x"), 3, Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn retries_are_bounded() {
        let mut calls = 0;

        let result = retry_write(Path::new("x"), 2, Duration::ZERO, || {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::TimedOut))
        });

        assert!(matches!(result, Err(WganErr::ArtifactWrite { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;

        let result = retry_write(Path::new("x"), 5, Duration::ZERO, || {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });

        assert!(matches!(result, Err(WganErr::ArtifactWrite { attempts: 1, .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn artifacts_land_under_their_directories() {
        let root = temp_dir("paths");
        let mut sink = FsSink::new(root.join("assets"), root.join("ckpt"), "wgan", "digits");

        let ckpt = Checkpoint {
            step: 10,
            epoch: 2,
            generator: vec![0.5; 4],
            running_stats: Vec::new(),
        };
        let ckpt_path = sink.save_checkpoint(&ckpt).unwrap();
        let grid_path = sink.save_grid(2, &GrayImage::new(6, 4)).unwrap();

        let mut history = LossHistory::default();
        history.push(LossRecord {
            step: 0,
            epoch: 0,
            critic: -0.1,
            generator: 0.1,
        });
        let report = LossReport {
            dataset: "digits".into(),
            steps: 10,
            elapsed_secs: 1.5,
            history,
        };
        let curve_path = sink.save_loss_curve(&report).unwrap();

        assert_eq!(ckpt_path, root.join("ckpt/wgan-e002.ckpt"));
        assert_eq!(grid_path, root.join("assets/digits-e002.png"));
        assert_eq!(curve_path, root.join("assets/digits-losses.png"));
        assert_eq!(Checkpoint::load(&ckpt_path).unwrap(), ckpt);
        assert_eq!(image::open(&grid_path).unwrap().to_luma8().dimensions(), (6, 4));

        let json = fs::read_to_string(root.join("assets/digits-losses.json")).unwrap();
        let decoded: LossReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, report);

        fs::remove_dir_all(root).unwrap();
    }
}
