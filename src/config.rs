use std::{
    fs,
    path::{Path, PathBuf},
};

use machine_learning::arch::activations::ActFn;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::{Result, WganErr};

/// The hyperparameters and locations of a single training run.
///
/// Every field has a default, so a run file only needs to list what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Names the output directories and checkpoint files.
    pub name: String,
    /// The dataset identifier, `digits` or `fashion` for the MNIST family.
    #[serde(alias = "mnist-type")]
    pub dataset: String,
    /// Run files may spell it as a string.
    #[serde(deserialize_with = "number_or_string")]
    pub epochs: usize,
    pub batch_size: usize,
    pub z_dim: usize,
    /// The generator is updated once every `critic_update_ratio` steps.
    pub critic_update_ratio: u64,
    pub print_every: u64,
    pub save_every: usize,
    /// The visualization grid is `val_block_size` tiles on each side.
    pub val_block_size: usize,
    /// Critic parameters are clamped to `[-clip_bound, clip_bound]` after every update.
    pub clip_bound: f32,
    pub optimizer: OptimizerConfig,
    pub output_range: OutputRange,
    pub network: NetworkConfig,
    pub seed: Option<u64>,
    pub data_dir: PathBuf,
    pub assets_dir: Option<PathBuf>,
    pub ckpt_dir: Option<PathBuf>,
    /// How many times a transiently failing artifact write is retried.
    pub artifact_retries: usize,
    /// A generator checkpoint to start from.
    pub resume: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            name: "wgan".into(),
            dataset: "digits".into(),
            epochs: 1,
            batch_size: 128,
            z_dim: 100,
            critic_update_ratio: 5,
            print_every: 30,
            save_every: 1,
            val_block_size: 10,
            clip_bound: 0.01,
            optimizer: OptimizerConfig::default(),
            output_range: OutputRange::Tanh,
            network: NetworkConfig::default(),
            seed: None,
            data_dir: PathBuf::from("data_set"),
            assets_dir: None,
            ckpt_dir: None,
            artifact_retries: 3,
            resume: None,
        }
    }
}

impl TrainingConfig {
    /// Where images and loss curves go, `assets/<name>` unless overridden.
    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir
            .clone()
            .unwrap_or_else(|| Path::new("assets").join(&self.name))
    }

    /// Where checkpoints go, `checkpoints/<name>` unless overridden.
    pub fn ckpt_dir(&self) -> PathBuf {
        self.ckpt_dir
            .clone()
            .unwrap_or_else(|| Path::new("checkpoints").join(&self.name))
    }

    /// The amount of samples in the fixed visualization latent batch.
    pub fn val_size(&self) -> usize {
        self.val_block_size * self.val_block_size
    }

    /// Checks every hyperparameter, failing on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("z_dim", self.z_dim),
            ("save_every", self.save_every),
            ("val_block_size", self.val_block_size),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }

        if self.critic_update_ratio < 1 {
            return Err(invalid("critic_update_ratio must be at least 1".into()));
        }

        if self.print_every == 0 {
            return Err(invalid("print_every must be greater than 0".into()));
        }

        if !(self.clip_bound.is_finite() && self.clip_bound > 0.) {
            return Err(invalid(format!(
                "clip_bound must be a positive number, got {}",
                self.clip_bound
            )));
        }

        if self.name.is_empty() || self.dataset.is_empty() {
            return Err(invalid("name and dataset must not be empty".into()));
        }

        self.optimizer.validate()?;
        self.network.validate()
    }
}

/// The optimizer family used by both the critic and the generator, each gets its own instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam {
        learning_rate: f32,
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_adam_epsilon")]
        epsilon: f32,
    },
    RmsProp {
        learning_rate: f32,
        #[serde(default = "default_decay")]
        decay: f32,
        #[serde(default = "default_rms_epsilon")]
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
}

fn default_beta2() -> f32 {
    0.999
}

fn default_adam_epsilon() -> f32 {
    1e-8
}

fn default_decay() -> f32 {
    0.9
}

fn default_rms_epsilon() -> f32 {
    1e-10
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            learning_rate: 0.0002,
            beta1: 0.5,
            beta2: default_beta2(),
            epsilon: default_adam_epsilon(),
        }
    }
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Adam { learning_rate, .. }
            | Self::RmsProp { learning_rate, .. }
            | Self::GradientDescent { learning_rate } => learning_rate,
        }
    }

    fn validate(&self) -> Result<()> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.) {
            return Err(invalid(format!("learning_rate must be positive, got {lr}")));
        }

        let (decays, epsilon) = match *self {
            Self::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => (vec![("beta1", beta1), ("beta2", beta2)], epsilon),
            Self::RmsProp { decay, epsilon, .. } => (vec![("decay", decay)], epsilon),
            Self::GradientDescent { .. } => return Ok(()),
        };

        for (name, value) in decays {
            if !(0.0..1.0).contains(&value) {
                return Err(invalid(format!("{name} must be in [0, 1), got {value}")));
            }
        }

        if !(epsilon.is_finite() && epsilon > 0.) {
            return Err(invalid(format!("epsilon must be positive, got {epsilon}")));
        }

        Ok(())
    }
}

/// The value range of generated images.
///
/// Real images are normalized into this range and generated images are mapped back to
/// pixels from it, it also picks the generator's output activation so all three agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRange {
    /// `[-1, 1]`
    Tanh,
    /// `[0, 1]`
    Sigmoid,
}

impl OutputRange {
    pub fn bounds(self) -> (f32, f32) {
        match self {
            OutputRange::Tanh => (-1., 1.),
            OutputRange::Sigmoid => (0., 1.),
        }
    }

    /// The activation function whose image is this range.
    pub fn activation(self) -> ActFn {
        match self {
            OutputRange::Tanh => ActFn::tanh(),
            OutputRange::Sigmoid => ActFn::sigmoid(1.),
        }
    }

    /// Maps a raw pixel into the range.
    pub fn from_pixel(self, pixel: u8) -> f32 {
        let (low, high) = self.bounds();
        low + (high - low) * (pixel as f32 / 255.)
    }

    /// Maps a value of the range back into a pixel, clamping anything outside of it.
    pub fn to_pixel(self, value: f32) -> u8 {
        let (low, high) = self.bounds();
        let unit = ((value - low) / (high - low)).clamp(0., 1.);
        (unit * 255.).round() as u8
    }
}

/// Layer widths and knobs of the generator and critic networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub generator_hidden: Vec<usize>,
    pub critic_hidden: Vec<usize>,
    pub leaky_slope: f32,
    /// Batch-normalizes the generator's hidden layers.
    pub batch_norm: bool,
    pub bn_momentum: f32,
    pub bn_epsilon: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            generator_hidden: vec![128, 256],
            critic_hidden: vec![256, 128],
            leaky_slope: 0.2,
            batch_norm: true,
            bn_momentum: 0.99,
            bn_epsilon: 1e-3,
        }
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        let widths = self.generator_hidden.iter().chain(&self.critic_hidden);
        if widths.into_iter().any(|&w| w == 0) {
            return Err(invalid("hidden layer widths must be greater than 0".into()));
        }

        if !(0.0..1.0).contains(&self.bn_momentum) {
            return Err(invalid(format!(
                "bn_momentum must be in [0, 1), got {}",
                self.bn_momentum
            )));
        }

        // A single sample batch has zero variance, only epsilon keeps its normalization finite.
        if !(self.bn_epsilon.is_finite() && self.bn_epsilon > 0.) {
            return Err(invalid(format!(
                "bn_epsilon must be positive, got {}",
                self.bn_epsilon
            )));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(usize),
    Str(String),
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// Loads the list of runs described by a JSON run file.
///
/// # Arguments
/// * `path` - A JSON array of `TrainingConfig` overrides.
///
/// # Returns
/// The validated configurations, in file order.
pub fn load_runs<P: AsRef<Path>>(path: P) -> Result<Vec<TrainingConfig>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_runs(&content)
}

/// Parses and validates a JSON array of runs.
pub fn parse_runs(content: &str) -> Result<Vec<TrainingConfig>> {
    let runs: Vec<TrainingConfig> =
        serde_json::from_str(content).map_err(|e| invalid(format!("malformed run file: {e}")))?;

    for run in &runs {
        run.validate()?;
    }

    Ok(runs)
}

fn invalid(msg: String) -> WganErr {
    WganErr::Config(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrainingConfig::default();

        config.validate().unwrap();
        assert_eq!(config.critic_update_ratio, 5);
        assert_eq!(config.val_size(), 100);
        assert_eq!(config.assets_dir(), Path::new("assets/wgan"));
        assert_eq!(config.ckpt_dir(), Path::new("checkpoints/wgan"));
    }

    #[test]
    fn run_file_entries_override_defaults() {
        let runs = parse_runs(
            r#"[
                {"epochs": "30", "mnist-type": "fashion"},
                {"epochs": 2, "dataset": "digits", "optimizer": {"kind": "rms_prop", "learning_rate": 0.00005}}
            ]"#,
        )
        .unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].epochs, 30);
        assert_eq!(runs[0].dataset, "fashion");
        assert_eq!(runs[0].batch_size, 128);
        assert_eq!(
            runs[1].optimizer,
            OptimizerConfig::RmsProp {
                learning_rate: 0.00005,
                decay: 0.9,
                epsilon: 1e-10
            }
        );
    }

    #[test]
    fn invalid_hyperparameters_are_rejected() {
        let cases = [
            TrainingConfig {
                batch_size: 0,
                ..Default::default()
            },
            TrainingConfig {
                critic_update_ratio: 0,
                ..Default::default()
            },
            TrainingConfig {
                clip_bound: -0.01,
                ..Default::default()
            },
            TrainingConfig {
                optimizer: OptimizerConfig::Adam {
                    learning_rate: 0.0002,
                    beta1: 1.5,
                    beta2: 0.999,
                    epsilon: 1e-8,
                },
                ..Default::default()
            },
            TrainingConfig {
                network: NetworkConfig {
                    bn_epsilon: 0.,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(matches!(config.validate(), Err(WganErr::Config(_))));
        }
    }

    #[test]
    fn malformed_run_file_is_a_config_error() {
        assert!(matches!(parse_runs("{"), Err(WganErr::Config(_))));
        assert!(matches!(
            parse_runs(r#"[{"epochs": 0}]"#),
            Err(WganErr::Config(_))
        ));
    }

    #[test]
    fn output_range_maps_pixels_both_ways() {
        let range = OutputRange::Tanh;

        assert_eq!(range.from_pixel(0), -1.);
        assert_eq!(range.from_pixel(255), 1.);
        assert_eq!(range.to_pixel(-1.), 0);
        assert_eq!(range.to_pixel(1.), 255);
        assert_eq!(range.to_pixel(7.), 255);
        assert_eq!(OutputRange::Sigmoid.to_pixel(0.5), 128);
    }
}
