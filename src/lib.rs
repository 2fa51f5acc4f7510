//! Wasserstein GAN training over grayscale image datasets.
//!
//! A critic and a generator are trained against each other: the critic on every batch,
//! with its weights clipped after each update, and the generator once every
//! `critic_update_ratio` batches. Progress is persisted as image grids, generator
//! checkpoints and a loss curve.

pub mod artifacts;
pub mod config;
pub mod context;
pub mod data;
mod error;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optim;
pub mod params;
pub mod schedule;
pub mod trainer;

pub use error::{Result, WganErr};
pub use trainer::{Trainer, TrainingSummary};
