use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{debug, info};
use machine_learning::arch::Mode;
use ndarray::{Array2, ArrayView2, ArrayView4, Axis, concatenate};

use crate::{
    Result, WganErr,
    artifacts::{ArtifactSink, Checkpoint, LossReport, render_grid},
    config::TrainingConfig,
    context::Context,
    data::{DataSource, Fetch},
    loss,
    metrics::{LossHistory, LossRecord, TrainingMetrics},
    optim::Binding,
    params::{Discriminator, Generator, ParamSet},
    schedule::Schedule,
};

/// The counters of a run, only ever moving forward.
#[derive(Debug, Default, Clone)]
pub struct TrainingState {
    /// The global step, one per batch, never reset within a run.
    pub step: u64,
    /// The current 0-based epoch, counted across resumed runs.
    pub epoch: usize,
    /// The epochs completed by the run this one resumed from.
    pub first_epoch: usize,
    pub history: LossHistory,
    pub metrics: TrainingMetrics,
}

/// What a single batch step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub step: u64,
    pub critic_loss: f32,
    pub generator_updated: bool,
    pub report: Option<LossRecord>,
}

/// The result of a complete run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub steps: u64,
    pub epochs: usize,
    pub critic_updates: u64,
    pub generator_updates: u64,
    pub samples: u64,
    pub checkpoints: Vec<PathBuf>,
    pub grids: Vec<PathBuf>,
    pub loss_curve: PathBuf,
    pub history: LossHistory,
    pub elapsed: Duration,
}

/// Trains a generator against a critic.
///
/// The data source and the sink are kept apart from the training core, so a borrowed batch
/// can be trained on while the core is mutated.
pub struct Trainer<D: DataSource, S: ArtifactSink> {
    core: TrainerCore,
    data: D,
    sink: S,
}

struct TrainerCore {
    config: TrainingConfig,
    schedule: Schedule,
    ctx: Context,
    critic_opt: Binding<Discriminator>,
    generator_opt: Binding<Generator>,
    state: TrainingState,
    fixed_z: Array2<f32>,
}

impl<D: DataSource, S: ArtifactSink> Trainer<D, S> {
    /// Validates the configuration and builds everything a run needs.
    ///
    /// # Arguments
    /// * `config` - The run's hyperparameters.
    /// * `data` - The source of real images, its image shape sizes the networks.
    /// * `sink` - Where artifacts are persisted.
    ///
    /// # Errors
    /// `WganErr::Config` on any invalid hyperparameter, nothing is built in that case.
    pub fn new(config: TrainingConfig, data: D, sink: S) -> Result<Self> {
        config.validate()?;
        let schedule = Schedule::from_config(&config)?;

        if data.is_empty() {
            return Err(WganErr::Dataset("the data source has no samples".into()));
        }

        let mut ctx = Context::new(&config, data.image_shape())?;
        let critic_opt = Binding::discriminator(
            &config.optimizer,
            ctx.params.discriminator.len(),
            config.clip_bound,
        );
        let generator_opt = Binding::generator(&config.optimizer, ctx.params.generator.len());
        let fixed_z = ctx.sample_noise(config.val_size())?;

        info!(
            generator_params = ctx.params.generator.len(),
            critic_params = ctx.params.discriminator.len(),
            samples = data.len();
            "built {} for {}", config.name, config.dataset
        );

        let core = TrainerCore {
            config,
            schedule,
            ctx,
            critic_opt,
            generator_opt,
            state: TrainingState::default(),
            fixed_z,
        };

        Ok(Self { core, data, sink })
    }

    /// Starts from a saved generator, continuing its global step and epoch counts.
    ///
    /// Epochs trained afterwards are numbered after the checkpoint's, so the artifacts of the
    /// earlier run are never overwritten. Only possible before `run`, which consumes the
    /// trainer. The critic starts fresh.
    pub fn resume_from<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let ckpt = Checkpoint::load(path)?;
        let ctx = &mut self.core.ctx;

        ctx.params.generator.load(&ckpt.generator)?;
        ctx.network.load_running_stats(&ckpt.running_stats)?;
        self.core.state.step = ckpt.step;
        self.core.state.first_epoch = ckpt.epoch;
        self.core.state.epoch = ckpt.epoch;

        info!(step = ckpt.step, epoch = ckpt.epoch; "resumed from {}", path.display());
        Ok(())
    }

    pub fn params(&self) -> &ParamSet {
        &self.core.ctx.params
    }

    pub fn state(&self) -> &TrainingState {
        &self.core.state
    }

    pub fn critic_updates(&self) -> u64 {
        self.core.critic_opt.updates()
    }

    pub fn generator_updates(&self) -> u64 {
        self.core.generator_opt.updates()
    }

    /// Makes a single training step on a batch of real images.
    pub fn batch_step(&mut self, real: ArrayView4<f32>) -> Result<StepOutcome> {
        self.core.batch_step(real)
    }

    /// Trains for every configured epoch, then persists the final artifacts.
    pub fn run(mut self) -> Result<TrainingSummary> {
        let start = Instant::now();
        let epochs = self.core.schedule.epochs();
        let first_epoch = self.core.state.first_epoch;
        let mut checkpoints = Vec::new();
        let mut grids = Vec::new();

        info!(
            epochs = epochs, first_epoch = first_epoch, start_step = self.core.state.step;
            "training {}", self.core.config.name
        );

        // The last epoch always saves, so finalizing only has the loss curve left to write.
        for epoch in 0..epochs {
            self.core.state.epoch = first_epoch + epoch;
            self.data.begin_epoch(&mut self.core.ctx.rng);

            while let Fetch::Batch(real) = self.data.next_batch() {
                self.core.batch_step(real)?;
            }

            debug!(epoch = self.core.state.epoch, step = self.core.state.step; "end of epoch");

            if self.core.schedule.saves_at(epoch) {
                let (grid, ckpt) = self.core.save_epoch(&mut self.sink, first_epoch + epoch + 1)?;
                grids.push(grid);
                checkpoints.push(ckpt);
            }
        }

        let elapsed = start.elapsed();
        let state = &self.core.state;
        let report = LossReport {
            dataset: self.core.config.dataset.clone(),
            steps: state.step,
            elapsed_secs: elapsed.as_secs_f64(),
            history: state.history.clone(),
        };
        let loss_curve = self.sink.save_loss_curve(&report)?;

        let summary = TrainingSummary {
            steps: state.step,
            epochs,
            critic_updates: self.core.critic_opt.updates(),
            generator_updates: self.core.generator_opt.updates(),
            samples: state.metrics.samples,
            checkpoints,
            grids,
            loss_curve,
            history: report.history,
            elapsed,
        };

        info!(
            steps = summary.steps,
            critic_updates = summary.critic_updates,
            generator_updates = summary.generator_updates,
            compute_ms = state.metrics.compute_time.as_millis() as u64,
            artifact_ms = state.metrics.artifact_time.as_millis() as u64;
            "finished training in {:.1}s", elapsed.as_secs_f64()
        );

        Ok(summary)
    }
}

impl TrainerCore {
    fn batch_step(&mut self, real: ArrayView4<f32>) -> Result<StepOutcome> {
        let started = Instant::now();
        let step = self.state.step;
        let n = real.len_of(Axis(0));

        let z = self.ctx.sample_noise(n)?;
        let fake = self
            .ctx
            .network
            .generate(&self.ctx.params.generator, z.view(), Mode::Train)?;

        let critic_loss = self.update_critic(real, fake.view())?;

        let generator_updated = self.schedule.updates_generator(step);
        if generator_updated {
            self.update_generator(fake.view())?;
        }

        let report = if self.schedule.reports(step) {
            Some(self.report(real, z.view())?)
        } else {
            None
        };

        self.state.metrics.add_samples(n);
        self.state.metrics.compute_time += started.elapsed();
        self.state.step += 1;

        Ok(StepOutcome {
            step,
            critic_loss,
            generator_updated,
            report,
        })
    }

    /// Loss, gradient, step and clip over the critic, real and fake scored as one batch.
    fn update_critic(&mut self, real: ArrayView4<f32>, fake: ArrayView4<f32>) -> Result<f32> {
        let Context {
            network, params, ..
        } = &mut self.ctx;
        let n_real = real.len_of(Axis(0));

        let both = concatenate(Axis(0), &[real, fake])?;
        let scores = network.score(&params.discriminator, both.view(), Mode::Train)?;
        let (real_scores, fake_scores) = scores.logits.view().split_at(Axis(0), n_real);

        let critic_loss = loss::critic_loss(real_scores, fake_scores);
        check_finite(self.state.step, "critic loss", critic_loss)?;

        let (d_real, d_fake) = loss::critic_loss_prime(real_scores, fake_scores);
        let d = concatenate(Axis(0), &[d_real.view(), d_fake.view()])?;

        network.backward_critic(&mut params.discriminator, d)?;
        self.critic_opt.step(&mut params.discriminator)?;

        Ok(critic_loss)
    }

    /// Backpropagates the generator loss through the freshly updated critic, reusing the
    /// generator pass that produced `fake`.
    fn update_generator(&mut self, fake: ArrayView4<f32>) -> Result<()> {
        let Context {
            network, params, ..
        } = &mut self.ctx;

        let scores = network.score(&params.discriminator, fake, Mode::Train)?;
        let generator_loss = loss::generator_loss(scores.logits.view());
        check_finite(self.state.step, "generator loss", generator_loss)?;

        let d = loss::generator_loss_prime(scores.logits.view());
        network.backward_generator(&mut params.generator, &params.discriminator, d)?;
        self.generator_opt.step(&mut params.generator)?;

        Ok(())
    }

    /// Evaluates both losses on the current batch without touching any state.
    fn report(&mut self, real: ArrayView4<f32>, z: ArrayView2<f32>) -> Result<LossRecord> {
        let Context {
            network, params, ..
        } = &mut self.ctx;
        let step = self.state.step;

        let fake = network.generate(&params.generator, z, Mode::Probe)?;
        let real_scores = network.score(&params.discriminator, real, Mode::Probe)?.logits;
        let fake_scores = network.score(&params.discriminator, fake.view(), Mode::Probe)?.logits;

        let critic = loss::critic_loss(real_scores.view(), fake_scores.view());
        let generator = loss::generator_loss(fake_scores.view());
        check_finite(step, "critic loss", critic)?;
        check_finite(step, "generator loss", generator)?;

        let record = LossRecord {
            step,
            epoch: self.state.epoch,
            critic,
            generator,
        };
        self.state.history.push(record);

        info!(
            "Epoch {}/{}... Discriminator Loss: {critic:.4}... Generator Loss: {generator:.4}",
            self.state.epoch + 1,
            self.state.first_epoch + self.schedule.epochs()
        );

        Ok(record)
    }

    /// Renders the fixed latent batch and snapshots the generator for a 1-based epoch.
    fn save_epoch<S: ArtifactSink>(&mut self, sink: &mut S, epoch: usize) -> Result<(PathBuf, PathBuf)> {
        let started = Instant::now();

        for group in self.ctx.params.groups() {
            if let Some(value) = group.first_non_finite() {
                return Err(WganErr::NumericalDivergence {
                    step: self.state.step,
                    what: group.name(),
                    value,
                });
            }
        }

        let Context {
            network, params, ..
        } = &mut self.ctx;

        let images = network.generate(&params.generator, self.fixed_z.view(), Mode::Infer)?;
        let grid = render_grid(
            images.view(),
            self.config.val_block_size,
            self.config.output_range,
        )?;
        let grid_path = sink.save_grid(epoch, &grid)?;

        let ckpt = Checkpoint {
            step: self.state.step,
            epoch,
            generator: params.generator.values().to_vec(),
            running_stats: network.running_stats(),
        };
        let ckpt_path = sink.save_checkpoint(&ckpt)?;

        self.state.metrics.artifact_time += started.elapsed();
        info!(
            epoch = epoch, step = self.state.step;
            "saved {} and {}", grid_path.display(), ckpt_path.display()
        );

        Ok((grid_path, ckpt_path))
    }
}

fn check_finite(step: u64, what: &'static str, value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(WganErr::NumericalDivergence { step, what, value });
    }

    Ok(())
}
