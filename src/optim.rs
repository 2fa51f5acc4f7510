use std::marker::PhantomData;

use machine_learning::optimization::{Adam, GradientDescent, Optimizer, RmsProp};

use crate::{
    Result,
    config::OptimizerConfig,
    loss,
    params::{Discriminator, Generator, Params, Role},
};

/// An optimizer bound to exactly one parameter group.
///
/// Each group gets its own binding, so a step driven by one loss can only move the
/// parameters of the role it was created for. The critic's binding also carries the
/// clipping constraint, applied right after every one of its steps.
pub struct Binding<R: Role> {
    optimizer: Box<dyn Optimizer + Send>,
    clip_bound: Option<f32>,
    updates: u64,
    _role: PhantomData<R>,
}

impl Binding<Generator> {
    /// Binds a fresh optimizer to a generator group of `len` parameters.
    pub fn generator(config: &OptimizerConfig, len: usize) -> Self {
        Self::new(config, len, None)
    }
}

impl Binding<Discriminator> {
    /// Binds a fresh optimizer to a critic group of `len` parameters, clipping every
    /// updated value into `[-clip_bound, clip_bound]`.
    pub fn discriminator(config: &OptimizerConfig, len: usize, clip_bound: f32) -> Self {
        Self::new(config, len, Some(clip_bound))
    }
}

impl<R: Role> Binding<R> {
    fn new(config: &OptimizerConfig, len: usize, clip_bound: Option<f32>) -> Self {
        Self {
            optimizer: build_optimizer(config, len),
            clip_bound,
            updates: 0,
            _role: PhantomData,
        }
    }

    /// Applies the group's current gradient, then its constraint if it has one.
    ///
    /// # Arguments
    /// * `params` - The group this binding was created for.
    pub fn step(&mut self, params: &mut Params<R>) -> Result<()> {
        let (grad, values) = params.split_for_step();
        self.optimizer.update_params(grad, values)?;

        if let Some(bound) = self.clip_bound {
            loss::clip(values, bound);
        }

        self.updates += 1;
        Ok(())
    }

    /// The amount of steps taken so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

fn build_optimizer(config: &OptimizerConfig, len: usize) -> Box<dyn Optimizer + Send> {
    match *config {
        OptimizerConfig::Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
        OptimizerConfig::RmsProp {
            learning_rate,
            decay,
            epsilon,
        } => Box::new(RmsProp::new(len, learning_rate, decay, epsilon)),
        OptimizerConfig::GradientDescent { learning_rate } => {
            Box::new(GradientDescent::new(learning_rate))
        }
    }
}
