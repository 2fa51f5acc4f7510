use std::{fmt, marker::PhantomData};

use machine_learning::MlErr;
use rayon::prelude::*;

use crate::Result;

/// The role a group of parameters plays in the adversarial game.
pub trait Role {
    /// The stable tag of the group, used in logs and checkpoint tensor names.
    const NAME: &'static str;
}

/// Marker for the parameters of the generator network.
#[derive(Debug, Clone, Copy)]
pub struct Generator;

/// Marker for the parameters of the critic network.
#[derive(Debug, Clone, Copy)]
pub struct Discriminator;

impl Role for Generator {
    const NAME: &'static str = "generator";
}

impl Role for Discriminator {
    const NAME: &'static str = "discriminator";
}

/// The trainable parameters of one network together with their gradient buffer.
///
/// The role is part of the type, so a generator group can never be handed to something
/// expecting the critic's and vice versa.
pub struct Params<R: Role> {
    values: Vec<f32>,
    grad: Vec<f32>,
    _role: PhantomData<R>,
}

pub type GeneratorParams = Params<Generator>;
pub type DiscriminatorParams = Params<Discriminator>;

impl<R: Role> Params<R> {
    /// Creates a new group from its initial values, the gradient starts zeroed.
    pub fn new(values: Vec<f32>) -> Self {
        let grad = vec![0.; values.len()];

        Self {
            values,
            grad,
            _role: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        R::NAME
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Borrows the values immutably and the gradient mutably, as a backward pass needs.
    pub fn split_for_backward(&mut self) -> (&[f32], &mut [f32]) {
        (&self.values, &mut self.grad)
    }

    /// Borrows the gradient immutably and the values mutably, as an optimizer step needs.
    pub fn split_for_step(&mut self) -> (&[f32], &mut [f32]) {
        (&self.grad, &mut self.values)
    }

    /// Zeroes out the gradient.
    pub fn zero_grad(&mut self) {
        self.grad.par_iter_mut().for_each(|g| *g = 0.);
    }

    /// Replaces every value, the gradient is zeroed.
    ///
    /// # Errors
    /// Fails if `values` doesn't hold exactly one value per parameter.
    pub fn load(&mut self, values: &[f32]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(MlErr::SizeMismatch {
                what: R::NAME,
                got: values.len(),
                expected: self.values.len(),
            }
            .into());
        }

        self.values.copy_from_slice(values);
        self.zero_grad();
        Ok(())
    }

    /// Returns the first non-finite value, if any.
    pub fn first_non_finite(&self) -> Option<f32> {
        self.values.iter().copied().find(|v| !v.is_finite())
    }
}

impl<R: Role> fmt::Debug for Params<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Params")
            .field("role", &R::NAME)
            .field("len", &self.values.len())
            .finish()
    }
}

/// The two disjoint parameter groups of the adversarial pair, fixed when the networks are built.
#[derive(Debug)]
pub struct ParamSet {
    pub generator: GeneratorParams,
    pub discriminator: DiscriminatorParams,
}

impl ParamSet {
    /// Every group, generator first.
    pub fn groups(&self) -> [ParamGroup<'_>; 2] {
        [
            ParamGroup::Generator(&self.generator),
            ParamGroup::Discriminator(&self.discriminator),
        ]
    }

    pub fn len(&self) -> usize {
        self.generator.len() + self.discriminator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A borrowed parameter group of either role.
#[derive(Debug, Clone, Copy)]
pub enum ParamGroup<'a> {
    Generator(&'a GeneratorParams),
    Discriminator(&'a DiscriminatorParams),
}

impl ParamGroup<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            ParamGroup::Generator(p) => p.name(),
            ParamGroup::Discriminator(p) => p.name(),
        }
    }

    pub fn values(&self) -> &[f32] {
        match self {
            ParamGroup::Generator(p) => p.values(),
            ParamGroup::Discriminator(p) => p.values(),
        }
    }

    pub fn first_non_finite(&self) -> Option<f32> {
        match self {
            ParamGroup::Generator(p) => p.first_non_finite(),
            ParamGroup::Discriminator(p) => p.first_non_finite(),
        }
    }
}
