use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{BatchNorm, Dense};
use crate::{Result, arch::Mode, arch::activations::ActFn};

/// A layer of a `Sequential` model.
#[derive(Clone)]
pub enum Layer {
    Dense(Dense),
    BatchNorm(BatchNorm),
}
use Layer::*;

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn batch_norm(dim: usize, momentum: f32, epsilon: f32) -> Self {
        Self::BatchNorm(BatchNorm::new(dim, momentum, epsilon))
    }

    /// Returns the amount of trainable parameters of the layer.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
            BatchNorm(l) => l.size(),
        }
    }

    /// Returns the amount of non-trainable values of the layer.
    pub fn buffer_size(&self) -> usize {
        match self {
            Dense(_) => 0,
            BatchNorm(l) => l.buffer_size(),
        }
    }

    pub fn init_params<R: Rng + 'static>(&self, rng: &mut R) -> Result<Vec<f32>> {
        match self {
            Dense(l) => l.init_params(rng),
            BatchNorm(l) => Ok(l.init_params()),
        }
    }

    pub fn write_buffers(&self, out: &mut Vec<f32>) {
        if let BatchNorm(l) = self {
            l.write_buffers(out);
        }
    }

    pub fn load_buffers(&mut self, buffers: &[f32]) -> Result<()> {
        match self {
            Dense(_) => Ok(()),
            BatchNorm(l) => l.load_buffers(buffers),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>, mode: Mode) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.forward(params, x),
            BatchNorm(l) => l.forward(params, x, mode),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(params, grad, d),
            BatchNorm(l) => l.backward(params, grad, d),
        }
    }
}
