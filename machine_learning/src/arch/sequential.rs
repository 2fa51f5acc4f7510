use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{Mode, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The model doesn't own its trainable parameters, every pass receives them as one flat slice
/// that is split between the layers in order.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    /// Returns the amount of non-trainable values in the model.
    pub fn buffer_size(&self) -> usize {
        self.layers.iter().map(|layer| layer.buffer_size()).sum()
    }

    /// Samples a fresh parameter vector for the whole model.
    pub fn init_params<R: Rng + 'static>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = Vec::with_capacity(self.size());

        for layer in &self.layers {
            params.extend(layer.init_params(rng)?);
        }

        Ok(params)
    }

    /// Collects the non-trainable values of every layer, in order.
    pub fn buffers(&self) -> Vec<f32> {
        let mut buffers = Vec::with_capacity(self.buffer_size());

        for layer in &self.layers {
            layer.write_buffers(&mut buffers);
        }

        buffers
    }

    /// Restores the non-trainable values of every layer from a vector made by `buffers`.
    pub fn load_buffers(&mut self, buffers: &[f32]) -> Result<()> {
        self.check_len("model buffers", buffers.len(), self.buffer_size())?;

        let mut rest = buffers;
        for layer in &mut self.layers {
            let (head, tail) = rest.split_at(layer.buffer_size());
            layer.load_buffers(head)?;
            rest = tail;
        }

        Ok(())
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    /// * `mode` - How normalization layers should behave.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>, mode: Mode) -> Result<Array2<f32>> {
        self.check_len("model parameters", params.len(), self.size())?;

        let mut rest = params;
        let mut x = x.to_owned();

        for layer in self.layers.iter_mut() {
            let (head, tail) = rest.split_at(layer.size());
            x = layer.forward(head, x.view(), mode)?;
            rest = tail;
        }

        Ok(x)
    }

    /// Makes a backward pass through the network, the last forward pass is the one derived.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer the size of `params` the gradient is written into.
    /// * `d` - The gradient of the loss with respect to the model's output.
    ///
    /// # Returns
    /// The gradient of the loss with respect to the model's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        self.check_len("model parameters", params.len(), self.size())?;
        self.check_len("model gradient", grad.len(), self.size())?;

        let mut params_rest = params;
        let mut grad_rest = grad;

        for layer in self.layers.iter_mut().rev() {
            let size = layer.size();
            let (params_head, params_tail) = params_rest.split_at(params_rest.len() - size);
            let split = grad_rest.len() - size;
            let (grad_head, grad_tail) = std::mem::take(&mut grad_rest).split_at_mut(split);

            d = layer.backward(params_tail, grad_tail, d)?;

            params_rest = params_head;
            grad_rest = grad_head;
        }

        Ok(d)
    }

    fn check_len(&self, what: &'static str, got: usize, expected: usize) -> Result<()> {
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}
