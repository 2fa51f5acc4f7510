use ndarray::prelude::*;

use crate::{MlErr, Result, arch::Mode};

/// Batch normalization over the features of a 2D input.
///
/// Trainable parameters are laid out as `gamma` followed by `beta`, both of length `dim`.
/// The running mean and variance are non-trainable buffers owned by the layer and are only
/// updated by `Mode::Train` forward passes.
#[derive(Clone)]
pub struct BatchNorm {
    dim: usize,
    momentum: f32,
    epsilon: f32,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,

    // Forward metadata
    x_hat: Array2<f32>,
    inv_std: Array1<f32>,
    batch_stats: bool,
}

impl BatchNorm {
    /// Creates a new `BatchNorm` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of features to normalize.
    /// * `momentum` - How much of the previous running statistics survives each update.
    /// * `epsilon` - Added to the variance for numerical stability.
    pub fn new(dim: usize, momentum: f32, epsilon: f32) -> Self {
        Self {
            dim,
            momentum,
            epsilon,
            running_mean: Array1::zeros(dim),
            running_var: Array1::ones(dim),
            x_hat: Array2::zeros((0, dim)),
            inv_std: Array1::ones(dim),
            batch_stats: true,
        }
    }

    /// Returns the amount of trainable parameters.
    pub fn size(&self) -> usize {
        2 * self.dim
    }

    /// Returns the amount of non-trainable values held by this layer.
    pub fn buffer_size(&self) -> usize {
        2 * self.dim
    }

    /// Unit scale and zero shift.
    pub fn init_params(&self) -> Vec<f32> {
        let mut params = vec![1.; self.dim];
        params.extend(std::iter::repeat_n(0., self.dim));
        params
    }

    /// Appends the running mean and variance to `out`.
    pub fn write_buffers(&self, out: &mut Vec<f32>) {
        out.extend(self.running_mean.iter());
        out.extend(self.running_var.iter());
    }

    /// Overwrites the running mean and variance with `buffers`.
    pub fn load_buffers(&mut self, buffers: &[f32]) -> Result<()> {
        if buffers.len() != self.buffer_size() {
            return Err(MlErr::SizeMismatch {
                what: "batch norm buffers",
                got: buffers.len(),
                expected: self.buffer_size(),
            });
        }

        let (mean, var) = buffers.split_at(self.dim);
        self.running_mean.assign(&ArrayView1::from(mean));
        self.running_var.assign(&ArrayView1::from(var));
        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>, mode: Mode) -> Result<Array2<f32>> {
        if x.ncols() != self.dim {
            return Err(MlErr::SizeMismatch {
                what: "batch norm input features",
                got: x.ncols(),
                expected: self.dim,
            });
        }

        let (gamma, beta) = self.view_params(params)?;

        let (mean, var) = if mode.uses_batch_stats() {
            let empty = || MlErr::SizeMismatch {
                what: "batch norm rows",
                got: 0,
                expected: 1,
            };

            let mean = x.mean_axis(Axis(0)).ok_or_else(empty)?;
            let var = x.var_axis(Axis(0), 0.);
            (mean, var)
        } else {
            (self.running_mean.clone(), self.running_var.clone())
        };

        if mode.updates_running_stats() {
            let m = self.momentum;
            self.running_mean.zip_mut_with(&mean, |r, &b| *r = m * *r + (1. - m) * b);
            self.running_var.zip_mut_with(&var, |r, &b| *r = m * *r + (1. - m) * b);
        }

        let eps = self.epsilon;
        self.inv_std = var.mapv(|v| 1. / (v + eps).sqrt());
        self.x_hat = (&x - &mean) * &self.inv_std;
        self.batch_stats = mode.uses_batch_stats();

        Ok(&self.x_hat * &gamma + &beta)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != self.x_hat.dim() {
            return Err(MlErr::SizeMismatch {
                what: "batch norm backward rows",
                got: d.nrows(),
                expected: self.x_hat.nrows(),
            });
        }

        let (gamma, _) = self.view_params(params)?;
        let (mut dgamma, mut dbeta) = self.view_grad(grad)?;
        dgamma.assign(&(&d * &self.x_hat).sum_axis(Axis(0)));
        dbeta.assign(&d.sum_axis(Axis(0)));

        let dx_hat = &d * &gamma;

        if !self.batch_stats {
            return Ok(dx_hat * &self.inv_std);
        }

        let n = d.nrows() as f32;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &self.x_hat).sum_axis(Axis(0));

        let dx = (&dx_hat * n - &sum_dx_hat - &self.x_hat * &sum_dx_hat_x_hat) * &self.inv_std / n;
        Ok(dx)
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView1<'a, f32>, ArrayView1<'a, f32>)> {
        if params.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "batch norm parameters",
                got: params.len(),
                expected: self.size(),
            });
        }

        let (gamma, beta) = params.split_at(self.dim);
        Ok((ArrayView1::from(gamma), ArrayView1::from(beta)))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut1<'a, f32>, ArrayViewMut1<'a, f32>)> {
        if grad.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "batch norm gradient",
                got: grad.len(),
                expected: self.size(),
            });
        }

        let (dgamma, dbeta) = grad.split_at_mut(self.dim);
        Ok((ArrayViewMut1::from(dgamma), ArrayViewMut1::from(dbeta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Array2<f32> {
        array![[1.0, -2.0], [3.0, 0.0], [5.0, 2.0], [-1.0, 4.0]]
    }

    #[test]
    fn train_forward_normalizes_and_updates_running_stats() {
        let mut bn = BatchNorm::new(2, 0.5, 1e-5);
        let params = bn.init_params();

        let y = bn.forward(&params, batch().view(), Mode::Train).unwrap();

        for mean in y.mean_axis(Axis(0)).unwrap() {
            assert!(mean.abs() < 1e-5);
        }

        let mut buffers = Vec::new();
        bn.write_buffers(&mut buffers);

        // half of the initial (0, 0, 1, 1) plus half of the batch mean (2, 1)
        assert!((buffers[0] - 1.0).abs() < 1e-6);
        assert!((buffers[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn probe_and_infer_leave_running_stats_untouched() {
        let mut bn = BatchNorm::new(2, 0.9, 1e-5);
        let params = bn.init_params();

        bn.forward(&params, batch().view(), Mode::Probe).unwrap();
        bn.forward(&params, batch().view(), Mode::Infer).unwrap();

        let mut buffers = Vec::new();
        bn.write_buffers(&mut buffers);
        assert_eq!(buffers, [0., 0., 1., 1.]);
    }

    #[test]
    fn infer_uses_running_stats() {
        let mut bn = BatchNorm::new(2, 0.9, 0.);
        let params = bn.init_params();
        bn.load_buffers(&[1., 1., 4., 4.]).unwrap();

        let y = bn.forward(&params, array![[3., 5.]].view(), Mode::Infer).unwrap();
        assert_eq!(y, array![[1., 2.]]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut bn = BatchNorm::new(2, 0.9, 1e-3);
        let params = vec![1.5, 0.5, 0.1, -0.2];
        let x = batch();
        let w = array![[0.3, -1.0], [0.7, 0.2], [-0.4, 0.9], [1.1, 0.5]];

        let mut loss = |x: &Array2<f32>| {
            let y = bn.forward(&params, x.view(), Mode::Probe).unwrap();
            (&y * &w).sum()
        };

        let h = 1e-2;
        let mut numeric = Array2::<f32>::zeros(x.dim());
        for ((i, j), n) in numeric.indexed_iter_mut() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[[i, j]] += h;
            minus[[i, j]] -= h;
            *n = (loss(&plus) - loss(&minus)) / (2. * h);
        }

        bn.forward(&params, x.view(), Mode::Train).unwrap();
        let mut grad = vec![0.; bn.size()];
        let dx = bn.backward(&params, &mut grad, w.clone()).unwrap();

        for (a, b) in dx.iter().zip(numeric.iter()) {
            assert!((a - b).abs() < 2e-2, "{a} vs {b}");
        }
    }
}
