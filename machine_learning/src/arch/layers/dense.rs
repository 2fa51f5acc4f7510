use ndarray::{linalg, prelude::*};
use rand::Rng;

use crate::{
    MlErr, Result,
    arch::activations::ActFn,
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen},
};

/// A fully connected layer followed by an optional activation function.
///
/// The layer doesn't own its parameters, they are handed in as a flat slice laid out as
/// the row-major `(n, m)` weight matrix followed by the `m` biases.
#[derive(Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    /// * `act_fn` - The activation function applied to the output, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: Array2::zeros((0, dim.0)),
            z: Array2::zeros((0, dim.1)),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Samples a fresh set of parameters for this layer and zero biases.
    ///
    /// Weights feeding a leaky ReLU are Kaiming normal, every other weight is Xavier uniform.
    pub fn init_params<R: Rng + 'static>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let (n, m) = self.dim;
        let weights: Box<dyn ParamGen<R>> = match self.act_fn {
            Some(ActFn::LeakyRelu(_)) => Box::new(RandParamGen::kaiming(n * m, n)?),
            _ => Box::new(RandParamGen::xavier_uniform(n * m, n, m)?),
        };
        let biases: Box<dyn ParamGen<R>> = Box::new(ConstParamGen::new(0., m));
        let chain = ChainedParamGen::new(vec![weights, biases]);

        Ok(chain.collect(rng))
    }

    /// Makes a forward pass through the layer, caching what the backward pass needs.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The input, one sample per row.
    ///
    /// # Returns
    /// The activated output or an error if the shapes don't line up.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = x.to_owned();

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.z = z;
        Ok(a)
    }

    /// Makes a backward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's gradient buffer, overwritten with the new gradient.
    /// * `d` - The gradient of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The gradient of the loss with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "dense backward rows",
                got: d.nrows(),
                expected: self.z.nrows(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn init_params_zeroes_the_biases() {
        let mut rng = StdRng::seed_from_u64(0);

        for act_fn in [Some(ActFn::leaky_relu(0.2)), None] {
            let dense = Dense::new((4, 3), act_fn);
            let params = dense.init_params(&mut rng).unwrap();

            assert_eq!(params.len(), dense.size());
            assert!(params[12..].iter().all(|&b| b == 0.));
            assert!(params[..12].iter().any(|&w| w != 0.));
        }
    }

    #[test]
    fn forward_computes_the_affine_transform() {
        // w = [[1, 2], [3, 4]], b = [0.5, -0.5]
        let params = [1., 2., 3., 4., 0.5, -0.5];
        let mut dense = Dense::new((2, 2), None);

        let x = array![[1., 1.], [0., 2.]];
        let y = dense.forward(&params, x.view()).unwrap();

        assert_eq!(y, array![[4.5, 5.5], [6.5, 7.5]]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let params = vec![0.3, -0.2, 0.1, 0.4, -0.5, 0.25, 0.05, -0.1, 0.2];
        let x = array![[0.5, -1.0], [1.5, 0.25]];
        let mut dense = Dense::new((2, 3), Some(ActFn::tanh()));

        // loss = sum(y)
        let loss = |dense: &mut Dense, params: &[f32]| dense.forward(params, x.view()).unwrap().sum();

        let y = dense.forward(&params, x.view()).unwrap();
        let mut grad = vec![0.; dense.size()];
        let dx = dense
            .backward(&params, &mut grad, Array2::ones(y.dim()))
            .unwrap();

        let h = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += h;
            minus[i] -= h;

            let numeric = (loss(&mut dense, &plus) - loss(&mut dense, &minus)) / (2. * h);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }

        assert_eq!(dx.dim(), x.dim());
    }

    #[test]
    fn wrong_parameter_length_fails() {
        let mut dense = Dense::new((2, 2), None);
        let x = Array2::zeros((1, 2));

        assert!(dense.forward(&[0.; 5], x.view()).is_err());
    }

    #[test]
    fn backward_before_forward_fails() {
        let mut dense = Dense::new((2, 1), None);
        let mut grad = vec![0.; dense.size()];

        assert!(dense.backward(&[0.; 3], &mut grad, Array2::ones((4, 1))).is_err());
    }
}
