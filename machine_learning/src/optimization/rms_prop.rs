use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// RMSProp: scales every step by a moving average of the squared gradient.
#[derive(Debug)]
pub struct RmsProp {
    learning_rate: f32,
    decay: f32,
    epsilon: f32,
    ms: Box<[f32]>,
}

impl RmsProp {
    /// Creates a new `RmsProp` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `decay` - Discount factor of the squared gradient's moving average.
    /// * `epsilon` - Added to the denominator for numerical stability.
    pub fn new(len: usize, learning_rate: f32, decay: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            decay,
            epsilon,
            ms: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for RmsProp {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(&self.ms, params)?;

        let lr = self.learning_rate;
        let rho = self.decay;
        let eps = self.epsilon;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.ms.iter_mut())
            .for_each(|((p, g), ms)| {
                *ms = rho * *ms + (1. - rho) * g.powi(2);
                *p -= lr * g / (ms.sqrt() + eps);
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_by_the_gradient_magnitude() {
        let mut rms = RmsProp::new(2, 0.01, 0.9, 1e-10);
        let mut params = [0., 0.];

        rms.update_params(&[100., 0.001], &mut params).unwrap();

        // after one step ms = 0.1 * g², so both move by lr / sqrt(0.1)
        let expected = 0.01 / 0.1f32.sqrt();
        assert!((params[0] + expected).abs() < 1e-4);
        assert!((params[1] + expected).abs() < 1e-3);
    }
}
