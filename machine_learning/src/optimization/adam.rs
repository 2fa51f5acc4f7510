use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Adam with bias corrected step sizes.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1` - The decay of the first moment estimate.
    /// * `beta2` - The decay of the second moment estimate.
    /// * `epsilon` - Keeps the update finite where the second moment is zero.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: vec![0.; len],
            v: vec![0.; len],
        }
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(&self.m, params)?;

        self.t += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let lr_t = self.learning_rate * (1. - b2.powi(self.t)).sqrt() / (1. - b1.powi(self.t));

        for (((p, &g), m), v) in params
            .iter_mut()
            .zip(grad)
            .zip(&mut self.m)
            .zip(&mut self.v)
        {
            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + eps);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut adam = Adam::new(2, 0.1, 0.5, 0.999, 1e-8);
        let mut params = [0., 0.];

        adam.update_params(&[3., -0.01], &mut params).unwrap();

        // bias correction makes the first step exactly `lr * sign(g)`
        assert!((params[0] + 0.1).abs() < 1e-4);
        assert!((params[1] - 0.1).abs() < 1e-3);
    }

    #[test]
    fn state_length_is_checked() {
        let mut adam = Adam::new(3, 0.1, 0.5, 0.999, 1e-8);
        let mut params = [0., 0.];

        assert!(adam.update_params(&[1., 1.], &mut params).is_err());
    }
}
