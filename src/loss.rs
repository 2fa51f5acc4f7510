//! The Wasserstein losses and the weight clipping constraint.
//!
//! Both players minimize: the critic minimizes `mean(fake) - mean(real)` and the generator
//! minimizes `-mean(fake)`, so the generator's loss goes down exactly when the critic scores
//! its samples higher.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

fn mean(scores: ArrayView2<f32>) -> f32 {
    scores.mean().unwrap_or_default()
}

/// The loss the critic minimizes, the negated estimate of the Wasserstein distance.
pub fn critic_loss(real: ArrayView2<f32>, fake: ArrayView2<f32>) -> f32 {
    mean(fake) - mean(real)
}

/// The derivatives of `critic_loss` with respect to every real and every fake score.
///
/// # Returns
/// A `(d_real, d_fake)` pair shaped like the given scores.
pub fn critic_loss_prime(
    real: ArrayView2<f32>,
    fake: ArrayView2<f32>,
) -> (Array2<f32>, Array2<f32>) {
    let d_real = Array2::from_elem(real.raw_dim(), -1. / real.len().max(1) as f32);
    let d_fake = Array2::from_elem(fake.raw_dim(), 1. / fake.len().max(1) as f32);
    (d_real, d_fake)
}

/// The loss the generator minimizes.
pub fn generator_loss(fake: ArrayView2<f32>) -> f32 {
    -mean(fake)
}

/// The derivative of `generator_loss` with respect to every fake score.
pub fn generator_loss_prime(fake: ArrayView2<f32>) -> Array2<f32> {
    Array2::from_elem(fake.raw_dim(), -1. / fake.len().max(1) as f32)
}

/// Clamps every parameter into `[-bound, bound]`, in place.
pub fn clip(params: &mut [f32], bound: f32) {
    params
        .par_iter_mut()
        .for_each(|p| *p = p.clamp(-bound, bound));
}
