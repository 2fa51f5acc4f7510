use machine_learning::MlErr;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::Uniform;

use crate::{Result, config::TrainingConfig, network::Network, params::ParamSet};

/// Everything a training run computes with, owned in one place and handed to whoever needs it.
pub struct Context {
    pub network: Network,
    pub params: ParamSet,
    pub rng: StdRng,
}

impl Context {
    /// Builds the networks for images of `image_shape`, seeding the generator from the
    /// configuration when it has a seed.
    pub fn new(config: &TrainingConfig, image_shape: (usize, usize)) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let (network, params) = Network::build(
            &config.network,
            config.z_dim,
            image_shape,
            config.output_range,
            &mut rng,
        )?;

        Ok(Self {
            network,
            params,
            rng,
        })
    }

    /// Samples `n` latent vectors uniformly from `[-1, 1]`.
    pub fn sample_noise(&mut self, n: usize) -> Result<Array2<f32>> {
        let dist = Uniform::new(-1f32, 1f32).map_err(MlErr::from)?;
        Ok(Array2::random_using((n, self.network.z_dim()), dist, &mut self.rng))
    }
}
