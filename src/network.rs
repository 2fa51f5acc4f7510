use machine_learning::arch::{Mode, Sequential, activations::ActFn, layers::Layer};
use ndarray::{Array2, Array4, ArrayView2, ArrayView4};
use rand::rngs::StdRng;

use crate::{
    Result, WganErr,
    config::{NetworkConfig, OutputRange},
    params::{DiscriminatorParams, GeneratorParams, ParamSet},
};

/// What the critic says about a batch of images.
#[derive(Debug, Clone)]
pub struct Scores {
    /// One unbounded score per image, shaped `[batch, 1]`.
    pub logits: Array2<f32>,
    /// The activations feeding the scoring layer, shaped `[batch, features]`.
    pub features: Array2<f32>,
}

/// The generator and critic networks.
///
/// The networks own their layer caches and normalization statistics but not their
/// trainable parameters, those live in the `ParamSet` returned by `build` and are
/// handed in on every pass.
pub struct Network {
    generator: Sequential,
    critic_body: Sequential,
    critic_head: Sequential,
    z_dim: usize,
    image_shape: (usize, usize),
    critic_scratch: Vec<f32>,
}

impl Network {
    /// Builds both networks and samples their initial parameters.
    ///
    /// # Arguments
    /// * `config` - The layer widths and knobs.
    /// * `z_dim` - The size of a latent vector.
    /// * `image_shape` - The `(height, width)` of the generated and scored images.
    /// * `output_range` - Picks the generator's output activation.
    /// * `rng` - The source of the initial parameters.
    ///
    /// # Returns
    /// The networks and their two disjoint parameter groups.
    pub fn build(
        config: &NetworkConfig,
        z_dim: usize,
        image_shape: (usize, usize),
        output_range: OutputRange,
        rng: &mut StdRng,
    ) -> Result<(Self, ParamSet)> {
        let pixels = image_shape.0 * image_shape.1;
        if z_dim == 0 || pixels == 0 {
            return Err(WganErr::Config(format!(
                "can't build networks for z_dim {z_dim} and {}x{} images",
                image_shape.0, image_shape.1
            )));
        }

        let leaky = || Some(ActFn::leaky_relu(config.leaky_slope));

        let mut generator_layers = Vec::new();
        let mut fan_in = z_dim;
        for &width in &config.generator_hidden {
            generator_layers.push(Layer::dense((fan_in, width), leaky()));
            if config.batch_norm {
                generator_layers.push(Layer::batch_norm(
                    width,
                    config.bn_momentum,
                    config.bn_epsilon,
                ));
            }
            fan_in = width;
        }
        generator_layers.push(Layer::dense((fan_in, pixels), Some(output_range.activation())));

        let mut critic_layers = Vec::new();
        let mut fan_in = pixels;
        for &width in &config.critic_hidden {
            critic_layers.push(Layer::dense((fan_in, width), leaky()));
            fan_in = width;
        }

        let generator = Sequential::new(generator_layers);
        let critic_body = Sequential::new(critic_layers);
        let critic_head = Sequential::new([Layer::dense((fan_in, 1), None)]);

        let mut critic_params = critic_body.init_params(rng)?;
        critic_params.extend(critic_head.init_params(rng)?);

        let params = ParamSet {
            generator: GeneratorParams::new(generator.init_params(rng)?),
            discriminator: DiscriminatorParams::new(critic_params),
        };

        let network = Self {
            critic_scratch: vec![0.; params.discriminator.len()],
            generator,
            critic_body,
            critic_head,
            z_dim,
            image_shape,
        };

        Ok((network, params))
    }

    pub fn z_dim(&self) -> usize {
        self.z_dim
    }

    /// Runs the generator.
    ///
    /// # Arguments
    /// * `params` - The generator's parameters.
    /// * `z` - Latent vectors, shaped `[batch, z_dim]`.
    /// * `mode` - How normalization layers behave.
    ///
    /// # Returns
    /// The generated images, shaped `[batch, height, width, 1]`.
    pub fn generate(
        &mut self,
        params: &GeneratorParams,
        z: ArrayView2<f32>,
        mode: Mode,
    ) -> Result<Array4<f32>> {
        let flat = self.generator.forward(params.values(), z, mode)?;
        let (h, w) = self.image_shape;
        let images = flat.into_shape_with_order((z.nrows(), h, w, 1))?;
        Ok(images)
    }

    /// Runs the critic.
    ///
    /// # Arguments
    /// * `params` - The critic's parameters.
    /// * `images` - Images shaped `[batch, height, width, 1]`.
    /// * `mode` - How normalization layers behave.
    pub fn score(
        &mut self,
        params: &DiscriminatorParams,
        images: ArrayView4<f32>,
        mode: Mode,
    ) -> Result<Scores> {
        let (b, h, w, c) = images.dim();
        if (h, w, c) != (self.image_shape.0, self.image_shape.1, 1) {
            return Err(WganErr::Dataset(format!(
                "can't score {h}x{w}x{c} images, expected {}x{}x1",
                self.image_shape.0, self.image_shape.1
            )));
        }

        let flat = images.to_shape((b, h * w))?;
        let (body, head) = params.values().split_at(self.critic_body.size());

        let features = self.critic_body.forward(body, flat.view(), mode)?;
        let logits = self.critic_head.forward(head, features.view(), mode)?;

        Ok(Scores { logits, features })
    }

    /// Writes the critic's gradient for the last `score` call into `params`.
    ///
    /// # Arguments
    /// * `params` - The critic's parameters, its gradient is overwritten.
    /// * `d_logits` - The gradient of the loss with respect to every score.
    pub fn backward_critic(
        &mut self,
        params: &mut DiscriminatorParams,
        d_logits: Array2<f32>,
    ) -> Result<()> {
        let (values, grad) = params.split_for_backward();
        critic_backward(&mut self.critic_body, &mut self.critic_head, values, grad, d_logits)?;
        Ok(())
    }

    /// Writes the generator's gradient into `generator`, backpropagating through the critic.
    ///
    /// The last `generate` call must have produced the images the last `score` call scored.
    /// The critic's own gradient is computed along the way into a scratch buffer, so the
    /// critic's parameters and gradient are left untouched.
    ///
    /// # Arguments
    /// * `generator` - The generator's parameters, its gradient is overwritten.
    /// * `critic` - The critic's parameters.
    /// * `d_logits` - The gradient of the loss with respect to every score.
    pub fn backward_generator(
        &mut self,
        generator: &mut GeneratorParams,
        critic: &DiscriminatorParams,
        d_logits: Array2<f32>,
    ) -> Result<()> {
        let d_images = critic_backward(
            &mut self.critic_body,
            &mut self.critic_head,
            critic.values(),
            &mut self.critic_scratch,
            d_logits,
        )?;

        let (values, grad) = generator.split_for_backward();
        self.generator.backward(values, grad, d_images)?;
        Ok(())
    }

    /// The generator's normalization running statistics.
    pub fn running_stats(&self) -> Vec<f32> {
        self.generator.buffers()
    }

    /// Restores statistics produced by `running_stats`.
    pub fn load_running_stats(&mut self, stats: &[f32]) -> Result<()> {
        self.generator.load_buffers(stats)?;
        Ok(())
    }
}

fn critic_backward(
    body: &mut Sequential,
    head: &mut Sequential,
    params: &[f32],
    grad: &mut [f32],
    d_logits: Array2<f32>,
) -> Result<Array2<f32>> {
    let split = body.size();
    let (body_params, head_params) = params.split_at(split);
    let (body_grad, head_grad) = grad.split_at_mut(split);

    let d_features = head.backward(head_params, head_grad, d_logits)?;
    let d_images = body.backward(body_params, body_grad, d_features)?;
    Ok(d_images)
}
