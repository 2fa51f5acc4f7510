use rand::Rng;

use super::ParamGen;

/// A parameter generator that delegates the generation to a chain of parameter generators.
///
/// This becomes handy whenever one wants a different generator for each section of a
/// layer, for instance the weights and the biases of a dense layer.
pub struct ChainedParamGen<R: Rng> {
    param_gens: Vec<Box<dyn ParamGen<R>>>,
    curr: usize,
    remaining: usize,
}

impl<R: Rng> ChainedParamGen<R> {
    /// Creates a new `ChainedParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `param_gens` - A vec of potentially different parameter generators.
    pub fn new(param_gens: Vec<Box<dyn ParamGen<R>>>) -> Self {
        let remaining = param_gens
            .iter()
            .map(|param_gen| param_gen.remaining())
            .sum();

        Self {
            param_gens,
            remaining,
            curr: 0,
        }
    }

    /// Drains the whole chain into a single vector.
    pub fn collect(mut self, rng: &mut R) -> Vec<f32> {
        let n = self.remaining;
        self.sample(rng, n).unwrap_or_default()
    }
}

impl<R: Rng> ParamGen<R> for ChainedParamGen<R> {
    fn sample(&mut self, rng: &mut R, n: usize) -> Option<Vec<f32>> {
        if self.curr == self.param_gens.len() || self.remaining == 0 {
            return None;
        }

        match self.param_gens[self.curr].sample(rng, n) {
            Some(sample) if sample.len() == n => {
                self.remaining -= sample.len();
                Some(sample)
            }
            Some(mut sample) => {
                self.remaining -= sample.len();
                self.curr += 1;

                if let Some(next_sample) = self.sample(rng, n - sample.len()) {
                    sample.extend(next_sample);
                }

                Some(sample)
            }
            None => {
                self.curr += 1;
                self.sample(rng, n)
            }
        }
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::initialization::ConstParamGen;

    #[test]
    fn chain_spans_its_generators() {
        let mut rng = StdRng::seed_from_u64(0);
        let chain = ChainedParamGen::new(vec![
            Box::new(ConstParamGen::new(1., 3)),
            Box::new(ConstParamGen::new(0., 2)),
        ]);

        assert_eq!(chain.collect(&mut rng), [1., 1., 1., 0., 0.]);
    }
}
