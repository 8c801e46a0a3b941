use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::Result;

/// A weight generator that follows a certain probabilistic distribution.
#[derive(Debug, Clone, Copy)]
pub struct RandWeightGen<D: Distribution<f32>> {
    distribution: D,
}

impl<D: Distribution<f32>> RandWeightGen<D> {
    /// Creates a new `RandWeightGen` weight generator.
    ///
    /// # Arguments
    /// * `distribution` - The distribution to sample the random numbers from.
    pub fn new(distribution: D) -> Self {
        Self { distribution }
    }

    /// Generates `n` weights.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `n` - The amount of weights to generate.
    pub fn sample<R: Rng>(&self, rng: &mut R, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.distribution.sample(rng)).collect()
    }
}

impl RandWeightGen<Uniform<f32>> {
    /// Creates a new `RandWeightGen` weight generator with a uniform distribution.
    ///
    /// # Arguments
    /// * `low` - The inclusive lower limit.
    /// * `high` - The exclusive upper limit.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(Uniform::new(low, high)?))
    }

    /// Creates a new `RandWeightGen` weight generator using Xavier (Glorot) uniform
    /// initialization.
    ///
    /// # Arguments
    /// * `fan_in` - The number of input units in the weight tensor.
    /// * `fan_out` - The number of output units in the weight tensor.
    ///
    /// # Returns
    /// An error if the calculated range is invalid.
    pub fn xavier_uniform(fan_in: usize, fan_out: usize) -> Result<Self> {
        let range = (6. / (fan_in + fan_out) as f32).sqrt();
        Self::uniform(-range, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn xavier_uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let weight_gen = RandWeightGen::xavier_uniform(4, 2).unwrap();
        let sample = weight_gen.sample(&mut rng, 1000);

        assert_eq!(sample.len(), 1000);
        assert!(sample.iter().all(|w| w.abs() <= 1.));
        assert!(sample.iter().any(|&w| w > 0.5) && sample.iter().any(|&w| w < -0.5));
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let weight_gen = RandWeightGen::xavier_uniform(3, 3).unwrap();
        let a = weight_gen.sample(&mut StdRng::seed_from_u64(1), 16);
        let b = weight_gen.sample(&mut StdRng::seed_from_u64(1), 16);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_range_is_an_error() {
        assert!(RandWeightGen::uniform(1., 1.).is_err());
    }
}
