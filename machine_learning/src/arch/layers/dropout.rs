use ndarray::Array3;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Randomly zeroes a fraction `rate` of its inputs while training, scaling the rest by
/// `1 / (1 - rate)`. Behaves as the identity at inference time.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    rng: StdRng,

    // Forward metadata
    mask: Option<Array3<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Arguments
    /// * `rate` - The probability of dropping each input, in `[0, 1)`.
    /// * `seed` - The seed of the mask generator.
    pub fn new(rate: f32, seed: u64) -> Self {
        Self {
            rate,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        }
    }

    pub fn forward(&mut self, x: Array3<f32>, train: bool) -> Array3<f32> {
        if !train || self.rate == 0. {
            self.mask = None;
            return x;
        }

        let keep = 1. - self.rate;
        let rng = &mut self.rng;
        let mask = Array3::from_shape_fn(x.dim(), |_| {
            if rng.random::<f32>() < keep { 1. / keep } else { 0. }
        });

        let y = &x * &mask;
        self.mask = Some(mask);
        y
    }

    pub fn backward(&mut self, d: Array3<f32>) -> Array3<f32> {
        match &self.mask {
            Some(mask) => d * mask,
            None => d,
        }
    }
}
