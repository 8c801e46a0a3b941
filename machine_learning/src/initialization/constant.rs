/// A weight generator that always yields the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstWeightGen {
    value: f32,
}

impl ConstWeightGen {
    /// Creates a new `ConstWeightGen`.
    ///
    /// # Arguments
    /// * `value` - The value every generated weight takes.
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    /// A generator of zeros, the default for biases.
    pub fn zeros() -> Self {
        Self::new(0.)
    }

    /// Generates `n` weights.
    pub fn sample(&self, n: usize) -> Vec<f32> {
        vec![self.value; n]
    }
}
