use ndarray::Array3;

use super::reshape::{from_rows, to_rows};
use crate::Result;

/// Flattens every sample into a single step, `(b, s, c)` -> `(b, 1, s * c)`.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    in_shape: (usize, usize, usize),
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: Array3<f32>) -> Result<Array3<f32>> {
        let (b, s, c) = x.dim();
        self.in_shape = (b, s, c);

        let x = from_rows(to_rows(x)?.into_shape_with_order((b, s * c))?, b, 1)?;
        Ok(x)
    }

    pub fn backward(&mut self, d: Array3<f32>) -> Result<Array3<f32>> {
        let (b, s, c) = self.in_shape;
        from_rows(to_rows(d)?.into_shape_with_order((b * s, c))?, b, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn flatten_round_trips_the_shape() {
        let mut flatten = Flatten::new();
        let x = array![[[1., 2.], [3., 4.]], [[5., 6.], [7., 8.]]];

        let y = flatten.forward(x.clone()).unwrap();
        assert_eq!(y, array![[[1., 2., 3., 4.]], [[5., 6., 7., 8.]]]);

        let dx = flatten.backward(y).unwrap();
        assert_eq!(dx, x);
    }
}
