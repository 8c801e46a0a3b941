use ndarray::prelude::*;
use rand::Rng;

use super::reshape::{from_rows, to_rows};
use crate::{
    Result,
    arch::activations::ActFn,
    initialization::{ConstWeightGen, RandWeightGen},
};

/// A fully connected layer applied on the last axis of its input.
///
/// The parameters are laid out as `[kernel (n x m) | bias (m)]`.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    l2: Option<f32>,
    size: usize,

    // Forward metadata
    shape: (usize, usize),
    x: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of (input, output) units.
    /// * `act_fn` - The activation applied to the output, if any.
    /// * `l2` - The coefficient of an L2 penalty over the kernel, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>, l2: Option<f32>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            act_fn,
            l2,
            size: (dim.0 + 1) * dim.1,
            shape: (0, 0),
            x: zeros.clone(),
            z: zeros.clone(),
            a: zeros,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn units(&self) -> usize {
        self.dim.1
    }

    pub fn param_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("kernel", vec![self.dim.0, self.dim.1]),
            ("bias", vec![self.dim.1]),
        ]
    }

    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params =
            RandWeightGen::xavier_uniform(self.dim.0, self.dim.1)?.sample(rng, self.dim.0 * self.dim.1);
        params.extend(ConstWeightGen::zeros().sample(self.dim.1));
        Ok(params)
    }

    /// The L2 penalty this layer adds to the loss.
    pub fn penalty(&self, params: &[f32]) -> f32 {
        let Some(l2) = self.l2 else {
            return 0.;
        };

        let (w, _) = self.view_params(params);
        l2 * w.iter().map(|w| w * w).sum::<f32>()
    }

    pub fn forward(&mut self, params: &[f32], x: Array3<f32>) -> Result<Array3<f32>> {
        let (b, s, _) = x.dim();
        let (w, bias) = self.view_params(params);

        let x = to_rows(x)?;
        let mut z = x.dot(&w);
        z += &bias;

        self.shape = (b, s);
        self.x = x;

        let Some(act_fn) = self.act_fn else {
            self.z = z;
            return from_rows(self.z.clone(), b, s);
        };

        self.a = act_fn.forward(&z);
        self.z = z;
        from_rows(self.a.clone(), b, s)
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array3<f32>) -> Result<Array3<f32>> {
        let (b, s) = self.shape;
        let mut d = to_rows(d)?;

        if let Some(act_fn) = self.act_fn {
            d = act_fn.backward(&self.z, &self.a, d);
        }

        let (w, _) = self.view_params(params);
        let (mut dw, mut db) = self.view_grad(grad);

        dw.assign(&self.x.t().dot(&d));
        if let Some(l2) = self.l2 {
            dw.zip_mut_with(&w, |dw, &w| *dw += 2. * l2 * w);
        }
        db.assign(&d.sum_axis(Axis(0)));

        from_rows(d.dot(&w.t()), b, s)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> (ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).unwrap();
        (dw, db)
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> (ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size]).unwrap();
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..]).unwrap();
        (weights, biases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::layers::test::check_gradients;

    #[test]
    fn forward_applies_kernel_and_bias() {
        let mut dense = Dense::new((2, 1), None, None);
        let params = [2., 3., 1.];
        let x = array![[[1., 1.]], [[0., 2.]]];

        let y = dense.forward(&params, x).unwrap();
        assert_eq!(y, array![[[6.]], [[7.]]]);
    }

    #[test]
    fn forward_works_on_every_step() {
        let mut dense = Dense::new((2, 1), None, None);
        let params = [1., -1., 0.];
        let x = array![[[1., 2.], [3., 1.], [0., 0.]]];

        let y = dense.forward(&params, x).unwrap();
        assert_eq!(y, array![[[-1.], [2.], [0.]]]);
    }

    #[test]
    fn penalty_is_zero_without_l2() {
        let dense = Dense::new((2, 1), None, None);
        assert_eq!(dense.penalty(&[1., 2., 3.]), 0.);

        let dense = Dense::new((2, 1), None, Some(0.5));
        assert_eq!(dense.penalty(&[1., 2., 3.]), 2.5);
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradients(Dense::new((3, 4), Some(ActFn::Tanh), None).into(), (2, 2, 3));
        check_gradients(Dense::new((3, 2), Some(ActFn::Sigmoid), Some(0.1)).into(), (3, 1, 3));
        check_gradients(Dense::new((4, 3), Some(ActFn::Softmax), None).into(), (2, 1, 4));
        check_gradients(Dense::new((4, 3), None, None).into(), (2, 1, 4));
    }
}
