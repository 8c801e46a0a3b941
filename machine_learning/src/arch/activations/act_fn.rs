use ndarray::{Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// An activation function applied element-wise (or row-wise, for `Softmax`) on a layer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFn {
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}
use ActFn::*;

impl ActFn {
    /// Applies the activation to `z`.
    ///
    /// # Arguments
    /// * `z` - The pre-activations, one sample per row.
    ///
    /// # Returns
    /// The activations, with the same shape as `z`.
    pub fn forward(&self, z: &Array2<f32>) -> Array2<f32> {
        match self {
            Relu => z.mapv(|z| z.max(0.)),
            Sigmoid => z.mapv(sigmoid),
            Tanh => z.mapv(f32::tanh),
            Softmax => softmax(z),
        }
    }

    /// Propagates `d` through the activation.
    ///
    /// # Arguments
    /// * `z` - The pre-activations seen on the forward pass.
    /// * `a` - The activations returned by the forward pass.
    /// * `d` - The derivative of the loss with respect to `a`.
    ///
    /// # Returns
    /// The derivative of the loss with respect to `z`.
    pub fn backward(&self, z: &Array2<f32>, a: &Array2<f32>, mut d: Array2<f32>) -> Array2<f32> {
        match self {
            Relu => d.zip_mut_with(z, |d, &z| {
                if z <= 0. {
                    *d = 0.;
                }
            }),
            Sigmoid => d.zip_mut_with(a, |d, &a| *d *= a * (1. - a)),
            Tanh => d.zip_mut_with(a, |d, &a| *d *= 1. - a * a),
            Softmax => {
                // Jacobian-vector product of each row: a * (d - <d, a>)
                Zip::from(d.rows_mut())
                    .and(a.rows())
                    .for_each(|mut d, a| {
                        let dot = d.dot(&a);
                        d.zip_mut_with(&a, |d, &a| *d = a * (*d - dot));
                    });
            }
        }

        d
    }
}

#[inline]
pub(crate) fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

fn softmax(z: &Array2<f32>) -> Array2<f32> {
    let mut a = z.to_owned();

    for mut row in a.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn softmax_rows_sum_to_one() {
        let z = array![[1., 2., 3.], [1000., 1000., 1000.]];
        let a = Softmax.forward(&z);

        for row in a.rows() {
            assert!((row.sum() - 1.).abs() < 1e-6);
        }
        assert!((a[[1, 0]] - 1. / 3.).abs() < 1e-6);
        assert!(a[[0, 2]] > a[[0, 1]] && a[[0, 1]] > a[[0, 0]]);
    }

    #[test]
    fn relu_blocks_negative_inputs() {
        let z = array![[-1., 0., 2.]];
        let a = Relu.forward(&z);
        assert_eq!(a, array![[0., 0., 2.]]);

        let d = Relu.backward(&z, &a, array![[5., 5., 5.]]);
        assert_eq!(d, array![[0., 0., 5.]]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        const EPS: f32 = 1e-3;
        let z = array![[0.3, -0.7, 1.2, 0.05]];
        // loss = <w, act(z)>
        let w = array![[0.5, -1.0, 2.0, 0.25]];

        for act_fn in [Sigmoid, Tanh, Softmax] {
            let a = act_fn.forward(&z);
            let analytic = act_fn.backward(&z, &a, w.clone());

            for j in 0..z.ncols() {
                let mut zp = z.clone();
                let mut zm = z.clone();
                zp[[0, j]] += EPS;
                zm[[0, j]] -= EPS;

                let lp = (&act_fn.forward(&zp) * &w).sum();
                let lm = (&act_fn.forward(&zm) * &w).sum();
                let numeric = (lp - lm) / (2. * EPS);

                assert!(
                    (numeric - analytic[[0, j]]).abs() < 1e-3,
                    "{act_fn:?}[{j}]: numeric {numeric}, analytic {}",
                    analytic[[0, j]]
                );
            }
        }
    }
}
