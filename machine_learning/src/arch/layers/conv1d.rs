use ndarray::{linalg, prelude::*};
use rand::Rng;

use super::reshape::{from_rows, to_rows};
use crate::{
    Result,
    arch::activations::ActFn,
    initialization::{ConstWeightGen, RandWeightGen},
};

/// A one dimensional convolution with valid padding and a stride of one.
///
/// The kernel is stored as `(kernel_size, in_channels, filters)`, followed by one bias per filter.
/// Internally the input windows are unrolled into a matrix so the convolution becomes a single
/// matrix product.
#[derive(Debug, Clone)]
pub struct Conv1d {
    in_channels: usize,
    filters: usize,
    kernel_size: usize,
    act_fn: Option<ActFn>,

    // Forward metadata
    in_shape: (usize, usize, usize),
    cols: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,
}

impl Conv1d {
    /// Creates a new `Conv1d` layer.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of each input step.
    /// * `filters` - The amount of output channels.
    /// * `kernel_size` - The amount of steps each filter spans.
    /// * `act_fn` - The activation applied to the output, if any.
    pub fn new(in_channels: usize, filters: usize, kernel_size: usize, act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            in_channels,
            filters,
            kernel_size,
            act_fn,
            in_shape: (0, 0, 0),
            cols: zeros.clone(),
            z: zeros.clone(),
            a: zeros,
        }
    }

    pub fn size(&self) -> usize {
        self.window() * self.filters + self.filters
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    /// The amount of steps left after convolving `steps` input steps.
    pub fn out_steps(&self, steps: usize) -> usize {
        (steps + 1).saturating_sub(self.kernel_size)
    }

    pub fn param_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("kernel", vec![self.kernel_size, self.in_channels, self.filters]),
            ("bias", vec![self.filters]),
        ]
    }

    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let fan_in = self.window();
        let fan_out = self.kernel_size * self.filters;

        let mut params =
            RandWeightGen::xavier_uniform(fan_in, fan_out)?.sample(rng, self.window() * self.filters);
        params.extend(ConstWeightGen::zeros().sample(self.filters));
        Ok(params)
    }

    pub fn forward(&mut self, params: &[f32], x: Array3<f32>) -> Result<Array3<f32>> {
        let (b, steps, _) = x.dim();
        let out_steps = self.out_steps(steps);
        let (w, bias) = self.view_params(params);

        let mut cols = Array2::zeros((b * out_steps, self.window()));
        for n in 0..b {
            for t in 0..out_steps {
                let window = x.slice(s![n, t..t + self.kernel_size, ..]);
                let mut row = cols.row_mut(n * out_steps + t);
                row.iter_mut().zip(window.iter()).for_each(|(c, &x)| *c = x);
            }
        }

        let mut z = Array2::zeros((b * out_steps, self.filters));
        linalg::general_mat_mul(1.0, &cols, &w, 0.0, &mut z);
        z += &bias;

        self.in_shape = x.dim();
        self.cols = cols;

        let Some(act_fn) = self.act_fn else {
            self.z = z;
            return from_rows(self.z.clone(), b, out_steps);
        };

        self.a = act_fn.forward(&z);
        self.z = z;
        from_rows(self.a.clone(), b, out_steps)
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array3<f32>) -> Result<Array3<f32>> {
        let (b, steps, channels) = self.in_shape;
        let out_steps = self.out_steps(steps);
        let mut d = to_rows(d)?;

        if let Some(act_fn) = self.act_fn {
            d = act_fn.backward(&self.z, &self.a, d);
        }

        let (w, _) = self.view_params(params);
        let (mut dw, mut db) = self.view_grad(grad);

        linalg::general_mat_mul(1.0, &self.cols.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let dcols = d.dot(&w.t());
        let mut dx = Array3::zeros((b, steps, channels));
        for n in 0..b {
            for t in 0..out_steps {
                let mut window = dx.slice_mut(s![n, t..t + self.kernel_size, ..]);
                let row = dcols.row(n * out_steps + t);
                window.iter_mut().zip(row.iter()).for_each(|(dx, &g)| *dx += g);
            }
        }

        Ok(dx)
    }

    fn window(&self) -> usize {
        self.kernel_size * self.in_channels
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> (ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let w_size = self.window() * self.filters;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape((self.window(), self.filters), dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.filters, db_raw).unwrap();
        (dw, db)
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> (ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let w_size = self.window() * self.filters;
        let weights = ArrayView2::from_shape((self.window(), self.filters), &params[..w_size]).unwrap();
        let biases = ArrayView1::from_shape(self.filters, &params[w_size..]).unwrap();
        (weights, biases)
    }
}
