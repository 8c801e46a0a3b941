use ndarray::prelude::*;
use rand::Rng;

use crate::{
    Result,
    arch::activations::act_fn::sigmoid,
    initialization::{ConstWeightGen, RandWeightGen},
};

/// The values of a single time step needed to backpropagate through it.
#[derive(Debug, Clone)]
struct Step {
    h_prev: Array2<f32>,
    c_prev: Array2<f32>,
    i: Array2<f32>,
    f: Array2<f32>,
    g: Array2<f32>,
    o: Array2<f32>,
    tanh_c: Array2<f32>,
}

/// A long short-term memory recurrent layer.
///
/// The gates are packed in `i, f, c, o` order and the parameters laid out as
/// `[kernel (n x 4u) | recurrent kernel (u x 4u) | bias (4u)]`.
#[derive(Debug, Clone)]
pub struct Lstm {
    input: usize,
    units: usize,
    return_sequences: bool,

    // Forward metadata
    x: Array3<f32>,
    steps: Vec<Step>,
}

impl Lstm {
    /// Creates a new `Lstm` layer.
    ///
    /// # Arguments
    /// * `input` - The amount of channels of each input step.
    /// * `units` - The size of the hidden state.
    /// * `return_sequences` - Whether to output the hidden state of every step or just the last one.
    pub fn new(input: usize, units: usize, return_sequences: bool) -> Self {
        Self {
            input,
            units,
            return_sequences,
            x: Array3::zeros((0, 0, 0)),
            steps: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        (self.input + self.units + 1) * 4 * self.units
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }

    pub fn param_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        let gates = 4 * self.units;

        vec![
            ("kernel", vec![self.input, gates]),
            ("recurrent_kernel", vec![self.units, gates]),
            ("bias", vec![gates]),
        ]
    }

    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let (n, u) = (self.input, self.units);

        let mut params = RandWeightGen::xavier_uniform(n, 4 * u)?.sample(rng, n * 4 * u);
        params.extend(RandWeightGen::xavier_uniform(u, 4 * u)?.sample(rng, u * 4 * u));

        // a forget bias of one keeps the cell state flowing early in training
        params.extend(ConstWeightGen::zeros().sample(u));
        params.extend(ConstWeightGen::new(1.).sample(u));
        params.extend(ConstWeightGen::zeros().sample(2 * u));

        Ok(params)
    }

    pub fn forward(&mut self, params: &[f32], x: Array3<f32>) -> Array3<f32> {
        let (b, steps, _) = x.dim();
        let u = self.units;
        let (w, rw, bias) = self.view_params(params);

        let out_steps = if self.return_sequences { steps } else { 1 };
        let mut out = Array3::zeros((b, out_steps, u));

        let mut h = Array2::zeros((b, u));
        let mut c = Array2::zeros((b, u));
        self.steps.clear();

        for t in 0..steps {
            let mut z = x.slice(s![.., t, ..]).dot(&w);
            z += &h.dot(&rw);
            z += &bias;

            let i = z.slice(s![.., ..u]).mapv(sigmoid);
            let f = z.slice(s![.., u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * u..3 * u]).mapv(f32::tanh);
            let o = z.slice(s![.., 3 * u..]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f32::tanh);
            let h_next = &o * &tanh_c;

            if self.return_sequences {
                out.slice_mut(s![.., t, ..]).assign(&h_next);
            }

            self.steps.push(Step {
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });

            h = h_next;
            c = c_next;
        }

        if !self.return_sequences {
            out.slice_mut(s![.., 0, ..]).assign(&h);
        }

        self.x = x;
        out
    }

    /// Backpropagates through time.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array3<f32>) -> Array3<f32> {
        let (b, steps, input) = self.x.dim();
        let u = self.units;
        let (w, rw, _) = self.view_params(params);

        let mut dw = Array2::<f32>::zeros((input, 4 * u));
        let mut drw = Array2::<f32>::zeros((u, 4 * u));
        let mut db = Array1::<f32>::zeros(4 * u);
        let mut dx = Array3::zeros((b, steps, input));

        let mut dh_next = Array2::<f32>::zeros((b, u));
        let mut dc_next = Array2::<f32>::zeros((b, u));

        for t in (0..steps).rev() {
            let step = &self.steps[t];

            let mut dh = dh_next;
            if self.return_sequences {
                dh += &d.slice(s![.., t, ..]);
            } else if t + 1 == steps {
                dh += &d.slice(s![.., 0, ..]);
            }

            let d_o = &dh * &step.tanh_c;
            let dc = &dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|tc| 1. - tc * tc));

            let di = &dc * &step.g;
            let dg = &dc * &step.i;
            let df = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz = Array2::zeros((b, 4 * u));
            dz.slice_mut(s![.., ..u])
                .assign(&(di * &step.i.mapv(|i| i * (1. - i))));
            dz.slice_mut(s![.., u..2 * u])
                .assign(&(df * &step.f.mapv(|f| f * (1. - f))));
            dz.slice_mut(s![.., 2 * u..3 * u])
                .assign(&(dg * &step.g.mapv(|g| 1. - g * g)));
            dz.slice_mut(s![.., 3 * u..])
                .assign(&(d_o * &step.o.mapv(|o| o * (1. - o))));

            dw += &self.x.slice(s![.., t, ..]).t().dot(&dz);
            drw += &step.h_prev.t().dot(&dz);
            db += &dz.sum_axis(Axis(0));

            dx.slice_mut(s![.., t, ..]).assign(&dz.dot(&w.t()));
            dh_next = dz.dot(&rw.t());
        }

        let (mut gw, mut grw, mut gb) = self.view_grad(grad);
        gw.assign(&dw);
        grw.assign(&drw);
        gb.assign(&db);

        dx
    }

    fn split_sizes(&self) -> (usize, usize) {
        let gates = 4 * self.units;
        (self.input * gates, self.units * gates)
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> (ArrayViewMut2<'a, f32>, ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let gates = 4 * self.units;
        let (w_size, rw_size) = self.split_sizes();

        let (w_raw, rest) = grad.split_at_mut(w_size);
        let (rw_raw, b_raw) = rest.split_at_mut(rw_size);

        let w = ArrayViewMut2::from_shape((self.input, gates), w_raw).unwrap();
        let rw = ArrayViewMut2::from_shape((self.units, gates), rw_raw).unwrap();
        let b = ArrayViewMut1::from_shape(gates, b_raw).unwrap();
        (w, rw, b)
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> (ArrayView2<'a, f32>, ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let gates = 4 * self.units;
        let (w_size, rw_size) = self.split_sizes();

        let (w_raw, rest) = params.split_at(w_size);
        let (rw_raw, b_raw) = rest.split_at(rw_size);

        let w = ArrayView2::from_shape((self.input, gates), w_raw).unwrap();
        let rw = ArrayView2::from_shape((self.units, gates), rw_raw).unwrap();
        let b = ArrayView1::from_shape(gates, b_raw).unwrap();
        (w, rw, b)
    }
}
