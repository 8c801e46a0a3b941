use std::{collections::HashMap, fmt::Write};

use ndarray::{Array2, Array3, ArrayView2, Axis, concatenate};
use rand::Rng;

use super::{
    LayerSpec, ModelSpec,
    layers::{Conv1d, Dense, Dropout, Flatten, Layer, Lstm, MaxPool1d},
    loss::LossFn,
};
use crate::{
    MlErr, Result, dataset::Dataset, metrics, optimization::Optimizer,
    training::ParamManager,
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The model doesn't own its parameters, they live in a `ParamManager` created through
/// `Sequential::init_params` or loaded from a checkpoint.
#[derive(Debug, Clone)]
pub struct Sequential {
    spec: ModelSpec,
    layers: Vec<Layer>,
    shapes: Vec<(usize, usize)>,
}

impl Sequential {
    /// Creates a new `Sequential` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification of the model.
    /// * `seed` - The seed for the layers that need randomness outside of the parameters.
    ///
    /// # Returns
    /// A new `Sequential` instance or an error if the layers don't fit together.
    pub fn new(spec: ModelSpec, seed: u64) -> Result<Self> {
        let (mut steps, mut channels) = spec.input;
        if steps == 0 || channels == 0 {
            return Err(MlErr::InvalidSpec(format!(
                "the input shape {:?} has an empty axis",
                spec.input
            )));
        }

        let mut layers = Vec::with_capacity(spec.layers.len());
        let mut shapes = Vec::with_capacity(spec.layers.len());

        for (i, layer_spec) in spec.layers.iter().enumerate() {
            let invalid = |msg: String| MlErr::InvalidSpec(format!("layer {i}: {msg}"));

            let layer: Layer = match *layer_spec {
                LayerSpec::Dense { units, act_fn, l2 } => {
                    if units == 0 {
                        return Err(invalid("a dense layer needs at least one unit".into()));
                    }
                    Dense::new((channels, units), act_fn, l2).into()
                }
                LayerSpec::Conv1d {
                    filters,
                    kernel_size,
                    act_fn,
                } => {
                    if filters == 0 || kernel_size == 0 || kernel_size > steps {
                        return Err(invalid(format!(
                            "cannot convolve {steps} steps with {filters} filters of size {kernel_size}"
                        )));
                    }
                    Conv1d::new(channels, filters, kernel_size, act_fn).into()
                }
                LayerSpec::MaxPool1d { pool_size } => {
                    if pool_size == 0 || pool_size > steps {
                        return Err(invalid(format!(
                            "cannot pool {steps} steps in windows of {pool_size}"
                        )));
                    }
                    MaxPool1d::new(pool_size).into()
                }
                LayerSpec::Flatten => Flatten::new().into(),
                LayerSpec::Dropout { rate } => {
                    if !(0. ..1.).contains(&rate) {
                        return Err(invalid(format!("the dropout rate {rate} is not in [0, 1)")));
                    }
                    Dropout::new(rate, seed.wrapping_add(i as u64)).into()
                }
                LayerSpec::Lstm {
                    units,
                    return_sequences,
                } => {
                    if units == 0 {
                        return Err(invalid("an lstm layer needs at least one unit".into()));
                    }
                    Lstm::new(channels, units, return_sequences).into()
                }
            };

            (steps, channels) = layer.output_shape((steps, channels));
            layers.push(layer);
            shapes.push((steps, channels));
        }

        if steps != 1 {
            return Err(MlErr::InvalidSpec(format!(
                "the model outputs {steps} steps per sample, expected a single one"
            )));
        }

        Ok(Self {
            spec,
            layers,
            shapes,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// The shape of a single sample, as `(steps, channels)`.
    pub fn input_shape(&self) -> (usize, usize) {
        self.spec.input
    }

    /// The amount of values the model outputs per sample.
    pub fn output_len(&self) -> usize {
        self.shapes.last().map_or(self.spec.input.1, |&(_, c)| c)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(Layer::size).collect()
    }

    /// Generates a fresh set of parameters for this model.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<ParamManager> {
        let mut params = Vec::with_capacity(self.size());
        for layer in &self.layers {
            params.extend(layer.init_params(rng)?);
        }

        ParamManager::new(params, self.layer_sizes())
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `param_manager` - The manager of parameters.
    /// * `x` - The input data, one flattened sample per row.
    /// * `train` - Whether this pass is part of a training step.
    ///
    /// # Returns
    /// The prediction for the given input, one row per sample.
    pub fn forward(
        &mut self,
        param_manager: &ParamManager,
        x: ArrayView2<f32>,
        train: bool,
    ) -> Result<Array2<f32>> {
        self.check_params(param_manager)?;

        let mut x = self.reshape_input(x)?;
        for (layer, params) in self.layers.iter_mut().zip(param_manager.front()) {
            x = layer.forward(params, x, train)?;
        }

        let (b, _, c) = x.dim();
        Ok(x.into_shape_with_order((b, c))?)
    }

    /// Computes the gradient of the loss function with respect to the parameters of the model
    /// over the provided batches. **The parameters get updated** for each batch according to the
    /// optimization algorithm.
    ///
    /// # Arguments
    /// * `param_manager` - The manager of parameters.
    /// * `optimizer` - The optimizer that dictates how to update the parameters.
    /// * `loss_fn` - The loss function.
    /// * `batches` - The batches of data.
    ///
    /// # Returns
    /// The epoch (loss, accuracy).
    //
    // NOTE: the epoch loss is approximated by averaging the loss of each batch as it's computed
    // instead of forwarding over all batches again with the final parameters.
    pub fn backprop<'a, O, L, I>(
        &mut self,
        param_manager: &mut ParamManager,
        optimizer: &mut O,
        loss_fn: &L,
        batches: I,
    ) -> Result<(f32, f32)>
    where
        O: Optimizer + ?Sized,
        L: LossFn + ?Sized,
        I: Iterator<Item = (ArrayView2<'a, f32>, &'a [usize])>,
    {
        let mut total_loss = 0.0;
        let mut hits = 0;
        let mut seen = 0;
        let mut num_batches = 0;

        for (x, y) in batches {
            param_manager.zero_grad();

            let y_pred = self.forward(param_manager, x, true)?;
            total_loss += loss_fn.loss(y_pred.view(), y) + self.penalty(param_manager);
            hits += count_hits(&y_pred, y);
            seen += y.len();
            num_batches += 1;

            let (b, c) = y_pred.dim();
            let mut d: Array3<f32> = loss_fn
                .loss_prime(y_pred.view(), y)
                .into_shape_with_order((b, 1, c))?;

            for (layer, (params, grad)) in self.layers.iter_mut().rev().zip(param_manager.back()) {
                d = layer.backward(params, grad, d)?;
            }

            param_manager.optimize(optimizer)?;
        }

        if num_batches == 0 {
            return Err(MlErr::EmptyDataset);
        }

        Ok((total_loss / num_batches as f32, hits as f32 / seen as f32))
    }

    /// Predicts the output of every row of `x`, in inference mode.
    pub fn predict(
        &mut self,
        param_manager: &ParamManager,
        x: ArrayView2<f32>,
        batch_size: usize,
    ) -> Result<Array2<f32>> {
        let batch_size = batch_size.max(1);
        let mut outputs = Vec::with_capacity(x.nrows().div_ceil(batch_size));

        for batch in x.axis_chunks_iter(Axis(0), batch_size) {
            outputs.push(self.forward(param_manager, batch, false)?);
        }

        if outputs.is_empty() {
            return Ok(Array2::zeros((0, self.output_len())));
        }

        let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
        Ok(concatenate(Axis(0), &views)?)
    }

    /// Computes the loss and accuracy of the model over a dataset, in inference mode.
    pub fn evaluate<L: LossFn + ?Sized>(
        &mut self,
        param_manager: &ParamManager,
        dataset: &Dataset,
        loss_fn: &L,
        batch_size: usize,
    ) -> Result<(f32, f32)> {
        let mut total_loss = 0.0;
        let mut hits = 0;

        for (x, y) in dataset.batches(batch_size) {
            let y_pred = self.forward(param_manager, x, false)?;
            total_loss += loss_fn.loss(y_pred.view(), y) * y.len() as f32;
            hits += count_hits(&y_pred, y);
        }

        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let n = dataset.len() as f32;
        Ok((total_loss / n + self.penalty(param_manager), hits as f32 / n))
    }

    /// The sum of every layer's regularization term.
    pub fn penalty(&self, param_manager: &ParamManager) -> f32 {
        self.layers
            .iter()
            .zip(param_manager.front())
            .map(|(layer, params)| layer.penalty(params))
            .sum()
    }

    /// Describes the layers of the model, their output shapes and parameter counts.
    pub fn summary(&self) -> String {
        const RULE: usize = 65;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut out = String::new();

        let _ = writeln!(out, "{}", "_".repeat(RULE));
        let _ = writeln!(out, " {:<27} {:<25} {}", "Layer (type)", "Output Shape", "Param #");
        let _ = writeln!(out, "{}", "=".repeat(RULE));

        for (layer, &(steps, channels)) in self.layers.iter().zip(&self.shapes) {
            let count = counts.entry(layer.name()).or_default();
            let name = match *count {
                0 => layer.name().to_string(),
                n => format!("{}_{n}", layer.name()),
            };
            *count += 1;

            let shape = if steps == 1 {
                format!("(None, {channels})")
            } else {
                format!("(None, {steps}, {channels})")
            };

            let _ = writeln!(out, " {name:<27} {shape:<25} {}", group_thousands(layer.size()));
        }

        let _ = writeln!(out, "{}", "=".repeat(RULE));
        let _ = writeln!(out, "Total params: {}", group_thousands(self.size()));
        let _ = write!(out, "{}", "_".repeat(RULE));
        out
    }

    fn reshape_input(&self, x: ArrayView2<f32>) -> Result<Array3<f32>> {
        let (steps, channels) = self.spec.input;
        if x.ncols() != steps * channels {
            return Err(MlErr::SizeMismatch {
                what: "input features",
                got: x.ncols(),
                expected: steps * channels,
            });
        }

        let b = x.nrows();
        Ok(x.as_standard_layout()
            .into_owned()
            .into_shape_with_order((b, steps, channels))?)
    }

    fn check_params(&self, param_manager: &ParamManager) -> Result<()> {
        if param_manager.layer_sizes().len() != self.layers.len() || param_manager.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: param_manager.len(),
                expected: self.size(),
            });
        }

        Ok(())
    }
}

fn count_hits(y_pred: &Array2<f32>, y: &[usize]) -> usize {
    metrics::argmax_rows(y_pred.view())
        .into_iter()
        .zip(y)
        .filter(|(pred, y)| pred == *y)
        .count()
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}
