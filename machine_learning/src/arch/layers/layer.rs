use ndarray::Array3;
use rand::Rng;

use super::{Conv1d, Dense, Dropout, Flatten, Lstm, MaxPool1d};
use crate::Result;

/// A layer of a `Sequential` model.
///
/// Layers don't own their parameters, each call receives the slice that belongs to it.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    Conv1d(Conv1d),
    MaxPool1d(MaxPool1d),
    Flatten(Flatten),
    Dropout(Dropout),
    Lstm(Lstm),
}

impl Layer {
    /// Returns the amount of parameters of this layer.
    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
            Self::Conv1d(l) => l.size(),
            Self::Lstm(l) => l.size(),
            Self::MaxPool1d(_) | Self::Flatten(_) | Self::Dropout(_) => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dense(_) => "dense",
            Self::Conv1d(_) => "conv1d",
            Self::MaxPool1d(_) => "max_pooling1d",
            Self::Flatten(_) => "flatten",
            Self::Dropout(_) => "dropout",
            Self::Lstm(_) => "lstm",
        }
    }

    /// The `(steps, channels)` shape of a sample after going through this layer.
    pub fn output_shape(&self, (steps, channels): (usize, usize)) -> (usize, usize) {
        match self {
            Self::Dense(l) => (steps, l.units()),
            Self::Conv1d(l) => (l.out_steps(steps), l.filters()),
            Self::MaxPool1d(l) => (l.out_steps(steps), channels),
            Self::Flatten(_) => (1, steps * channels),
            Self::Dropout(_) => (steps, channels),
            Self::Lstm(l) if l.return_sequences() => (steps, l.units()),
            Self::Lstm(l) => (1, l.units()),
        }
    }

    /// Returns the name and shape of each parameter tensor, in storage order.
    pub fn param_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        match self {
            Self::Dense(l) => l.param_shapes(),
            Self::Conv1d(l) => l.param_shapes(),
            Self::Lstm(l) => l.param_shapes(),
            Self::MaxPool1d(_) | Self::Flatten(_) | Self::Dropout(_) => Vec::new(),
        }
    }

    /// Generates the initial parameters of this layer.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        match self {
            Self::Dense(l) => l.init_params(rng),
            Self::Conv1d(l) => l.init_params(rng),
            Self::Lstm(l) => l.init_params(rng),
            Self::MaxPool1d(_) | Self::Flatten(_) | Self::Dropout(_) => Ok(Vec::new()),
        }
    }

    /// The regularization term this layer adds to the loss.
    pub fn penalty(&self, params: &[f32]) -> f32 {
        match self {
            Self::Dense(l) => l.penalty(params),
            _ => 0.,
        }
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The input, shaped `(batch, steps, channels)`.
    /// * `train` - Whether the pass is part of a training step.
    pub fn forward(&mut self, params: &[f32], x: Array3<f32>, train: bool) -> Result<Array3<f32>> {
        match self {
            Self::Dense(l) => l.forward(params, x),
            Self::Conv1d(l) => l.forward(params, x),
            Self::MaxPool1d(l) => Ok(l.forward(x)),
            Self::Flatten(l) => l.forward(x),
            Self::Dropout(l) => Ok(l.forward(x, train)),
            Self::Lstm(l) => Ok(l.forward(params, x)),
        }
    }

    /// Makes a backward pass through the layer, writing its gradient in `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - The buffer for this layer's gradient.
    /// * `d` - The derivative of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's input.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array3<f32>) -> Result<Array3<f32>> {
        match self {
            Self::Dense(l) => l.backward(params, grad, d),
            Self::Conv1d(l) => l.backward(params, grad, d),
            Self::MaxPool1d(l) => Ok(l.backward(d)),
            Self::Flatten(l) => l.backward(d),
            Self::Dropout(l) => Ok(l.backward(d)),
            Self::Lstm(l) => Ok(l.backward(params, grad, d)),
        }
    }
}

macro_rules! impl_from_layer {
    ($($variant:ident),*) => {
        $(
            impl From<super::$variant> for Layer {
                fn from(value: super::$variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_layer!(Dense, Conv1d, MaxPool1d, Flatten, Dropout, Lstm);
