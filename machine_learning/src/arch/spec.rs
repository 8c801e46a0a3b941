use serde::{Deserialize, Serialize};

use super::activations::ActFn;

/// A serializable description of a `Sequential` model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// The shape of a single sample, as `(steps, channels)`.
    pub input: (usize, usize),
    pub layers: Vec<LayerSpec>,
}

/// A serializable description of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        units: usize,
        act_fn: Option<ActFn>,
        #[serde(default)]
        l2: Option<f32>,
    },
    Conv1d {
        filters: usize,
        kernel_size: usize,
        act_fn: Option<ActFn>,
    },
    MaxPool1d {
        pool_size: usize,
    },
    Flatten,
    Dropout {
        rate: f32,
    },
    Lstm {
        units: usize,
        return_sequences: bool,
    },
}

impl ModelSpec {
    /// Creates a new `ModelSpec`.
    ///
    /// # Arguments
    /// * `input` - The shape of a single sample, as `(steps, channels)`.
    /// * `layers` - The layers, in forward order.
    pub fn new<I>(input: (usize, usize), layers: I) -> Self
    where
        I: IntoIterator<Item = LayerSpec>,
    {
        Self {
            input,
            layers: layers.into_iter().collect(),
        }
    }
}

impl LayerSpec {
    pub fn dense(units: usize, act_fn: Option<ActFn>) -> Self {
        Self::Dense {
            units,
            act_fn,
            l2: None,
        }
    }

    pub fn conv1d(filters: usize, kernel_size: usize, act_fn: Option<ActFn>) -> Self {
        Self::Conv1d {
            filters,
            kernel_size,
            act_fn,
        }
    }

    pub fn lstm(units: usize, return_sequences: bool) -> Self {
        Self::Lstm {
            units,
            return_sequences,
        }
    }

    pub fn dropout(rate: f32) -> Self {
        Self::Dropout { rate }
    }

    /// Adds an L2 penalty over the kernel of a `Dense` spec, other specs are left untouched.
    pub fn with_l2(self, coefficient: f32) -> Self {
        match self {
            Self::Dense { units, act_fn, .. } => Self::Dense {
                units,
                act_fn,
                l2: Some(coefficient),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_round_trip_through_json() {
        let spec = ModelSpec::new(
            (42, 1),
            [
                LayerSpec::conv1d(64, 3, Some(ActFn::Relu)),
                LayerSpec::MaxPool1d { pool_size: 2 },
                LayerSpec::Flatten,
                LayerSpec::dense(5, Some(ActFn::Softmax)).with_l2(0.01),
            ],
        );

        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains(r#""type":"conv1d""#));
        assert!(json.contains(r#""act_fn":"softmax""#));
        assert_eq!(serde_json::from_str::<ModelSpec>(&json).unwrap(), spec);
    }

    #[test]
    fn l2_defaults_to_none() {
        let layer: LayerSpec =
            serde_json::from_str(r#"{"type":"dense","units":3,"act_fn":null}"#).unwrap();
        assert_eq!(layer, LayerSpec::dense(3, None));
    }
}
