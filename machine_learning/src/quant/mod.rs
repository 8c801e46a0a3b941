//! Post-training quantization: a `Converter` shrinks a trained model into a compact artifact and
//! an `Interpreter` runs inference from it.

mod converter;
mod interpreter;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use converter::Converter;
pub use interpreter::Interpreter;

pub(crate) const PRECISION_KEY: &str = "precision";
pub(crate) const SCALE_SUFFIX: &str = "scale";

/// The numeric precision kernels are stored with. Biases always stay `f32`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Symmetric 8 bit integers with one scale per output channel.
    #[default]
    Int8,
    Float16,
}

impl Precision {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "int8" => Some(Self::Int8),
            "float16" => Some(Self::Float16),
            _ => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8 => write!(f, "int8"),
            Self::Float16 => write!(f, "float16"),
        }
    }
}

/// Whether a parameter tensor gets quantized.
fn is_quantized(param: &str) -> bool {
    param != "bias"
}
