use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;
use rand_distr::uniform::Error as UniformError;
use safetensors::SafeTensorError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    InvalidSpec(String),
    InvalidInput(String),
    Parse {
        line: usize,
        msg: String,
    },
    EmptyDataset,
    LabelOutOfRange {
        row: usize,
        label: usize,
        num_classes: usize,
    },
    InvalidSplit {
        train: usize,
        test: usize,
    },
    NotFitted,
    MissingTensor(String),
    MissingArchitecture,
    Distribution(UniformError),
    Io(io::Error),
    Json(serde_json::Error),
    SafeTensors(SafeTensorError),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "invalid tensor shape: {e}"),
            MlErr::InvalidSpec(msg) => write!(f, "invalid model spec: {msg}"),
            MlErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlErr::Parse { line, msg } => write!(f, "dataset line {line}: {msg}"),
            MlErr::EmptyDataset => write!(f, "the dataset is empty"),
            MlErr::LabelOutOfRange {
                row,
                label,
                num_classes,
            } => write!(
                f,
                "row {row} has label {label}, expected a label lower than {num_classes}"
            ),
            MlErr::InvalidSplit { train, test } => write!(
                f,
                "the split leaves {train} training and {test} test samples, both must be non-empty"
            ),
            MlErr::NotFitted => write!(f, "the classifier was used before being fitted"),
            MlErr::MissingTensor(name) => write!(f, "the artifact has no tensor named '{name}'"),
            MlErr::MissingArchitecture => {
                write!(f, "the artifact metadata does not describe an architecture")
            }
            MlErr::Distribution(e) => write!(f, "invalid distribution: {e}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Json(e) => write!(f, "json error: {e}"),
            MlErr::SafeTensors(e) => write!(f, "safetensors error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Distribution(e) => Some(e),
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            MlErr::SafeTensors(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::Distribution(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<SafeTensorError> for MlErr {
    fn from(value: SafeTensorError) -> Self {
        Self::SafeTensors(value)
    }
}
