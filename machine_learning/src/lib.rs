pub mod arch;
pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod initialization;
pub mod metrics;
pub mod neighbors;
pub mod optimization;
pub mod quant;
mod test;
pub mod training;

pub use error::{MlErr, Result};
