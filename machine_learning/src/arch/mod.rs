pub mod activations;
pub mod layers;
pub mod loss;
mod sequential;
mod spec;

pub use sequential::Sequential;
pub use spec::{LayerSpec, ModelSpec};
