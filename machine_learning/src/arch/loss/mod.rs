mod cross_entropy;
mod loss_fn;

pub use cross_entropy::SparseCategoricalCrossEntropy;
pub use loss_fn::LossFn;
