mod conv1d;
mod dense;
mod dropout;
mod flatten;
mod layer;
mod lstm;
mod max_pool1d;
mod reshape;

pub use conv1d::Conv1d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use layer::Layer;
pub use lstm::Lstm;
pub use max_pool1d::MaxPool1d;
