mod constant;
mod random;

pub use constant::ConstWeightGen;
pub use random::RandWeightGen;
