mod builder;
mod callbacks;
mod history;
mod param_manager;
mod trainer;

pub use builder::{OptimizerSpec, TrainerBuilder, TrainerSpec};
pub use callbacks::{Callback, EarlyStopping, ModelCheckpoint, Monitor, Signal};
pub use history::{EpochLogs, History};
pub use param_manager::{BackIter, FrontIter, ParamManager};
pub use trainer::Trainer;
