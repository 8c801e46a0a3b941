//! Trains hand gesture classifiers over 2D hand keypoints.

pub mod config;
pub mod menu;
pub mod pipeline;

pub use config::Config;
pub use menu::ModelChoice;
