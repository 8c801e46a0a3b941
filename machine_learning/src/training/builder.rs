use std::num::NonZeroUsize;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::Trainer;
use crate::{
    MlErr, Result,
    arch::{Sequential, loss::SparseCategoricalCrossEntropy},
    optimization::{Adam, GradientDescent},
};

/// The optimization algorithm of a `TrainerSpec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    #[default]
    Adam,
    GradientDescent,
}

/// A serializable description of a `Trainer`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainerSpec {
    pub optimizer: OptimizerSpec,
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Seeds the shuffling of the training set, a random one is drawn if absent.
    pub seed: Option<u64>,
}

impl Default for TrainerSpec {
    fn default() -> Self {
        Self {
            optimizer: OptimizerSpec::Adam,
            learning_rate: 1e-3,
            epochs: 1000,
            batch_size: 128,
            seed: None,
        }
    }
}

/// Builds `Trainer`s given a specification.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Trainer` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification for the trainer.
    /// * `model` - The model the trainer will train, it sizes the optimizer state.
    ///
    /// # Returns
    /// A trainer without callbacks, or an error if the spec is out of range.
    pub fn build(&self, spec: &TrainerSpec, model: &Sequential) -> Result<Trainer> {
        if !(spec.learning_rate.is_finite() && spec.learning_rate > 0.) {
            return Err(MlErr::InvalidInput(format!(
                "the learning rate must be positive, got {}",
                spec.learning_rate
            )));
        }

        if spec.epochs == 0 {
            return Err(MlErr::InvalidInput("at least one epoch is needed".into()));
        }

        let batch_size = NonZeroUsize::new(spec.batch_size)
            .ok_or_else(|| MlErr::InvalidInput("the batch size must be positive".into()))?;
        let rng = self.generate_rng(spec.seed);
        let loss_fn = SparseCategoricalCrossEntropy::new();

        let trainer = match spec.optimizer {
            OptimizerSpec::Adam => {
                let optimizer = Adam::with_learning_rate(model.size(), spec.learning_rate);
                Trainer::new(optimizer, loss_fn, spec.epochs, batch_size, rng)
            }
            OptimizerSpec::GradientDescent => {
                let optimizer = GradientDescent::new(spec.learning_rate);
                Trainer::new(optimizer, loss_fn, spec.epochs, batch_size, rng)
            }
        };

        Ok(trainer)
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
