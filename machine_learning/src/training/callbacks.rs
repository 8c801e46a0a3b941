use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use super::{EpochLogs, ParamManager};
use crate::{Result, arch::Sequential, checkpoint};

/// What the `Trainer` should do after a callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Stop,
}

/// The metric a callback watches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    Loss,
    Accuracy,
    #[default]
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    pub fn value(&self, logs: &EpochLogs) -> f32 {
        match self {
            Self::Loss => logs.loss,
            Self::Accuracy => logs.accuracy,
            Self::ValLoss => logs.val_loss,
            Self::ValAccuracy => logs.val_accuracy,
        }
    }

    /// Whether `current` beats `best` by more than `min_delta`. Losses improve downwards,
    /// accuracies upwards.
    pub fn improves(&self, current: f32, best: f32, min_delta: f32) -> bool {
        match self {
            Self::Loss | Self::ValLoss => current < best - min_delta,
            Self::Accuracy | Self::ValAccuracy => current > best + min_delta,
        }
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loss => "loss",
            Self::Accuracy => "accuracy",
            Self::ValLoss => "val_loss",
            Self::ValAccuracy => "val_accuracy",
        };

        write!(f, "{name}")
    }
}

/// A hook run by the `Trainer` at the end of every epoch.
pub trait Callback {
    /// Called once the epoch's metrics are known.
    ///
    /// # Arguments
    /// * `logs` - The metrics of the epoch that just ended.
    /// * `model` - The model being trained.
    /// * `param_manager` - The current parameters of the model.
    ///
    /// # Returns
    /// Whether training should go on.
    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        model: &Sequential,
        param_manager: &ParamManager,
    ) -> Result<Signal>;
}

/// Stops training once the monitored metric stops improving.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
    min_delta: f32,
    best: Option<f32>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    /// Creates a new `EarlyStopping` callback.
    ///
    /// # Arguments
    /// * `monitor` - The metric to watch.
    /// * `patience` - The amount of epochs without improvement after which training stops.
    /// * `min_delta` - The minimum change that counts as an improvement.
    pub fn new(monitor: Monitor, patience: usize, min_delta: f32) -> Self {
        Self {
            monitor,
            patience,
            min_delta: min_delta.abs(),
            best: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    /// The epoch training was stopped at, if it was.
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl Callback for EarlyStopping {
    fn on_epoch_end(&mut self, logs: &EpochLogs, _: &Sequential, _: &ParamManager) -> Result<Signal> {
        let current = self.monitor.value(logs);

        match self.best {
            Some(best) if !self.monitor.improves(current, best, self.min_delta) => self.wait += 1,
            _ => {
                self.best = Some(current);
                self.wait = 0;
            }
        }

        if self.wait < self.patience.max(1) {
            return Ok(Signal::Continue);
        }

        info!("epoch {}: early stopping", logs.epoch);
        self.stopped_epoch = Some(logs.epoch);
        Ok(Signal::Stop)
    }
}

/// Saves the model to a checkpoint as training progresses.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    path: PathBuf,
    monitor: Monitor,
    save_best_only: bool,
    best: Option<f32>,
}

impl ModelCheckpoint {
    /// Creates a new `ModelCheckpoint` callback.
    ///
    /// # Arguments
    /// * `path` - Where to write the checkpoint, overwritten on every save.
    /// * `monitor` - The metric that decides which epoch is the best one.
    /// * `save_best_only` - Whether to save only when `monitor` improves instead of every epoch.
    pub fn new<P: AsRef<Path>>(path: P, monitor: Monitor, save_best_only: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            monitor,
            save_best_only,
            best: None,
        }
    }

    /// The best value of the monitored metric seen so far.
    pub fn best(&self) -> Option<f32> {
        self.best
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        model: &Sequential,
        param_manager: &ParamManager,
    ) -> Result<Signal> {
        let current = self.monitor.value(logs);
        let improved = self
            .best
            .is_none_or(|best| self.monitor.improves(current, best, 0.));

        if improved {
            match self.best {
                Some(best) => info!(
                    "epoch {}: {} improved from {best:.5} to {current:.5}, saving model to {}",
                    logs.epoch,
                    self.monitor,
                    self.path.display()
                ),
                None => info!(
                    "epoch {}: {} is {current:.5}, saving model to {}",
                    logs.epoch,
                    self.monitor,
                    self.path.display()
                ),
            }
            self.best = Some(current);
        }

        if improved || !self.save_best_only {
            checkpoint::save(&self.path, model, param_manager)?;
        }

        Ok(Signal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{LayerSpec, ModelSpec};
    use rand::{SeedableRng, rngs::StdRng};

    fn logs(epoch: usize, val_loss: f32) -> EpochLogs {
        EpochLogs {
            epoch,
            loss: 0.,
            accuracy: 0.,
            val_loss,
            val_accuracy: 0.,
        }
    }

    fn model() -> (Sequential, ParamManager) {
        let spec = ModelSpec::new((1, 2), [LayerSpec::dense(2, None)]);
        let model = Sequential::new(spec, 0).unwrap();
        let pm = model.init_params(&mut StdRng::seed_from_u64(0)).unwrap();
        (model, pm)
    }

    #[test]
    fn early_stopping_waits_patience_epochs() {
        let (model, pm) = model();
        let mut early = EarlyStopping::new(Monitor::ValLoss, 3, 0.);

        let losses = [1.0, 0.8, 0.9, 0.85, 0.8];
        let signals: Vec<_> = losses
            .iter()
            .enumerate()
            .map(|(i, &l)| early.on_epoch_end(&logs(i + 1, l), &model, &pm).unwrap())
            .collect();

        assert_eq!(
            signals,
            [
                Signal::Continue,
                Signal::Continue,
                Signal::Continue,
                Signal::Continue,
                Signal::Stop
            ]
        );
        assert_eq!(early.stopped_epoch(), Some(5));
    }

    #[test]
    fn early_stopping_ignores_improvements_below_min_delta() {
        let (model, pm) = model();
        let mut early = EarlyStopping::new(Monitor::ValLoss, 1, 0.1);

        assert_eq!(early.on_epoch_end(&logs(1, 1.0), &model, &pm).unwrap(), Signal::Continue);
        assert_eq!(early.on_epoch_end(&logs(2, 0.95), &model, &pm).unwrap(), Signal::Stop);
    }

    #[test]
    fn improvements_follow_the_metric_direction() {
        assert!(Monitor::ValLoss.improves(0.5, 0.6, 0.));
        assert!(!Monitor::ValLoss.improves(0.6, 0.5, 0.));
        assert!(Monitor::ValAccuracy.improves(0.6, 0.5, 0.));
        assert!(!Monitor::Accuracy.improves(0.55, 0.5, 0.1));
    }

    #[test]
    fn checkpoint_saves_only_on_improvement() {
        let (model, pm) = model();
        let path = std::env::temp_dir().join(format!(
            "checkpoint-callback-{}.safetensors",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let mut checkpoint = ModelCheckpoint::new(&path, Monitor::ValLoss, true);
        checkpoint.on_epoch_end(&logs(1, 0.5), &model, &pm).unwrap();
        assert!(path.exists());
        assert_eq!(checkpoint.best(), Some(0.5));

        std::fs::remove_file(&path).unwrap();
        checkpoint.on_epoch_end(&logs(2, 0.7), &model, &pm).unwrap();
        assert!(!path.exists());
        assert_eq!(checkpoint.best(), Some(0.5));

        checkpoint.on_epoch_end(&logs(3, 0.4), &model, &pm).unwrap();
        assert!(path.exists());
        assert_eq!(checkpoint.best(), Some(0.4));

        std::fs::remove_file(&path).unwrap();
    }
}
