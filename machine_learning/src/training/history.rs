use serde::{Deserialize, Serialize};

use super::Monitor;

/// The metrics of a single training epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// The epoch number, starting at one.
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// The record of every epoch of a `Trainer::fit` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    epochs: Vec<EpochLogs>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, logs: EpochLogs) {
        self.epochs.push(logs);
    }

    pub fn epochs(&self) -> &[EpochLogs] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }

    /// Returns the epoch with the best value of `monitor`, the earliest one on ties.
    pub fn best(&self, monitor: Monitor) -> Option<&EpochLogs> {
        self.epochs.iter().fold(None, |best, logs| match best {
            Some(best) if !monitor.improves(monitor.value(logs), monitor.value(best), 0.) => {
                Some(best)
            }
            _ => Some(logs),
        })
    }
}
