use std::num::NonZeroUsize;

use log::{debug, info};
use rand::rngs::StdRng;

use super::{Callback, EpochLogs, History, ParamManager, Signal};
use crate::{
    Result,
    arch::{Sequential, loss::LossFn},
    dataset::Dataset,
    optimization::Optimizer,
};

/// Trains a `Sequential` model. Contains the components that drive the training: the optimizer,
/// the loss function and the callbacks run after each epoch.
pub struct Trainer {
    optimizer: Box<dyn Optimizer>,
    loss_fn: Box<dyn LossFn>,
    callbacks: Vec<Box<dyn Callback>>,

    epochs: usize,
    batch_size: NonZeroUsize,
    rng: StdRng,
}

impl Trainer {
    /// Returns a new `Trainer`.
    ///
    /// # Arguments
    /// * `optimizer` - The optimizer that dictates how the parameters move.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `epochs` - The maximum amount of passes over the training set.
    /// * `batch_size` - The amount of rows per optimization step.
    /// * `rng` - The random number generator used to shuffle the training set.
    pub fn new<O, L>(optimizer: O, loss_fn: L, epochs: usize, batch_size: NonZeroUsize, rng: StdRng) -> Self
    where
        O: Optimizer + 'static,
        L: LossFn + 'static,
    {
        Self {
            optimizer: Box::new(optimizer),
            loss_fn: Box::new(loss_fn),
            callbacks: Vec::new(),
            epochs,
            batch_size,
            rng,
        }
    }

    /// Adds a callback, callbacks run in the order they were added.
    pub fn with_callback<C: Callback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn loss_fn(&self) -> &dyn LossFn {
        self.loss_fn.as_ref()
    }

    /// Trains the model until the epochs run out or a callback stops it.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `param_manager` - The parameters of `model`, updated in place.
    /// * `train` - The training set, reshuffled every epoch.
    /// * `validation` - The set evaluated at the end of every epoch.
    ///
    /// # Returns
    /// The metrics of every epoch that ran.
    pub fn fit(
        &mut self,
        model: &mut Sequential,
        param_manager: &mut ParamManager,
        train: &mut Dataset,
        validation: &Dataset,
    ) -> Result<History> {
        let batch_size = self.batch_size.get();
        let mut history = History::new();

        info!(
            "training on {} samples, validating on {} samples",
            train.len(),
            validation.len()
        );

        for epoch in 1..=self.epochs {
            train.shuffle(&mut self.rng);
            debug!(epoch = epoch; "starting epoch");

            let (loss, accuracy) = model.backprop(
                param_manager,
                self.optimizer.as_mut(),
                self.loss_fn.as_ref(),
                train.batches(batch_size),
            )?;
            let (val_loss, val_accuracy) =
                model.evaluate(param_manager, validation, self.loss_fn.as_ref(), batch_size)?;

            let logs = EpochLogs {
                epoch,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
            };
            info!(
                "epoch {epoch}/{}: loss={loss:.4} accuracy={accuracy:.4} val_loss={val_loss:.4} val_accuracy={val_accuracy:.4}",
                self.epochs
            );
            history.push(logs);

            let mut stop = false;
            for callback in &mut self.callbacks {
                stop |= callback.on_epoch_end(&logs, model, param_manager)? == Signal::Stop;
            }

            if stop {
                break;
            }
        }

        Ok(history)
    }
}
