use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail, ensure};
use machine_learning::{
    quant::Precision,
    training::{OptimizerSpec, TrainerSpec},
};
use serde::{Deserialize, Serialize};

/// The environment variable holding the path of a JSON config file.
pub const CONFIG_ENV: &str = "CONFIG";

/// The settings of a training run. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub quantized_path: PathBuf,

    /// The amount of coordinates per sample, 21 landmarks times (x, y).
    pub features: usize,
    pub num_classes: usize,

    pub seed: u64,
    pub train_size: f32,
    pub stratify: bool,

    pub optimizer: OptimizerSpec,
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    pub min_delta: f32,
    pub save_best_only: bool,

    pub neighbors: usize,
    pub precision: Precision,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_path: "model/keypoint_classifier/keypoint.csv".into(),
            model_path: "model/keypoint_classifier/keypoint_classifier.safetensors".into(),
            quantized_path: "model/keypoint_classifier/keypoint_classifier.quant.safetensors".into(),
            features: 21 * 2,
            num_classes: 5,
            seed: 42,
            train_size: 0.75,
            stratify: true,
            optimizer: OptimizerSpec::Adam,
            learning_rate: 1e-3,
            epochs: 1000,
            batch_size: 128,
            patience: 20,
            min_delta: 0.,
            save_best_only: true,
            neighbors: 5,
            precision: Precision::Int8,
        }
    }
}

impl Config {
    /// Reads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `CONFIG`, or the defaults when it isn't set.
    pub fn from_env() -> anyhow::Result<Self> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.features > 0, "features must be positive");
        ensure!(self.num_classes > 1, "at least two classes are needed");
        ensure!(
            self.train_size > 0. && self.train_size < 1.,
            "train_size must be in (0, 1), got {}",
            self.train_size
        );
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.neighbors > 0, "neighbors must be positive");
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.,
            "learning_rate must be positive, got {}",
            self.learning_rate
        );
        ensure!(self.min_delta >= 0., "min_delta must not be negative");

        if self.model_path == self.quantized_path {
            bail!(
                "the model and the quantized model can't share a path ({})",
                self.model_path.display()
            );
        }

        Ok(())
    }

    pub fn trainer_spec(&self) -> TrainerSpec {
        TrainerSpec {
            optimizer: self.optimizer,
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            batch_size: self.batch_size,
            seed: Some(self.seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        assert_eq!(config.features, 42);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.trainer_spec().seed, Some(42));
    }

    #[test]
    fn missing_fields_take_their_default() {
        let config: Config =
            serde_json::from_str(r#"{ "epochs": 3, "optimizer": "gradient_descent" }"#).unwrap();

        assert_eq!(config.epochs, 3);
        assert_eq!(config.optimizer, OptimizerSpec::GradientDescent);
        assert_eq!(config.patience, 20);
        assert_eq!(config.precision, Precision::Int8);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{ "epoch": 3 }"#).is_err());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let configs = [
            Config {
                train_size: 1.,
                ..Default::default()
            },
            Config {
                batch_size: 0,
                ..Default::default()
            },
            Config {
                learning_rate: -1.,
                ..Default::default()
            },
            Config {
                quantized_path: Config::default().model_path,
                ..Default::default()
            },
        ];

        for config in configs {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn load_reads_precision_names() {
        let path = env::temp_dir().join(format!("keypoint-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "precision": "float16", "neighbors": 3 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.precision, Precision::Float16);
        assert_eq!(config.neighbors, 3);

        fs::remove_file(&path).unwrap();
    }
}
