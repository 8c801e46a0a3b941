use std::io::Write;

use anyhow::{Context, ensure};
use log::{info, warn};
use machine_learning::{
    arch::Sequential,
    checkpoint,
    dataset::Dataset,
    metrics::{self, ClassificationReport, ConfusionMatrix},
    neighbors::KNeighborsClassifier,
    quant::{Converter, Interpreter},
    training::{EarlyStopping, History, ModelCheckpoint, Monitor, TrainerBuilder},
};
use ndarray::ArrayView2;
use rand::{SeedableRng, rngs::StdRng};

use crate::{config::Config, menu::ModelChoice};

/// What a run produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub choice: ModelChoice,
    /// The accuracy over the test split.
    pub accuracy: f32,
    pub report: ClassificationReport,
    pub network: Option<NetworkOutcome>,
}

/// The extra results of training a network.
#[derive(Debug, Clone)]
pub struct NetworkOutcome {
    pub history: History,
    pub val_loss: f32,
    pub val_accuracy: f32,
    /// The output of the best checkpoint for the first test sample.
    pub sample_prediction: Vec<f32>,
    /// The output of the quantized model for the same sample.
    pub quantized_prediction: Vec<f32>,
    /// The fraction of test samples where the quantized model predicts the same class.
    pub quantized_agreement: f32,
}

/// Loads the dataset and splits it in (train, test) partitions.
pub fn load_splits(config: &Config, rng: &mut StdRng) -> anyhow::Result<(Dataset, Dataset)> {
    let dataset = Dataset::from_csv(&config.dataset_path, config.features)
        .with_context(|| format!("loading dataset {}", config.dataset_path.display()))?;
    dataset.validate_labels(config.num_classes)?;
    info!(
        "loaded {} samples from {}",
        dataset.len(),
        config.dataset_path.display()
    );

    let (train, test) = dataset.split(config.train_size, rng, config.stratify)?;
    Ok((train, test))
}

/// Runs the whole training pipeline for `choice`, printing results to `out`.
pub fn run<W: Write>(config: &Config, choice: ModelChoice, out: &mut W) -> anyhow::Result<Outcome> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train, test) = load_splits(config, &mut rng)?;
    writeln!(out, "train: {:?}", (train.len(), train.x_size()))?;
    writeln!(out, "test: {:?}", (test.len(), test.x_size()))?;
    info!("training a {choice} model");

    match choice.spec(config.features, config.num_classes) {
        Some(spec) => {
            let model = Sequential::new(spec, config.seed)?;
            run_network(config, choice, model, train, test, &mut rng, out)
        }
        None => run_neighbors(config, choice, &train, &test, out),
    }
}

fn run_neighbors<W: Write>(
    config: &Config,
    choice: ModelChoice,
    train: &Dataset,
    test: &Dataset,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    let mut knn = KNeighborsClassifier::new(config.neighbors)?;
    knn.fit(train)?;
    let y_pred = knn.predict(test.features())?;

    let report = ClassificationReport::new(test.labels(), &y_pred)?;
    let accuracy = metrics::accuracy(test.labels(), &y_pred)?;
    writeln!(out, "{report}")?;
    writeln!(out, "{accuracy}")?;

    Ok(Outcome {
        choice,
        accuracy,
        report,
        network: None,
    })
}

fn run_network<W: Write>(
    config: &Config,
    choice: ModelChoice,
    mut model: Sequential,
    mut train: Dataset,
    test: Dataset,
    rng: &mut StdRng,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    writeln!(out, "{}", model.summary())?;
    let mut params = model.init_params(rng)?;

    let mut trainer = TrainerBuilder::new()
        .build(&config.trainer_spec(), &model)?
        .with_callback(ModelCheckpoint::new(
            &config.model_path,
            Monitor::ValLoss,
            config.save_best_only,
        ))
        .with_callback(EarlyStopping::new(
            Monitor::ValLoss,
            config.patience,
            config.min_delta,
        ));

    let history = trainer.fit(&mut model, &mut params, &mut train, &test)?;
    if let Some(best) = history.best(Monitor::ValLoss) {
        info!(
            "best epoch {}: val_loss={:.4} val_accuracy={:.4}",
            best.epoch, best.val_loss, best.val_accuracy
        );
    }

    let (val_loss, val_accuracy) =
        model.evaluate(&params, &test, trainer.loss_fn(), config.batch_size)?;
    info!("test loss={val_loss:.4} accuracy={val_accuracy:.4}");

    let (mut best, best_params) = checkpoint::load(&config.model_path)
        .with_context(|| format!("reloading checkpoint {}", config.model_path.display()))?;

    let sample = test.row(0);
    let sample_view = ArrayView2::from_shape((1, sample.len()), sample)?;
    let sample_prediction: Vec<f32> = best
        .predict(&best_params, sample_view, 1)?
        .iter()
        .copied()
        .collect();
    print_prediction(out, &sample_prediction)?;

    let y_prob = best.predict(&best_params, test.features(), config.batch_size)?;
    let y_pred = metrics::argmax_rows(y_prob.view());
    let matrix = ConfusionMatrix::new(test.labels(), &y_pred)?;
    let report = ClassificationReport::new(test.labels(), &y_pred)?;
    writeln!(out, "{matrix}")?;
    writeln!(out, "Classification Report")?;
    writeln!(out, "{report}")?;

    checkpoint::save(&config.model_path, &best, &best_params)?;
    info!("model saved to {}", config.model_path.display());

    Converter::new(config.precision)
        .save(&config.quantized_path, &best, &best_params)
        .with_context(|| format!("writing {}", config.quantized_path.display()))?;

    let mut interpreter = Interpreter::from_file(&config.quantized_path)?;
    ensure!(
        interpreter.input_len() == sample.len(),
        "the quantized model expects {} features, the dataset has {}",
        interpreter.input_len(),
        sample.len()
    );
    let quantized_prediction = interpreter.invoke(sample)?;
    print_prediction(out, &quantized_prediction)?;
    check_parity(&sample_prediction, &quantized_prediction);

    let y_quantized = interpreter.predict(test.features(), config.batch_size)?;
    let y_quantized = metrics::argmax_rows(y_quantized.view());
    let quantized_agreement = metrics::accuracy(&y_pred, &y_quantized)?;
    info!(
        "quantized model agrees with the full model on {:.2}% of the test samples",
        quantized_agreement * 100.
    );

    Ok(Outcome {
        choice,
        accuracy: report.accuracy(),
        report,
        network: Some(NetworkOutcome {
            history,
            val_loss,
            val_accuracy,
            sample_prediction,
            quantized_prediction,
            quantized_agreement,
        }),
    })
}

/// Prints a probability vector and its most likely class.
fn print_prediction<W: Write>(out: &mut W, probabilities: &[f32]) -> anyhow::Result<()> {
    let values: Vec<String> = probabilities.iter().map(|p| format!("{p:.8}")).collect();
    writeln!(out, "[{}]", values.join(" "))?;
    writeln!(out, "{}", metrics::argmax(probabilities))?;
    Ok(())
}

fn check_parity(full: &[f32], quantized: &[f32]) {
    let max_diff = full
        .iter()
        .zip(quantized)
        .map(|(a, b)| (a - b).abs())
        .fold(0f32, f32::max);

    let (full_class, quantized_class) = (metrics::argmax(full), metrics::argmax(quantized));
    if full_class == quantized_class {
        info!("quantized inference agrees with the full model (max difference {max_diff:.6})");
    } else {
        warn!(
            "quantized inference predicts class {quantized_class} where the full model predicts {full_class} (max difference {max_diff:.6})"
        );
    }
}
