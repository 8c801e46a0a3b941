#![cfg(test)]

use std::num::NonZeroUsize;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    arch::{LayerSpec, ModelSpec, Sequential, activations::ActFn, loss::SparseCategoricalCrossEntropy},
    dataset::Dataset,
    metrics,
    optimization::{Adam, GradientDescent, Optimizer},
    training::Trainer,
};

fn train<O>(spec: ModelSpec, optimizer: impl FnOnce(usize) -> O, dataset: Dataset, epochs: usize) -> f32
where
    O: Optimizer + 'static,
{
    let mut model = Sequential::new(spec, 0).unwrap();
    let mut params = model.init_params(&mut StdRng::seed_from_u64(42)).unwrap();

    let mut trainer = Trainer::new(
        optimizer(params.len()),
        SparseCategoricalCrossEntropy,
        epochs,
        NonZeroUsize::new(8).unwrap(),
        StdRng::seed_from_u64(0),
    );

    let validation = dataset.clone();
    let mut train = dataset;
    trainer
        .fit(&mut model, &mut params, &mut train, &validation)
        .unwrap();

    let y = model.predict(&params, validation.features(), 32).unwrap();
    metrics::accuracy(validation.labels(), &metrics::argmax_rows(y.view())).unwrap()
}

#[test]
fn test_ml_xor2_gate_convergence() {
    let xor2 = Dataset::new(
        vec![
            0.0, 0.0, //
            0.0, 1.0, //
            1.0, 0.0, //
            1.0, 1.0, //
        ],
        vec![0, 1, 1, 0],
        2,
    )
    .unwrap();

    let spec = ModelSpec::new(
        (1, 2),
        [
            LayerSpec::dense(8, Some(ActFn::Tanh)),
            LayerSpec::dense(2, Some(ActFn::Softmax)),
        ],
    );

    let accuracy = train(spec, |len| Adam::with_learning_rate(len, 0.05), xor2, 300);
    assert_eq!(accuracy, 1.);
}

#[test]
fn test_ml_and2_gate_convergence_with_gradient_descent() {
    let and2 = Dataset::new(
        vec![
            0.0, 0.0, //
            0.0, 1.0, //
            1.0, 0.0, //
            1.0, 1.0, //
        ],
        vec![0, 0, 0, 1],
        2,
    )
    .unwrap();

    let spec = ModelSpec::new((1, 2), [LayerSpec::dense(2, Some(ActFn::Softmax))]);

    let accuracy = train(spec, |_| GradientDescent::new(1.), and2, 500);
    assert_eq!(accuracy, 1.);
}

/// Sequences of 8 steps with a bump either in the first or the second half.
fn bumps(n: usize, rng: &mut StdRng) -> Dataset {
    let mut xs = Vec::with_capacity(n * 8);
    let mut ys = Vec::with_capacity(n);

    for i in 0..n {
        let label = i % 2;
        let at = label * 4 + rng.random_range(0..3);

        for t in 0..8 {
            let bump = if t == at || t == at + 1 { 1. } else { 0. };
            xs.push(bump + rng.random_range(-0.05..0.05));
        }
        ys.push(label);
    }

    Dataset::new(xs, ys, 8).unwrap()
}

#[test]
fn test_ml_conv1d_finds_the_bump() {
    let dataset = bumps(40, &mut StdRng::seed_from_u64(1));
    let spec = ModelSpec::new(
        (8, 1),
        [
            LayerSpec::conv1d(4, 3, Some(ActFn::Relu)),
            LayerSpec::MaxPool1d { pool_size: 2 },
            LayerSpec::Flatten,
            LayerSpec::dense(2, Some(ActFn::Softmax)),
        ],
    );

    let accuracy = train(spec, |len| Adam::with_learning_rate(len, 0.02), dataset, 60);
    assert!(accuracy >= 0.9, "accuracy {accuracy}");
}

#[test]
fn test_ml_lstm_tells_rising_from_falling() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut xs = Vec::new();
    let mut ys = Vec::new();

    for i in 0..40 {
        let label = i % 2;
        let slope = if label == 0 { 0.15 } else { -0.15 };
        let start = rng.random_range(-0.3..0.3);
        xs.extend((0..6).map(|t| start + slope * t as f32));
        ys.push(label);
    }

    let dataset = Dataset::new(xs, ys, 6).unwrap();
    let spec = ModelSpec::new(
        (6, 1),
        [
            LayerSpec::lstm(4, false),
            LayerSpec::dense(2, Some(ActFn::Softmax)),
        ],
    );

    let accuracy = train(spec, |len| Adam::with_learning_rate(len, 0.05), dataset, 60);
    assert!(accuracy >= 0.9, "accuracy {accuracy}");
}
