use std::{fs, path::Path};

use half::f16;
use ndarray::{Array2, ArrayView2};
use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};

use super::{PRECISION_KEY, Precision, SCALE_SUFFIX, is_quantized};
use crate::{
    MlErr, Result,
    arch::Sequential,
    checkpoint::{check_tensor, f32s_from_le_bytes, read_architecture, tensor_name},
    training::ParamManager,
};

/// Runs inference from a quantized artifact.
///
/// The weights are dequantized once when the artifact is loaded, so every `invoke` runs at full
/// precision over the rounded weights.
#[derive(Debug, Clone)]
pub struct Interpreter {
    model: Sequential,
    param_manager: ParamManager,
    precision: Precision,
}

impl Interpreter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Loads an artifact written by a `Converter`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let precision = read_precision(bytes)?;
        let model = Sequential::new(read_architecture(bytes)?, 0)?;
        let tensors = SafeTensors::deserialize(bytes)?;

        let mut params = Vec::with_capacity(model.size());
        for (i, layer) in model.layers().iter().enumerate() {
            for (param, shape) in layer.param_shapes() {
                let name = tensor_name(i, param);

                if !is_quantized(param) {
                    let tensor = find(&tensors, &name)?;
                    check_tensor(&name, &tensor, Dtype::F32, &shape)?;
                    params.extend(f32s_from_le_bytes(tensor.data()));
                    continue;
                }

                match precision {
                    Precision::Int8 => params.extend(dequantize_int8(&tensors, &name, &shape)?),
                    Precision::Float16 => {
                        let tensor = find(&tensors, &name)?;
                        check_tensor(&name, &tensor, Dtype::F16, &shape)?;
                        params.extend(
                            tensor
                                .data()
                                .chunks_exact(2)
                                .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32()),
                        );
                    }
                }
            }
        }

        let param_manager = ParamManager::new(params, model.layer_sizes())?;
        Ok(Self {
            model,
            param_manager,
            precision,
        })
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// The shape of a single sample, as `(steps, channels)`.
    pub fn input_shape(&self) -> (usize, usize) {
        self.model.input_shape()
    }

    pub fn input_len(&self) -> usize {
        let (steps, channels) = self.input_shape();
        steps * channels
    }

    pub fn output_len(&self) -> usize {
        self.model.output_len()
    }

    /// Runs a single sample through the model.
    ///
    /// # Arguments
    /// * `features` - The flattened sample.
    ///
    /// # Returns
    /// The output of the model, class probabilities for a classifier.
    pub fn invoke(&mut self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.input_len() {
            return Err(MlErr::SizeMismatch {
                what: "input features",
                got: features.len(),
                expected: self.input_len(),
            });
        }

        let x = ArrayView2::from_shape((1, features.len()), features)?;
        let y = self.model.forward(&self.param_manager, x, false)?;
        Ok(y.iter().copied().collect())
    }

    /// Runs every row of `x` through the model.
    pub fn predict(&mut self, x: ArrayView2<f32>, batch_size: usize) -> Result<Array2<f32>> {
        self.model.predict(&self.param_manager, x, batch_size)
    }
}

fn find<'data>(tensors: &SafeTensors<'data>, name: &str) -> Result<TensorView<'data>> {
    tensors
        .tensor(name)
        .map_err(|_| MlErr::MissingTensor(name.to_string()))
}

fn read_precision(bytes: &[u8]) -> Result<Precision> {
    let (_, metadata) = SafeTensors::read_metadata(bytes)?;
    let precision = metadata
        .metadata()
        .as_ref()
        .and_then(|m| m.get(PRECISION_KEY))
        .ok_or_else(|| MlErr::InvalidInput("the artifact does not state its precision".into()))?;

    Precision::parse(precision)
        .ok_or_else(|| MlErr::InvalidInput(format!("unknown precision '{precision}'")))
}

fn dequantize_int8(tensors: &SafeTensors, name: &str, shape: &[usize]) -> Result<Vec<f32>> {
    let channels = shape.last().copied().unwrap_or(1);

    let tensor = find(tensors, name)?;
    check_tensor(name, &tensor, Dtype::I8, shape)?;

    let scale_name = format!("{name}.{SCALE_SUFFIX}");
    let scale = find(tensors, &scale_name)?;
    check_tensor(&scale_name, &scale, Dtype::F32, &[channels])?;
    let scales: Vec<f32> = f32s_from_le_bytes(scale.data()).collect();

    Ok(tensor
        .data()
        .iter()
        .enumerate()
        .map(|(j, &q)| q as i8 as f32 * scales[j % channels])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{LayerSpec, ModelSpec, activations::ActFn},
        checkpoint,
        quant::Converter,
    };
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn model() -> (Sequential, ParamManager) {
        let spec = ModelSpec::new(
            (8, 1),
            [
                LayerSpec::conv1d(4, 3, Some(ActFn::Relu)),
                LayerSpec::MaxPool1d { pool_size: 2 },
                LayerSpec::Flatten,
                LayerSpec::dense(6, Some(ActFn::Tanh)),
                LayerSpec::dense(3, Some(ActFn::Softmax)),
            ],
        );
        let model = Sequential::new(spec, 0).unwrap();
        let pm = model.init_params(&mut StdRng::seed_from_u64(11)).unwrap();
        (model, pm)
    }

    fn max_diff(precision: Precision) -> f32 {
        let (mut model, pm) = model();
        let bytes = Converter::new(precision).convert(&model, &pm).unwrap();
        let mut interpreter = Interpreter::from_bytes(&bytes).unwrap();
        assert_eq!(interpreter.precision(), precision);

        let mut rng = StdRng::seed_from_u64(0);
        let mut diff = 0f32;
        for _ in 0..10 {
            let x: Vec<f32> = (0..8).map(|_| rng.random_range(-1.0..1.0)).collect();
            let expected = model
                .forward(&pm, ArrayView2::from_shape((1, 8), &x).unwrap(), false)
                .unwrap();
            let got = interpreter.invoke(&x).unwrap();

            for (e, g) in expected.iter().zip(&got) {
                diff = diff.max((e - g).abs());
            }
        }

        diff
    }

    #[test]
    fn int8_inference_stays_close_to_full_precision() {
        assert!(max_diff(Precision::Int8) < 2e-2);
    }

    #[test]
    fn float16_inference_stays_close_to_full_precision() {
        assert!(max_diff(Precision::Float16) < 2e-3);
    }

    #[test]
    fn interpreter_exposes_the_model_shapes() {
        let (model, pm) = model();
        let bytes = Converter::new(Precision::Int8).convert(&model, &pm).unwrap();
        let mut interpreter = Interpreter::from_bytes(&bytes).unwrap();

        assert_eq!(interpreter.input_shape(), (8, 1));
        assert_eq!(interpreter.output_len(), 3);
        assert!(matches!(
            interpreter.invoke(&[0.; 7]),
            Err(MlErr::SizeMismatch { got: 7, expected: 8, .. })
        ));

        let probabilities = interpreter.invoke(&[0.5; 8]).unwrap();
        assert!((probabilities.iter().sum::<f32>() - 1.).abs() < 1e-5);
    }

    #[test]
    fn predict_matches_invoke_row_by_row() {
        let (model, pm) = model();
        let bytes = Converter::new(Precision::Int8).convert(&model, &pm).unwrap();
        let mut interpreter = Interpreter::from_bytes(&bytes).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let xs: Vec<f32> = (0..5 * 8).map(|_| rng.random_range(-1.0..1.0)).collect();
        let x = ArrayView2::from_shape((5, 8), &xs).unwrap();

        let y = interpreter.predict(x, 2).unwrap();
        assert_eq!(y.dim(), (5, 3));

        for (i, row) in xs.chunks(8).enumerate() {
            let single = interpreter.invoke(row).unwrap();
            for (a, b) in y.row(i).iter().zip(&single) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn checkpoints_are_not_quantized_artifacts() {
        let (model, pm) = model();
        let bytes = checkpoint::to_bytes(&model, &pm).unwrap();

        assert!(matches!(Interpreter::from_bytes(&bytes), Err(MlErr::InvalidInput(_))));
    }
}
