use std::{fs, path::Path};

use half::f16;
use log::info;
use safetensors::tensor::{self, Dtype, TensorView};

use super::{PRECISION_KEY, Precision, SCALE_SUFFIX, is_quantized};
use crate::{
    MlErr, Result,
    arch::Sequential,
    checkpoint::{architecture_metadata, create_parent_dir, tensor_name},
    training::ParamManager,
};

const QMAX: f32 = 127.;
const MIN_RANGE: f32 = 1e-8;

/// An encoded tensor waiting to be serialized.
struct Encoded {
    name: String,
    dtype: Dtype,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Converts a trained model into a quantized artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct Converter {
    precision: Precision,
}

impl Converter {
    /// Creates a new `Converter`.
    ///
    /// # Arguments
    /// * `precision` - The precision kernels are stored with.
    pub fn new(precision: Precision) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Quantizes `model`'s parameters into `path`, creating any missing parent directory.
    ///
    /// # Returns
    /// The size of the artifact in bytes.
    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
        model: &Sequential,
        param_manager: &ParamManager,
    ) -> Result<usize> {
        let path = path.as_ref();
        let bytes = self.convert(model, param_manager)?;

        create_parent_dir(path)?;
        fs::write(path, &bytes)?;

        info!("quantized model written to {}", path.display());
        Ok(bytes.len())
    }

    /// Quantizes `model`'s parameters.
    ///
    /// # Returns
    /// The bytes of the artifact, loadable through an `Interpreter`.
    pub fn convert(&self, model: &Sequential, param_manager: &ParamManager) -> Result<Vec<u8>> {
        if param_manager.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: param_manager.len(),
                expected: model.size(),
            });
        }

        let mut encoded = Vec::new();
        for (i, (layer, params)) in model.layers().iter().zip(param_manager.front()).enumerate() {
            let mut rest = params;

            for (param, shape) in layer.param_shapes() {
                let (values, tail) = rest.split_at(shape.iter().product());
                rest = tail;

                let name = tensor_name(i, param);
                if !is_quantized(param) {
                    encoded.push(Encoded {
                        name,
                        dtype: Dtype::F32,
                        shape,
                        bytes: bytemuck::cast_slice(values).to_vec(),
                    });
                    continue;
                }

                match self.precision {
                    Precision::Int8 => encoded.extend(encode_int8(name, shape, values)),
                    Precision::Float16 => encoded.push(encode_f16(name, shape, values)),
                }
            }
        }

        let views = encoded
            .iter()
            .map(|e| Ok((e.name.as_str(), TensorView::new(e.dtype, e.shape.clone(), &e.bytes)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut metadata = architecture_metadata(model.spec())?;
        metadata.insert(PRECISION_KEY.to_string(), self.precision.to_string());

        let bytes = tensor::serialize(views, &Some(metadata))?;
        info!(
            "quantized {} parameters to {} ({} bytes)",
            model.size(),
            self.precision,
            bytes.len()
        );

        Ok(bytes)
    }
}

/// Symmetric per output channel quantization, the output channel being the last axis.
fn encode_int8(name: String, shape: Vec<usize>, values: &[f32]) -> [Encoded; 2] {
    let scales = channel_scales(values, shape.last().copied().unwrap_or(1));
    let channels = scales.len();

    let quantized: Vec<i8> = values
        .iter()
        .enumerate()
        .map(|(j, &w)| (w / scales[j % channels]).round().clamp(-QMAX, QMAX) as i8)
        .collect();

    let scale = Encoded {
        name: format!("{name}.{SCALE_SUFFIX}"),
        dtype: Dtype::F32,
        shape: vec![channels],
        bytes: bytemuck::cast_slice(&scales).to_vec(),
    };
    let kernel = Encoded {
        name,
        dtype: Dtype::I8,
        shape,
        bytes: bytemuck::cast_slice(&quantized).to_vec(),
    };

    [kernel, scale]
}

fn encode_f16(name: String, shape: Vec<usize>, values: &[f32]) -> Encoded {
    let halves: Vec<f16> = values.iter().copied().map(f16::from_f32).collect();

    Encoded {
        name,
        dtype: Dtype::F16,
        shape,
        bytes: bytemuck::cast_slice(&halves).to_vec(),
    }
}

/// The scale of each of the `channels` interleaved channels of `values`.
pub(super) fn channel_scales(values: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    let mut max_abs = vec![0f32; channels];

    for (j, w) in values.iter().enumerate() {
        let m = &mut max_abs[j % channels];
        *m = m.max(w.abs());
    }

    max_abs.into_iter().map(|m| m.max(MIN_RANGE) / QMAX).collect()
}
