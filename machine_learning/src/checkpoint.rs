//! Model checkpoints.
//!
//! A checkpoint is a safetensors file with one `F32` tensor per layer parameter, named
//! `layers.{i}.{param}`, and the model's `ModelSpec` as JSON under the `architecture` metadata key.

use std::{collections::HashMap, fs, path::Path};

use log::debug;
use safetensors::{
    SafeTensors,
    tensor::{self, Dtype, TensorView},
};

use crate::{
    MlErr, Result,
    arch::{ModelSpec, Sequential},
    training::ParamManager,
};

pub(crate) const ARCHITECTURE_KEY: &str = "architecture";

/// Writes `model` and its parameters to `path`, creating any missing parent directory.
pub fn save<P: AsRef<Path>>(path: P, model: &Sequential, param_manager: &ParamManager) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(model, param_manager)?;

    create_parent_dir(path)?;
    fs::write(path, bytes)?;

    debug!("checkpoint written to {}", path.display());
    Ok(())
}

/// Reads a model and its parameters back from a checkpoint.
pub fn load<P: AsRef<Path>>(path: P) -> Result<(Sequential, ParamManager)> {
    let bytes = fs::read(path)?;
    from_bytes(&bytes)
}

/// Serializes `model` and its parameters as a checkpoint.
pub fn to_bytes(model: &Sequential, param_manager: &ParamManager) -> Result<Vec<u8>> {
    if param_manager.len() != model.size() {
        return Err(MlErr::SizeMismatch {
            what: "parameters",
            got: param_manager.len(),
            expected: model.size(),
        });
    }

    let mut views = Vec::new();
    for (i, (layer, params)) in model.layers().iter().zip(param_manager.front()).enumerate() {
        let mut rest = params;

        for (name, shape) in layer.param_shapes() {
            let (head, tail) = rest.split_at(shape.iter().product());
            rest = tail;

            let view = TensorView::new(Dtype::F32, shape, bytemuck::cast_slice(head))?;
            views.push((tensor_name(i, name), view));
        }
    }

    tensor::serialize(views, &Some(architecture_metadata(model.spec())?)).map_err(Into::into)
}

/// Parses a checkpoint.
pub fn from_bytes(bytes: &[u8]) -> Result<(Sequential, ParamManager)> {
    let spec = read_architecture(bytes)?;
    let model = Sequential::new(spec, 0)?;
    let tensors = SafeTensors::deserialize(bytes)?;

    let mut params = Vec::with_capacity(model.size());
    for (i, layer) in model.layers().iter().enumerate() {
        for (name, shape) in layer.param_shapes() {
            let name = tensor_name(i, name);
            let tensor = tensors
                .tensor(&name)
                .map_err(|_| MlErr::MissingTensor(name.clone()))?;

            check_tensor(&name, &tensor, Dtype::F32, &shape)?;
            params.extend(f32s_from_le_bytes(tensor.data()));
        }
    }

    let param_manager = ParamManager::new(params, model.layer_sizes())?;
    Ok((model, param_manager))
}

pub(crate) fn tensor_name(layer: usize, param: &str) -> String {
    format!("layers.{layer}.{param}")
}

pub(crate) fn architecture_metadata(spec: &ModelSpec) -> Result<HashMap<String, String>> {
    let architecture = serde_json::to_string(spec)?;
    Ok(HashMap::from([(ARCHITECTURE_KEY.to_string(), architecture)]))
}

pub(crate) fn read_architecture(bytes: &[u8]) -> Result<ModelSpec> {
    let (_, metadata) = SafeTensors::read_metadata(bytes)?;
    let architecture = metadata
        .metadata()
        .as_ref()
        .and_then(|m| m.get(ARCHITECTURE_KEY))
        .ok_or(MlErr::MissingArchitecture)?;

    Ok(serde_json::from_str(architecture)?)
}

pub(crate) fn check_tensor(name: &str, tensor: &TensorView, dtype: Dtype, shape: &[usize]) -> Result<()> {
    if tensor.dtype() != dtype || tensor.shape() != shape {
        return Err(MlErr::InvalidInput(format!(
            "tensor {name} is {:?}{:?}, expected {dtype:?}{shape:?}",
            tensor.dtype(),
            tensor.shape()
        )));
    }

    Ok(())
}

pub(crate) fn f32s_from_le_bytes(data: &[u8]) -> impl Iterator<Item = f32> + '_ {
    data.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}
