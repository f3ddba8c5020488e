// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor, TensorError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Row-major tensor payload as written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredTensor {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl StoredTensor {
    pub fn from_tensor(tensor: &Tensor) -> StoredTensor {
        let (rows, cols) = tensor.shape();
        StoredTensor {
            rows,
            cols,
            data: tensor.data().to_vec(),
        }
    }

    pub fn into_tensor(self) -> PureResult<Tensor> {
        Tensor::from_vec(self.rows, self.cols, self.data)
    }
}

/// Named parameter tensors of a module. Names are kept sorted so two
/// snapshots of the same state serialize to identical bytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub parameters: BTreeMap<String, StoredTensor>,
}

impl ModuleSnapshot {
    pub fn from_module<M: Module + ?Sized>(module: &M) -> PureResult<Self> {
        Ok(Self::from_state(&module.state_dict()?))
    }

    pub fn from_state(state: &HashMap<String, Tensor>) -> Self {
        let parameters = state
            .iter()
            .map(|(name, tensor)| (name.clone(), StoredTensor::from_tensor(tensor)))
            .collect();
        Self { parameters }
    }

    pub fn into_state(self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::with_capacity(self.parameters.len());
        for (name, tensor) in self.parameters {
            state.insert(name, tensor.into_tensor()?);
        }
        Ok(state)
    }

    /// Loads the snapshot into `module`, failing on any missing name.
    pub fn apply_to<M: Module + ?Sized>(self, module: &mut M) -> PureResult<()> {
        let state = self.into_state()?;
        module.load_state_dict(&state)
    }
}

fn io_error(err: std::io::Error) -> TensorError {
    TensorError::IoError {
        message: err.to_string(),
    }
}

fn serde_error(err: impl ToString) -> TensorError {
    TensorError::SerializationError {
        message: err.to_string(),
    }
}

pub fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> PureResult<()> {
    let file = File::create(path.as_ref()).map_err(io_error)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value).map_err(serde_error)
}

pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> PureResult<T> {
    let file = File::open(path.as_ref()).map_err(io_error)?;
    serde_json::from_reader(BufReader::new(file)).map_err(serde_error)
}

pub fn write_bincode<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> PureResult<()> {
    let file = File::create(path.as_ref()).map_err(io_error)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, value).map_err(serde_error)
}

pub fn read_bincode<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> PureResult<T> {
    let file = File::open(path.as_ref()).map_err(io_error)?;
    bincode::deserialize_from(BufReader::new(file)).map_err(serde_error)
}

pub fn save_json<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    write_json(&ModuleSnapshot::from_module(module)?, path)
}

pub fn load_json<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> PureResult<()> {
    read_json::<ModuleSnapshot, _>(path)?.apply_to(module)
}

pub fn save_bincode<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    write_bincode(&ModuleSnapshot::from_module(module)?, path)
}

pub fn load_bincode<M: Module + ?Sized, P: AsRef<Path>>(
    module: &mut M,
    path: P,
) -> PureResult<()> {
    read_bincode::<ModuleSnapshot, _>(path)?.apply_to(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::linear::Linear;
    use std::fs;
    use tempfile::tempdir;

    fn perturb(layer: &mut Linear) {
        layer
            .visit_parameters_mut(&mut |param| {
                for value in param.value_mut().data_mut() {
                    *value += 0.5;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn save_and_load_roundtrip_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linear.json");
        let mut layer = Linear::new("io", 2, 2, Some(4)).unwrap();
        save_json(&layer, &path).unwrap();
        let before = layer.state_dict().unwrap();
        perturb(&mut layer);
        assert_ne!(before, layer.state_dict().unwrap());
        load_json(&mut layer, &path).unwrap();
        assert_eq!(before, layer.state_dict().unwrap());
    }

    #[test]
    fn save_and_load_roundtrip_bincode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linear.bin");
        let mut layer = Linear::new("io", 2, 2, Some(4)).unwrap();
        let before = layer.state_dict().unwrap();
        save_bincode(&layer, &path).unwrap();
        perturb(&mut layer);
        load_bincode(&mut layer, &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(before, layer.state_dict().unwrap());
    }

    #[test]
    fn reading_a_missing_file_reports_io_error() {
        let dir = tempdir().unwrap();
        let err = read_bincode::<ModuleSnapshot, _>(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, TensorError::IoError { .. }));
    }

    #[test]
    fn snapshot_with_foreign_names_is_rejected() {
        let mut layer = Linear::new("io", 2, 2, Some(4)).unwrap();
        let mut other = ModuleSnapshot::from_module(&Linear::new("other", 2, 2, Some(4)).unwrap())
            .unwrap();
        other.parameters.remove("other::bias");
        assert!(matches!(
            other.apply_to(&mut layer),
            Err(TensorError::MissingParameter { .. })
        ));
    }
}
