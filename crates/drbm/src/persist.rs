//! JSON persistence of DRBM topology and parameters.
//!
//! ```text
//! {
//!   "input_num": 4, "hidden_num": 3, "output_num": 2,
//!   "dtype": "float32", "activation": "sparse_double", "enable_sparse": true,
//!   "params": { "b1": [..], "b2": [..], "w1": [[..], ..], "w2": [[..], ..], "sparse": [..] }
//! }
//! ```
//!
//! `params.sparse` is present iff `enable_sparse`. Values are written as
//! shortest round-trip decimals and parsed with correct rounding
//! (`serde_json/float_roundtrip`), so a save/load cycle reproduces every
//! parameter bit-for-bit.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use burn::module::Param;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DrbmError;
use crate::marginalize::Marginalization;
use crate::model::bridge::{matrix_to_tensor, tensor_to_rows, tensor_to_vec, vector_to_tensor};
use crate::model::{Drbm, DrbmConfig, DrbmParams};

/// Serialized form of a [`Drbm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrbmRecord {
    pub input_num: usize,
    pub hidden_num: usize,
    pub output_num: usize,
    pub dtype: String,
    pub activation: String,
    pub enable_sparse: bool,
    pub params: ParamsRecord,
}

/// Parameter arrays as plain nested lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsRecord {
    pub b1: Vec<f64>,
    pub b2: Vec<f64>,
    pub w1: Vec<Vec<f64>>,
    pub w2: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<Vec<f64>>,
}

impl DrbmRecord {
    /// Snapshot a model's topology and current parameter values.
    pub fn from_model<B: Backend>(model: &Drbm<B>) -> Self {
        let params = model.params();
        Self {
            input_num: model.input_num(),
            hidden_num: model.hidden_num(),
            output_num: model.output_num(),
            dtype: model.dtype().to_string(),
            activation: model.activation().name().to_string(),
            enable_sparse: model.enable_sparse(),
            params: ParamsRecord {
                b1: tensor_to_vec(params.b1.val()),
                b2: tensor_to_vec(params.b2.val()),
                w1: tensor_to_rows(params.w1.val()),
                w2: tensor_to_rows(params.w2.val()),
                sparse: params.sparse.as_ref().map(|s| tensor_to_vec(s.val())),
            },
        }
    }

    /// Rebuild a model: construct topology and policy, then overwrite every
    /// parameter with the recorded values.
    pub fn into_model<B: Backend>(self, device: &B::Device) -> Result<Drbm<B>, DrbmError> {
        let policy = Marginalization::from_name(&self.activation)?;
        if self.enable_sparse != policy.is_sparse() {
            return Err(DrbmError::MalformedRecord(format!(
                "enable_sparse={} contradicts activation {:?}",
                self.enable_sparse, self.activation
            )));
        }
        if self.enable_sparse != self.params.sparse.is_some() {
            return Err(DrbmError::MalformedRecord(format!(
                "enable_sparse={} but sparse parameter is {}",
                self.enable_sparse,
                if self.params.sparse.is_some() { "present" } else { "absent" }
            )));
        }

        let model = DrbmConfig::new(self.input_num, self.hidden_num, self.output_num)
            .with_activation(self.activation.clone())
            .with_dtype(self.dtype.clone())
            .init::<B>(device)?;

        let (i, h, k) = (self.input_num, self.hidden_num, self.output_num);
        let p = &self.params;
        let sparse = match &p.sparse {
            Some(values) => Some(Param::from_tensor(vector_to_tensor("sparse", values, h, device)?)),
            None => None,
        };
        let params = DrbmParams {
            b1: Param::from_tensor(vector_to_tensor("b1", &p.b1, h, device)?),
            b2: Param::from_tensor(vector_to_tensor("b2", &p.b2, k, device)?),
            w1: Param::from_tensor(matrix_to_tensor("w1", &p.w1, [i, h], device)?),
            w2: Param::from_tensor(matrix_to_tensor("w2", &p.w2, [h, k], device)?),
            sparse,
        };

        Ok(model.with_params(params))
    }
}

impl<B: Backend> Drbm<B> {
    /// Write topology and parameters to `path` as indented JSON.
    pub fn save(&self, path: &Path) -> Result<(), DrbmError> {
        let record = DrbmRecord::from_model(self);
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &record)?;
        tracing::info!(
            path = %path.display(),
            activation = %record.activation,
            params = ?self.param_names(),
            scalars = self.num_params(),
            "Saved DRBM"
        );
        Ok(())
    }

    /// Read a model saved by [`Drbm::save`].
    pub fn load(path: &Path, device: &B::Device) -> Result<Self, DrbmError> {
        let reader = BufReader::new(File::open(path)?);
        let record: DrbmRecord = serde_json::from_reader(reader)?;
        let model = record.into_model(device)?;
        tracing::info!(
            path = %path.display(),
            activation = %model.activation(),
            hidden_num = model.hidden_num(),
            "Loaded DRBM"
        );
        Ok(model)
    }
}
