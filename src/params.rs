use std::collections::BTreeMap;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};

use crate::error::{Error, Result};

const RUNNING_STATS: [&str; 2] = [".running_mean", ".running_var"];

fn is_running_stat(name: &str) -> bool {
  RUNNING_STATS.iter().any(|suffix| name.ends_with(suffix))
}

/// Owns every tensor of the models built from its [`VarBuilder`].
///
/// Learnable tensors go to an optimizer, running statistics are only
/// snapshotted and restored.
pub struct ParamSet {
  varmap: VarMap,
  dtype: DType,
  device: Device,
}

impl ParamSet {
  pub fn new(dtype: DType, device: &Device) -> Self {
    Self {
      varmap: VarMap::new(),
      dtype,
      device: device.clone(),
    }
  }

  pub fn var_builder(&self) -> VarBuilder<'static> {
    VarBuilder::from_varmap(&self.varmap, self.dtype, &self.device)
  }

  pub fn varmap(&self) -> &VarMap {
    &self.varmap
  }

  /// Trainable tensors sorted by name.
  pub fn learnable(&self) -> Result<Vec<(String, Var)>> {
    let data = self.varmap.data().lock().map_err(|_| Error::ParamsPoisoned)?;

    let mut vars: Vec<_> = data
      .iter()
      .filter(|(name, _)| !is_running_stat(name))
      .map(|(name, var)| (name.clone(), var.clone()))
      .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(vars)
  }

  pub fn num_learnable(&self) -> Result<usize> {
    Ok(
      self
        .learnable()?
        .iter()
        .map(|(_, var)| var.elem_count())
        .sum(),
    )
  }

  /// Deep copy of every running mean and variance.
  pub fn running_stats(&self) -> Result<BTreeMap<String, Tensor>> {
    let data = self.varmap.data().lock().map_err(|_| Error::ParamsPoisoned)?;

    data
      .iter()
      .filter(|(name, _)| is_running_stat(name))
      .map(|(name, var)| -> Result<(String, Tensor)> {
        Ok((name.clone(), var.as_tensor().copy()?))
      })
      .collect()
  }

  /// Writes a [`running_stats`](Self::running_stats) snapshot back in place.
  ///
  /// The whole snapshot is checked before anything is written, so a failed
  /// restore leaves every statistic untouched.
  pub fn restore_running_stats(&self, stats: &BTreeMap<String, Tensor>) -> Result<()> {
    let data = self.varmap.data().lock().map_err(|_| Error::ParamsPoisoned)?;

    let mut writes = Vec::new();
    for (name, var) in data.iter().filter(|(name, _)| is_running_stat(name)) {
      let saved = stats
        .get(name)
        .ok_or_else(|| Error::MissingStat(name.clone()))?;

      if saved.dims() != var.dims() {
        return Err(Error::SpatialMismatch {
          stage: name.clone(),
          expected: var.dims().to_vec(),
          actual: saved.dims().to_vec(),
        });
      }

      writes.push((var, saved));
    }

    for (var, saved) in writes {
      var.set(saved)?;
    }

    tracing::debug!(restored = stats.len(), "restored running statistics");

    Ok(())
  }
}
