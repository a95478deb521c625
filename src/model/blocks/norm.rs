use std::{fmt, str::FromStr};

use candle_core::{Module, Tensor};
use candle_nn::{batch_norm, BatchNorm, ModuleT, VarBuilder};

use crate::error::Error;

pub const NORM_EPS: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormKind {
  #[default]
  Batch,
  Instance,
}

impl NormKind {
  /// Resolves the `(do_norm, norm)` flag pair. The name is only looked at when
  /// `do_norm` is set.
  pub fn resolve(do_norm: bool, norm: &str) -> Result<Option<Self>, Error> {
    if do_norm {
      norm.parse().map(Some)
    } else {
      Ok(None)
    }
  }
}

impl FromStr for NormKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "batch" => Ok(Self::Batch),
      "instance" => Ok(Self::Instance),
      other => Err(Error::UnsupportedNorm(other.to_owned())),
    }
  }
}

impl fmt::Display for NormKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Batch => f.write_str("batch"),
      Self::Instance => f.write_str("instance"),
    }
  }
}

/// Per-sample, per-channel normalization over the spatial dims.
///
/// Carries no affine parameters and no running statistics, so train and eval
/// behave the same.
#[derive(Debug, Clone, Copy)]
pub struct InstanceNorm {
  eps: f64,
}

impl InstanceNorm {
  pub fn new(eps: f64) -> Self {
    Self { eps }
  }
}

impl Module for InstanceNorm {
  fn forward(&self, x: &Tensor) -> Result<Tensor, candle_core::Error> {
    let mean = x.mean_keepdim((2, 3))?;
    let centered = x.broadcast_sub(&mean)?;
    let var = centered.sqr()?.mean_keepdim((2, 3))?;
    centered.broadcast_div(&(var + self.eps)?.sqrt()?)
  }
}

pub enum Norm {
  Batch(BatchNorm),
  Instance(InstanceNorm),
}

impl Norm {
  pub fn new(kind: NormKind, channels: usize, vb: VarBuilder) -> Result<Self, candle_core::Error> {
    Ok(match kind {
      NormKind::Batch => Self::Batch(batch_norm(channels, NORM_EPS, vb)?),
      NormKind::Instance => Self::Instance(InstanceNorm::new(NORM_EPS)),
    })
  }

  pub fn kind(&self) -> NormKind {
    match self {
      Self::Batch(_) => NormKind::Batch,
      Self::Instance(_) => NormKind::Instance,
    }
  }
}

impl ModuleT for Norm {
  fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    match self {
      Self::Batch(m) => m.forward_t(x, train),
      Self::Instance(m) => m.forward(x),
    }
  }
}
