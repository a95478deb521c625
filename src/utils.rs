use candle_core::Tensor;

use crate::error::{Error, Result, StageExt};

pub trait TensorExt {
  /// Fails with [`Error::ChannelMismatch`] unless dim 1 of a rank-4 tensor is `expected`.
  fn ensure_channels(&self, stage: &str, expected: usize) -> Result<()>;

  /// Concatenates `skip` after `self` along the channel axis.
  ///
  /// Batch and spatial dims must agree; the order is fixed so that the first
  /// `self` channels of the result are `self` and the remainder are `skip`.
  fn cat_skip(&self, skip: &Tensor, stage: &str) -> Result<Tensor>;

  /// Concatenates two tensors of identical shape along the channel axis.
  fn cat_pair(&self, other: &Tensor, stage: &str) -> Result<Tensor>;
}

impl TensorExt for Tensor {
  fn ensure_channels(&self, stage: &str, expected: usize) -> Result<()> {
    let (_, actual, _, _) = self.dims4().at_stage(stage)?;

    if actual != expected {
      return Err(Error::ChannelMismatch {
        stage: stage.to_owned(),
        expected,
        actual,
      });
    }

    Ok(())
  }

  fn cat_skip(&self, skip: &Tensor, stage: &str) -> Result<Tensor> {
    let (n, _, h, w) = self.dims4().at_stage(stage)?;
    let (sn, _, sh, sw) = skip.dims4().at_stage(stage)?;

    if (n, h, w) != (sn, sh, sw) {
      return Err(Error::SpatialMismatch {
        stage: stage.to_owned(),
        expected: vec![n, h, w],
        actual: vec![sn, sh, sw],
      });
    }

    Tensor::cat(&[self, skip], 1).at_stage(stage)
  }

  fn cat_pair(&self, other: &Tensor, stage: &str) -> Result<Tensor> {
    if self.dims() != other.dims() {
      return Err(Error::SpatialMismatch {
        stage: stage.to_owned(),
        expected: self.dims().to_vec(),
        actual: other.dims().to_vec(),
      });
    }

    Tensor::cat(&[self, other], 1).at_stage(stage)
  }
}
