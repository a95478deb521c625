use candle_core::Tensor;
use candle_nn::VarBuilder;

use super::{DiscriminatorConfig, Layout, PatchStack};
use crate::{error::Result, model::blocks::EncoderBlock};

const LAYOUT: &Layout = &[
  (Some(64), 2),
  (Some(128), 2),
  (Some(256), 2),
  (Some(512), 1),
  (None, 1),
];

/// PatchGAN with a 70x70 receptive field: a 30x30 map for 256x256 inputs.
pub struct Discriminator {
  stack: PatchStack,
}

impl Discriminator {
  pub const RECEPTIVE_FIELD: usize = 70;

  pub fn new(config: &DiscriminatorConfig, vb: VarBuilder) -> Result<Self> {
    let stack = PatchStack::new("discriminator", config, LAYOUT, vb)?;
    Ok(Self { stack })
  }

  pub fn blocks(&self) -> &[EncoderBlock] {
    &self.stack.blocks
  }

  pub fn receptive_field(&self) -> usize {
    self.stack.receptive_field()
  }

  /// Scores `candidate` conditioned on `reference`; both must share one shape.
  pub fn forward_t(&self, candidate: &Tensor, reference: &Tensor, train: bool) -> Result<Tensor> {
    self.stack.forward_t(candidate, reference, train)
  }

  pub fn forward(&self, candidate: &Tensor, reference: &Tensor) -> Result<Tensor> {
    self.forward_t(candidate, reference, false)
  }
}
