mod patch286;
mod patch70;

use candle_core::Tensor;
use candle_nn::{ops::sigmoid, VarBuilder};

pub use patch286::*;
pub use patch70::*;

use crate::{
  error::{Error, Result, StageExt},
  model::blocks::{EncoderBlock, EncoderBlockConfig, NormKind},
  utils::TensorExt,
};

/// Shared by both PatchGAN variants.
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
  /// Channels of one image; the stack sees twice this many.
  pub in_channels: usize,
  pub out_channels: usize,
  pub bias: bool,
  pub norm: NormKind,
}

impl Default for DiscriminatorConfig {
  fn default() -> Self {
    Self {
      in_channels: 3,
      out_channels: 1,
      bias: false,
      norm: NormKind::Batch,
    }
  }
}

impl DiscriminatorConfig {
  pub fn with_norm(mut self, norm: &str) -> Result<Self> {
    self.norm = norm.parse()?;
    Ok(self)
  }
}

/// `(output channels, stride)` per block; `None` is the configured output width.
type Layout = [(Option<usize>, usize)];

struct PatchStack {
  stage: &'static str,
  blocks: Vec<EncoderBlock>,
}

impl PatchStack {
  fn new(
    stage: &'static str,
    config: &DiscriminatorConfig,
    layout: &Layout,
    vb: VarBuilder,
  ) -> Result<Self> {
    let mut blocks = Vec::with_capacity(layout.len());
    let mut in_channels = config.in_channels * 2;

    for (k, &(channels, stride)) in layout.iter().enumerate() {
      let input_layer = k == 0;
      let output_layer = k == layout.len() - 1;
      let out_channels = channels.unwrap_or(config.out_channels);

      let block = EncoderBlockConfig {
        stride,
        bias: config.bias,
        norm: (!input_layer && !output_layer).then_some(config.norm),
        activation: !input_layer,
        ..EncoderBlockConfig::new(in_channels, out_channels)
      };

      blocks.push(EncoderBlock::new(
        &block,
        &format!("disc{}", k + 1),
        vb.clone(),
      )?);
      in_channels = out_channels;
    }

    tracing::debug!(
      stage,
      blocks = blocks.len(),
      in_channels = config.in_channels,
      norm = %config.norm,
      "built patch discriminator"
    );

    Ok(Self { stage, blocks })
  }

  fn forward_t(&self, candidate: &Tensor, reference: &Tensor, train: bool) -> Result<Tensor> {
    let mut x = candidate.cat_pair(reference, self.stage)?;

    for block in &self.blocks {
      x = block.forward_t(&x, train)?;
    }

    sigmoid(&x).at_stage(self.stage)
  }

  fn receptive_field(&self) -> usize {
    self
      .blocks
      .iter()
      .rev()
      .fold(1, |field, block| (field - 1) * block.stride() + block.effective_kernel())
  }
}

/// Either PatchGAN variant, chosen by receptive field.
pub enum PatchGan {
  Patch70(Discriminator),
  Patch286(Discriminator286),
}

impl PatchGan {
  pub fn new(receptive_field: usize, config: &DiscriminatorConfig, vb: VarBuilder) -> Result<Self> {
    match receptive_field {
      Discriminator::RECEPTIVE_FIELD => Discriminator::new(config, vb).map(Self::Patch70),
      Discriminator286::RECEPTIVE_FIELD => Discriminator286::new(config, vb).map(Self::Patch286),
      other => Err(Error::InvalidConfig {
        stage: "discriminator".to_owned(),
        reason: format!("no PatchGAN variant with a {other}x{other} receptive field"),
      }),
    }
  }

  pub fn forward_t(&self, candidate: &Tensor, reference: &Tensor, train: bool) -> Result<Tensor> {
    match self {
      Self::Patch70(m) => m.forward_t(candidate, reference, train),
      Self::Patch286(m) => m.forward_t(candidate, reference, train),
    }
  }

  pub fn forward(&self, candidate: &Tensor, reference: &Tensor) -> Result<Tensor> {
    self.forward_t(candidate, reference, false)
  }

  pub fn receptive_field(&self) -> usize {
    match self {
      Self::Patch70(m) => m.receptive_field(),
      Self::Patch286(m) => m.receptive_field(),
    }
  }
}
