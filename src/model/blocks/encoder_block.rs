use candle_core::{Module, Tensor};
use candle_nn::{conv2d, conv2d_no_bias, ops::leaky_relu, Conv2d, Conv2dConfig, ModuleT, VarBuilder};

use super::{invalid, validate_channels, Norm, NormKind};
use crate::{
  error::{Error, Result, StageExt},
  utils::TensorExt,
};

pub const LEAKY_SLOPE: f64 = 0.2;

/// Leaky-ReLU, strided convolution, then optional normalization.
#[derive(Debug, Clone)]
pub struct EncoderBlockConfig {
  pub in_channels: usize,
  pub out_channels: usize,
  pub kernel_size: usize,
  pub stride: usize,
  pub padding: usize,
  pub dilation: usize,
  pub groups: usize,
  pub bias: bool,
  pub norm: Option<NormKind>,
  pub activation: bool,
}

impl EncoderBlockConfig {
  /// A 4x4, stride 2, padding 1 block with batch norm and activation.
  pub fn new(in_channels: usize, out_channels: usize) -> Self {
    Self {
      in_channels,
      out_channels,
      kernel_size: 4,
      stride: 2,
      padding: 1,
      dilation: 1,
      groups: 1,
      bias: false,
      norm: Some(NormKind::Batch),
      activation: true,
    }
  }

  pub fn with_norm(mut self, do_norm: bool, norm: &str) -> Result<Self> {
    self.norm = NormKind::resolve(do_norm, norm)?;
    Ok(self)
  }

  fn validate(&self, stage: &str) -> Result<()> {
    validate_channels(stage, self.in_channels, self.out_channels)?;

    if self.kernel_size == 0 || self.stride == 0 || self.dilation == 0 {
      return Err(invalid(stage, "kernel size, stride and dilation must be positive"));
    }

    if self.groups == 0
      || self.in_channels % self.groups != 0
      || self.out_channels % self.groups != 0
    {
      return Err(invalid(
        stage,
        format!(
          "groups ({}) must divide both {} and {}",
          self.groups, self.in_channels, self.out_channels
        ),
      ));
    }

    Ok(())
  }
}

pub struct EncoderBlock {
  name: String,
  in_channels: usize,
  out_channels: usize,
  kernel_size: usize,
  stride: usize,
  padding: usize,
  dilation: usize,
  conv: Conv2d,
  norm: Option<Norm>,
  activation: bool,
}

impl EncoderBlock {
  pub fn new(config: &EncoderBlockConfig, name: &str, vb: VarBuilder) -> Result<Self> {
    config.validate(name)?;

    let vb = vb.pp(name);

    let conv = if config.bias { conv2d } else { conv2d_no_bias }(
      config.in_channels,
      config.out_channels,
      config.kernel_size,
      Conv2dConfig {
        padding: config.padding,
        stride: config.stride,
        dilation: config.dilation,
        groups: config.groups,
        ..Default::default()
      },
      vb.pp("conv"),
    )
    .at_stage(name)?;

    let norm = config
      .norm
      .map(|kind| Norm::new(kind, config.out_channels, vb.pp("norm")))
      .transpose()
      .at_stage(name)?;

    tracing::debug!(
      stage = name,
      in_channels = config.in_channels,
      out_channels = config.out_channels,
      stride = config.stride,
      norm = ?config.norm,
      activation = config.activation,
      "built encoder block"
    );

    Ok(Self {
      name: name.to_owned(),
      in_channels: config.in_channels,
      out_channels: config.out_channels,
      kernel_size: config.kernel_size,
      stride: config.stride,
      padding: config.padding,
      dilation: config.dilation,
      conv,
      norm,
      activation: config.activation,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn in_channels(&self) -> usize {
    self.in_channels
  }

  pub fn out_channels(&self) -> usize {
    self.out_channels
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn norm_kind(&self) -> Option<NormKind> {
    self.norm.as_ref().map(Norm::kind)
  }

  /// Span of the convolution window in input pixels.
  pub fn effective_kernel(&self) -> usize {
    self.dilation * (self.kernel_size - 1) + 1
  }

  pub fn output_size(&self, size: usize) -> Option<usize> {
    (size + 2 * self.padding)
      .checked_sub(self.effective_kernel())
      .map(|span| span / self.stride + 1)
  }

  pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
    x.ensure_channels(&self.name, self.in_channels)?;

    let (_, _, h, w) = x.dims4().at_stage(&self.name)?;
    if self.output_size(h).is_none() || self.output_size(w).is_none() {
      return Err(Error::InputTooSmall {
        stage: self.name.clone(),
        height: h,
        width: w,
        minimum: self.effective_kernel().saturating_sub(2 * self.padding),
      });
    }

    let mut x = if self.activation {
      leaky_relu(x, LEAKY_SLOPE).at_stage(&self.name)?
    } else {
      x.clone()
    };

    x = self.conv.forward(&x).at_stage(&self.name)?;

    if let Some(norm) = &self.norm {
      x = norm.forward_t(&x, train).at_stage(&self.name)?;
    }

    tracing::trace!(stage = %self.name, dims = ?x.dims(), "encoded");

    Ok(x)
  }

  pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
    self.forward_t(x, false)
  }
}

impl ModuleT for EncoderBlock {
  fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
    EncoderBlock::forward_t(self, xs, train).map_err(candle_core::Error::wrap)
  }
}
