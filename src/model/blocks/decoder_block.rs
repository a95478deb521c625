use candle_core::{Module, Tensor};
use candle_nn::{
  conv_transpose2d, conv_transpose2d_no_bias, ConvTranspose2d, ConvTranspose2dConfig, ModuleT,
  VarBuilder,
};

use super::{invalid, validate_channels, ChannelDropout, Norm, NormKind};
use crate::{
  error::{Result, StageExt},
  utils::TensorExt,
};

/// ReLU, strided transposed convolution, optional normalization, optional
/// channel dropout.
#[derive(Debug, Clone)]
pub struct DecoderBlockConfig {
  pub in_channels: usize,
  pub out_channels: usize,
  pub kernel_size: usize,
  pub stride: usize,
  pub padding: usize,
  pub bias: bool,
  pub norm: Option<NormKind>,
  pub activation: bool,
  pub dropout: f32,
}

impl DecoderBlockConfig {
  /// A 4x4, stride 2, padding 1 block with batch norm, activation and no dropout.
  pub fn new(in_channels: usize, out_channels: usize) -> Self {
    Self {
      in_channels,
      out_channels,
      kernel_size: 4,
      stride: 2,
      padding: 1,
      bias: false,
      norm: Some(NormKind::Batch),
      activation: true,
      dropout: 0.,
    }
  }

  pub fn with_norm(mut self, do_norm: bool, norm: &str) -> Result<Self> {
    self.norm = NormKind::resolve(do_norm, norm)?;
    Ok(self)
  }

  fn validate(&self, stage: &str) -> Result<()> {
    validate_channels(stage, self.in_channels, self.out_channels)?;

    if self.kernel_size == 0 || self.stride == 0 {
      return Err(invalid(stage, "kernel size and stride must be positive"));
    }

    // a 1x1 input must still produce at least one output pixel
    if 2 * self.padding >= self.kernel_size {
      return Err(invalid(
        stage,
        format!(
          "padding {} is too large for kernel size {}",
          self.padding, self.kernel_size
        ),
      ));
    }

    if !(0. ..1.).contains(&self.dropout) {
      return Err(invalid(
        stage,
        format!("dropout {} must lie in [0, 1)", self.dropout),
      ));
    }

    Ok(())
  }
}

pub struct DecoderBlock {
  name: String,
  in_channels: usize,
  out_channels: usize,
  conv_t: ConvTranspose2d,
  norm: Option<Norm>,
  dropout: Option<ChannelDropout>,
  activation: bool,
}

impl DecoderBlock {
  pub fn new(config: &DecoderBlockConfig, name: &str, vb: VarBuilder) -> Result<Self> {
    config.validate(name)?;

    let vb = vb.pp(name);

    let conv_t = if config.bias {
      conv_transpose2d
    } else {
      conv_transpose2d_no_bias
    }(
      config.in_channels,
      config.out_channels,
      config.kernel_size,
      ConvTranspose2dConfig {
        padding: config.padding,
        output_padding: 0,
        stride: config.stride,
        dilation: 1,
      },
      vb.pp("convT"),
    )
    .at_stage(name)?;

    let norm = config
      .norm
      .map(|kind| Norm::new(kind, config.out_channels, vb.pp("norm")))
      .transpose()
      .at_stage(name)?;

    let dropout = (config.dropout > 0.).then(|| ChannelDropout::new(config.dropout));

    tracing::debug!(
      stage = name,
      in_channels = config.in_channels,
      out_channels = config.out_channels,
      norm = ?config.norm,
      dropout = config.dropout,
      "built decoder block"
    );

    Ok(Self {
      name: name.to_owned(),
      in_channels: config.in_channels,
      out_channels: config.out_channels,
      conv_t,
      norm,
      dropout,
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

  pub fn norm_kind(&self) -> Option<NormKind> {
    self.norm.as_ref().map(Norm::kind)
  }

  pub fn dropout(&self) -> f32 {
    self.dropout.map_or(0., |d| d.prob())
  }

  pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
    x.ensure_channels(&self.name, self.in_channels)?;

    let mut x = if self.activation {
      x.relu().at_stage(&self.name)?
    } else {
      x.clone()
    };

    x = self.conv_t.forward(&x).at_stage(&self.name)?;

    if let Some(norm) = &self.norm {
      x = norm.forward_t(&x, train).at_stage(&self.name)?;
    }

    if let Some(dropout) = &self.dropout {
      x = dropout.forward_t(&x, train).at_stage(&self.name)?;
    }

    tracing::trace!(stage = %self.name, dims = ?x.dims(), "decoded");

    Ok(x)
  }

  pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
    self.forward_t(x, false)
  }
}

impl ModuleT for DecoderBlock {
  fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
    DecoderBlock::forward_t(self, xs, train).map_err(candle_core::Error::wrap)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use candle_core::{DType, Device};
  use candle_nn::VarMap;

  fn block(config: &DecoderBlockConfig, varmap: &VarMap) -> DecoderBlock {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
    DecoderBlock::new(config, "dec", vb).unwrap()
  }

  #[test]
  fn doubles_spatial_dims() {
    let device = Device::Cpu;

    for (cin, cout, h, w) in [(512, 512, 1, 1), (128, 3, 16, 16), (8, 4, 5, 7)] {
      for norm in [None, Some(NormKind::Batch), Some(NormKind::Instance)] {
        let varmap = VarMap::new();
        let config = DecoderBlockConfig {
          norm,
          dropout: 0.5,
          ..DecoderBlockConfig::new(cin, cout)
        };
        let dec = block(&config, &varmap);

        let x = Tensor::randn(0f32, 1., (2, cin, h, w), &device).unwrap();
        let y = dec.forward(&x).unwrap();
        assert_eq!(y.dims(), &[2, cout, h * 2, w * 2]);
      }
    }
  }

  #[test]
  fn transposed_weight_layout() {
    let varmap = VarMap::new();
    let config = DecoderBlockConfig {
      bias: true,
      norm: None,
      ..DecoderBlockConfig::new(16, 8)
    };
    block(&config, &varmap);

    let data = varmap.data().lock().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data["dec.convT.weight"].dims(), &[16, 8, 4, 4]);
    assert_eq!(data["dec.convT.bias"].dims(), &[8]);
  }

  #[test]
  fn unsupported_norm_fails_at_construction() {
    let result = DecoderBlockConfig::new(1024, 512).with_norm(true, "unsupported");
    assert!(matches!(result, Err(Error::UnsupportedNorm(_))));
  }

  #[test]
  fn rejects_dropout_out_of_range() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

    for dropout in [1., 1.5, -0.1] {
      let config = DecoderBlockConfig {
        dropout,
        ..DecoderBlockConfig::new(8, 8)
      };
      assert!(matches!(
        DecoderBlock::new(&config, "decoder2", vb.clone()),
        Err(Error::InvalidConfig { .. })
      ));
    }
  }

  #[test]
  fn eval_mode_is_deterministic() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let config = DecoderBlockConfig {
      dropout: 0.5,
      ..DecoderBlockConfig::new(8, 4)
    };
    let dec = block(&config, &varmap);
    assert_eq!(dec.dropout(), 0.5);

    let x = Tensor::randn(0f32, 1., (2, 8, 4, 4), &device).unwrap();
    let a = dec.forward(&x).unwrap().flatten_all().unwrap();
    let b = dec.forward(&x).unwrap().flatten_all().unwrap();
    assert_eq!(a.to_vec1::<f32>().unwrap(), b.to_vec1::<f32>().unwrap());
  }

  #[test]
  fn wrong_channels_name_the_block() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let dec = block(&DecoderBlockConfig::new(1024, 512), &varmap);

    let x = Tensor::randn(0f32, 1., (1, 512, 2, 2), &device).unwrap();
    let err = dec.forward(&x).unwrap_err();
    assert_eq!(err.to_string(), "dec: expected 1024 input channels, got 512");
  }

  #[test]
  fn train_mode_drops_whole_planes() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let config = DecoderBlockConfig {
      norm: None,
      dropout: 0.5,
      ..DecoderBlockConfig::new(16, 16)
    };
    let dec = block(&config, &varmap);

    let x = Tensor::randn(0f32, 1., (4, 16, 4, 4), &device).unwrap();
    let kept = dec.forward(&x).unwrap().affine(2., 0.).unwrap();
    let y = dec.forward_t(&x, true).unwrap();

    let (mut dropped, mut scaled) = (0, 0);
    for n in 0..4 {
      for c in 0..16 {
        let plane = |t: &Tensor| t.get(n).unwrap().get(c).unwrap().flatten_all().unwrap();
        let got = plane(&y).to_vec1::<f32>().unwrap();
        let want = plane(&kept).to_vec1::<f32>().unwrap();

        if got.iter().all(|&v| v == 0.) {
          dropped += 1;
        } else {
          for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-5, "plane ({n}, {c}): {g} vs {w}");
          }
          scaled += 1;
        }
      }
    }
    assert!(dropped > 0 && scaled > 0, "{dropped} dropped, {scaled} kept");
  }

  fn run<M: ModuleT>(module: &M, x: &Tensor, train: bool) -> candle_core::Result<Tensor> {
    module.forward_t(x, train)
  }

  #[test]
  fn composes_as_module_t() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let dec = block(&DecoderBlockConfig::new(8, 4), &varmap);

    let x = Tensor::randn(0f32, 1., (2, 8, 3, 3), &device).unwrap();
    let direct = dec.forward(&x).unwrap().flatten_all().unwrap();
    let generic = run(&dec, &x, false).unwrap().flatten_all().unwrap();
    assert_eq!(
      direct.to_vec1::<f32>().unwrap(),
      generic.to_vec1::<f32>().unwrap()
    );

    let x = Tensor::randn(0f32, 1., (2, 5, 3, 3), &device).unwrap();
    let err = run(&dec, &x, false).unwrap_err();
    assert!(err
      .to_string()
      .contains("dec: expected 8 input channels, got 5"));
  }
}
