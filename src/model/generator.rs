use candle_core::Tensor;
use candle_nn::{ModuleT, VarBuilder};
use smallvec::SmallVec;

use crate::{
  error::{Error, Result, StageExt},
  model::blocks::{DecoderBlock, DecoderBlockConfig, EncoderBlock, EncoderBlockConfig, NormKind},
  utils::TensorExt,
};

/// Number of encoder (and decoder) stages.
pub const DEPTH: usize = 8;

const ENCODER_CHANNELS: [usize; DEPTH] = [64, 128, 256, 512, 512, 512, 512, 512];

// the last decoder maps to `out_channels`
const DECODER_CHANNELS: [usize; DEPTH - 1] = [512, 512, 512, 512, 256, 128, 64];

/// `SKIP_SOURCES[k]` is the encoder whose output is concatenated after the
/// output of decoder `k` (both 0-based). The last decoder takes no skip.
pub const SKIP_SOURCES: [usize; DEPTH - 1] = [6, 5, 4, 3, 2, 1, 0];

const DROPOUT_DECODERS: [usize; 3] = [1, 2, 3];

const STAGE: &str = "generator";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
  pub in_channels: usize,
  pub out_channels: usize,
  pub bias: bool,
  pub dropout: f32,
  pub norm: NormKind,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      in_channels: 3,
      out_channels: 3,
      bias: false,
      dropout: 0.5,
      norm: NormKind::Batch,
    }
  }
}

impl GeneratorConfig {
  pub fn with_norm(mut self, norm: &str) -> Result<Self> {
    self.norm = norm.parse()?;
    Ok(self)
  }
}

/// Tensors captured during one forward pass.
pub struct UNetTrace {
  /// Encoder outputs, shallowest first.
  pub encoded: SmallVec<[Tensor; DEPTH]>,
  /// The input each decoder received, first decoder first.
  pub decoder_inputs: SmallVec<[Tensor; DEPTH]>,
  pub output: Tensor,
}

/// 8-down / 8-up U-Net with channel-concatenated skip connections and a
/// tanh-bounded output.
pub struct Generator {
  encoders: Vec<EncoderBlock>,
  decoders: Vec<DecoderBlock>,
}

impl Generator {
  /// Height and width of every input must be a multiple of this.
  pub const SIZE_MULTIPLE: usize = 1 << DEPTH;

  pub fn new(config: &GeneratorConfig, vb: VarBuilder) -> Result<Self> {
    let mut encoders = Vec::with_capacity(DEPTH);
    let mut in_channels = config.in_channels;

    for (k, &out_channels) in ENCODER_CHANNELS.iter().enumerate() {
      let input_layer = k == 0;
      let bottleneck = k == DEPTH - 1;

      let block = EncoderBlockConfig {
        bias: config.bias,
        norm: (!input_layer && !bottleneck).then_some(config.norm),
        activation: !input_layer,
        ..EncoderBlockConfig::new(in_channels, out_channels)
      };

      encoders.push(EncoderBlock::new(
        &block,
        &format!("encoder{}", k + 1),
        vb.clone(),
      )?);
      in_channels = out_channels;
    }

    let mut decoders = Vec::with_capacity(DEPTH);

    for k in 0..DEPTH {
      let output_layer = k == DEPTH - 1;
      let out_channels = DECODER_CHANNELS.get(k).copied().unwrap_or(config.out_channels);

      let block = DecoderBlockConfig {
        bias: config.bias,
        norm: (!output_layer).then_some(config.norm),
        dropout: if DROPOUT_DECODERS.contains(&k) {
          config.dropout
        } else {
          0.
        },
        ..DecoderBlockConfig::new(in_channels, out_channels)
      };

      decoders.push(DecoderBlock::new(
        &block,
        &format!("decoder{}", k + 1),
        vb.clone(),
      )?);

      if let Some(&source) = SKIP_SOURCES.get(k) {
        in_channels = out_channels + ENCODER_CHANNELS[source];
      }
    }

    tracing::debug!(
      in_channels = config.in_channels,
      out_channels = config.out_channels,
      norm = %config.norm,
      dropout = config.dropout,
      "built U-Net generator"
    );

    Ok(Self { encoders, decoders })
  }

  pub fn encoders(&self) -> &[EncoderBlock] {
    &self.encoders
  }

  pub fn decoders(&self) -> &[DecoderBlock] {
    &self.decoders
  }

  pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
    self.run(x, train, |_| ()).map(|(_, output)| output)
  }

  pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
    self.forward_t(x, false)
  }

  pub fn forward_trace(&self, x: &Tensor, train: bool) -> Result<UNetTrace> {
    let mut decoder_inputs: SmallVec<[Tensor; DEPTH]> = SmallVec::new();
    let (encoded, output) = self.run(x, train, |input| decoder_inputs.push(input.clone()))?;

    Ok(UNetTrace {
      encoded,
      decoder_inputs,
      output,
    })
  }

  fn run(
    &self,
    x: &Tensor,
    train: bool,
    mut on_decoder_input: impl FnMut(&Tensor),
  ) -> Result<(SmallVec<[Tensor; DEPTH]>, Tensor)> {
    let (_, _, h, w) = x.dims4().at_stage(STAGE)?;

    if h == 0 || w == 0 || h % Self::SIZE_MULTIPLE != 0 || w % Self::SIZE_MULTIPLE != 0 {
      return Err(Error::InputSize {
        stage: STAGE.to_owned(),
        height: h,
        width: w,
        multiple: Self::SIZE_MULTIPLE,
      });
    }

    let mut encoded: SmallVec<[Tensor; DEPTH]> = SmallVec::new();
    let mut x = x.clone();

    for encoder in &self.encoders {
      x = encoder.forward_t(&x, train)?;
      encoded.push(x.clone());
    }

    for (k, decoder) in self.decoders.iter().enumerate() {
      on_decoder_input(&x);
      x = decoder.forward_t(&x, train)?;

      if let Some(&source) = SKIP_SOURCES.get(k) {
        x = x.cat_skip(&encoded[source], decoder.name())?;
      }
    }

    let output = x.tanh().at_stage(STAGE)?;

    Ok((encoded, output))
  }
}

impl ModuleT for Generator {
  fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
    Generator::forward_t(self, xs, train).map_err(candle_core::Error::wrap)
  }
}
