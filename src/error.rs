use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unsupported normalization mode `{0}`, expected `batch` or `instance`")]
  UnsupportedNorm(String),

  #[error("{stage}: invalid configuration, {reason}")]
  InvalidConfig { stage: String, reason: String },

  #[error("{stage}: expected {expected} input channels, got {actual}")]
  ChannelMismatch {
    stage: String,
    expected: usize,
    actual: usize,
  },

  #[error("{stage}: shape mismatch, expected {expected:?}, got {actual:?}")]
  SpatialMismatch {
    stage: String,
    expected: Vec<usize>,
    actual: Vec<usize>,
  },

  #[error("{stage}: input is {height}x{width}, both sides must be a multiple of {multiple}")]
  InputSize {
    stage: String,
    height: usize,
    width: usize,
    multiple: usize,
  },

  #[error("{stage}: input is {height}x{width}, each side must be at least {minimum}")]
  InputTooSmall {
    stage: String,
    height: usize,
    width: usize,
    minimum: usize,
  },

  #[error("{stage}: {source}")]
  Tensor {
    stage: String,
    #[source]
    source: candle_core::Error,
  },

  #[error("no running statistic named `{0}` in the snapshot")]
  MissingStat(String),

  #[error("parameter store lock is poisoned")]
  ParamsPoisoned,

  #[error(transparent)]
  Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tags substrate failures with the block that raised them.
pub trait StageExt<T> {
  fn at_stage(self, stage: &str) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, candle_core::Error> {
  fn at_stage(self, stage: &str) -> Result<T> {
    self.map_err(|source| Error::Tensor {
      stage: stage.to_owned(),
      source,
    })
  }
}
