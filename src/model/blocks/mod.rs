mod decoder_block;
mod dropout;
mod encoder_block;
mod norm;

pub use decoder_block::*;
pub use dropout::*;
pub use encoder_block::*;
pub use norm::*;

use crate::error::{Error, Result};

fn invalid(stage: &str, reason: impl Into<String>) -> Error {
  Error::InvalidConfig {
    stage: stage.to_owned(),
    reason: reason.into(),
  }
}

fn validate_channels(stage: &str, in_channels: usize, out_channels: usize) -> Result<()> {
  if in_channels == 0 || out_channels == 0 {
    return Err(invalid(
      stage,
      format!("channel counts must be positive, got {in_channels} -> {out_channels}"),
    ));
  }

  Ok(())
}
