//! pix2pix network definitions on candle.
//!
//! An 8-down / 8-up U-Net [`Generator`] and two PatchGAN discriminators
//! ([`Discriminator`], 70x70 receptive field, and [`Discriminator286`]).
//! Every forward call takes an explicit `train` flag: batch norm updates its
//! running statistics and channel dropout is active only when it is set.
//!
//! ```no_run
//! use candle_core::{DType, Device, Tensor};
//! use pix2pix::{Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, ParamSet};
//!
//! # fn main() -> pix2pix::Result<()> {
//! let device = Device::Cpu;
//! let params = ParamSet::new(DType::F32, &device);
//!
//! let generator = Generator::new(&GeneratorConfig::default(), params.var_builder().pp("gen"))?;
//! let discriminator =
//!   Discriminator::new(&DiscriminatorConfig::default(), params.var_builder().pp("disc"))?;
//!
//! let input = Tensor::randn(0f32, 1., (1, 3, 256, 256), &device)?;
//! let fake = generator.forward_t(&input, true)?;
//! let score = discriminator.forward_t(&fake, &input, true)?;
//! assert_eq!(score.dims(), &[1, 1, 30, 30]);
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
mod params;
mod utils;

pub use error::{Error, Result, StageExt};
pub use model::*;
pub use params::ParamSet;
pub use utils::TensorExt;
