pub mod blocks;
pub mod discriminator;
pub mod generator;

pub use blocks::{
  DecoderBlock, DecoderBlockConfig, EncoderBlock, EncoderBlockConfig, NormKind,
};
pub use discriminator::{Discriminator, Discriminator286, DiscriminatorConfig, PatchGan};
pub use generator::{Generator, GeneratorConfig, UNetTrace};
