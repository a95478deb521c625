#![allow(dead_code)]

use candle_core::{DType, Device, Tensor};
use pix2pix::ParamSet;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub fn setup_tracing() {
  let subscriber = FmtSubscriber::builder()
    .with_max_level(Level::DEBUG)
    .with_target(false)
    .with_test_writer()
    .finish();

  // an earlier test in this binary may have installed it
  let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn params() -> ParamSet {
  ParamSet::new(DType::F32, &Device::Cpu)
}

/// Random image in the generator's [-1, 1] range.
pub fn image(n: usize, c: usize, h: usize, w: usize) -> Tensor {
  Tensor::rand(-1f32, 1f32, (n, c, h, w), &Device::Cpu).unwrap()
}

pub fn min_max(x: &Tensor) -> (f32, f32) {
  let min = x.flatten_all().unwrap().min(0).unwrap();
  let max = x.flatten_all().unwrap().max(0).unwrap();
  (min.to_scalar().unwrap(), max.to_scalar().unwrap())
}

pub fn values(x: &Tensor) -> Vec<f32> {
  x.flatten_all().unwrap().to_vec1().unwrap()
}
