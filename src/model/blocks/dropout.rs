use candle_core::Tensor;
use candle_nn::ModuleT;

/// Drops whole `(sample, channel)` planes of an NCHW tensor.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDropout {
  drop_p: f32,
}

impl ChannelDropout {
  pub fn new(drop_p: f32) -> Self {
    Self { drop_p }
  }

  pub fn prob(&self) -> f32 {
    self.drop_p
  }
}

impl ModuleT for ChannelDropout {
  fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    if !train || self.drop_p == 0. {
      return Ok(x.clone());
    }

    let (n, c, _, _) = x.dims4()?;
    let mask_shape = (n, c, 1, 1);

    let rand = Tensor::rand(0f32, 1f32, mask_shape, x.device())?;
    let scale = 1.0 / (1.0 - self.drop_p as f64);
    let drop_p = Tensor::new(self.drop_p, x.device())?.broadcast_as(mask_shape)?;
    let mask = (rand.ge(&drop_p)?.to_dtype(x.dtype())? * scale)?;

    x.broadcast_mul(&mask)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use candle_core::{DType, Device};

  #[test]
  fn eval_is_identity() {
    let device = Device::Cpu;
    let x = Tensor::randn(0f32, 1., (2, 8, 4, 4), &device).unwrap();
    let y = ChannelDropout::new(0.5).forward_t(&x, false).unwrap();

    let diff = (x - y).unwrap().abs().unwrap().max_all().unwrap();
    assert_eq!(diff.to_scalar::<f32>().unwrap(), 0.);
  }

  #[test]
  fn train_drops_whole_channels() {
    let device = Device::Cpu;
    let x = Tensor::ones((2, 16, 4, 4), DType::F32, &device).unwrap();
    let y = ChannelDropout::new(0.5).forward_t(&x, true).unwrap();

    // each plane is either all zero or all scaled to 2
    let sums = y.sum_keepdim((2, 3)).unwrap().flatten_all().unwrap();
    for s in sums.to_vec1::<f32>().unwrap() {
      assert!(s == 0. || (s - 32.).abs() < 1e-5, "plane sum {s}");
    }
  }
}
