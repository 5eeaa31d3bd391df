//! Streaming normalizer of observations and rewards.
use tch::{nn, Kind, Tensor};

const EPSILON: f64 = 1e-8;

/// Keeps running estimates of the mean and the variance of vectors of size `dim`.
///
/// Estimates are non-trainable variables of the [`VarStore`] the normalizer is built on,
/// so they are saved and loaded together with the parameters of the networks. Batches are
/// merged with the parallel algorithm of Chan et al.; before the first update the mean is
/// zero and the variance one.
///
/// [`VarStore`]: https://docs.rs/tch/0.16.0/tch/nn/struct.VarStore.html
pub struct Normalizer {
    count: Tensor,
    mean: Tensor,
    var: Tensor,
}

impl Normalizer {
    /// Builds a normalizer with its variables under `p`.
    pub fn build(p: &nn::Path, dim: i64) -> Self {
        Self {
            count: p.zeros_no_train("count", &[1]),
            mean: p.zeros_no_train("mean", &[dim]),
            var: p.ones_no_train("var", &[dim]),
        }
    }

    /// Number of vectors observed so far.
    pub fn count(&self) -> f64 {
        self.count.double_value(&[0])
    }

    /// Current estimate of the mean.
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// Current estimate of the variance.
    pub fn var(&self) -> &Tensor {
        &self.var
    }

    /// Merges a batch of shape `[N, dim]` into the estimates.
    pub fn update(&mut self, batch: &Tensor) {
        let n = batch.size()[0];
        if n == 0 {
            return;
        }
        let n = n as f64;
        tch::no_grad(|| {
            let batch = batch.to_kind(Kind::Float).to(self.mean.device());
            let batch_mean = batch.mean_dim(Some(&[0i64][..]), false, Kind::Float);
            let batch_var = (&batch - &batch_mean)
                .pow_tensor_scalar(2)
                .mean_dim(Some(&[0i64][..]), false, Kind::Float);

            let total = &self.count + n;
            let delta = &batch_mean - &self.mean;
            let mean = &self.mean + &delta * n / &total;
            let m2 = &self.var * &self.count
                + batch_var * n
                + delta.pow_tensor_scalar(2) * &self.count * n / &total;
            let var = m2 / &total;

            self.mean.copy_(&mean);
            self.var.copy_(&var);
            self.count.copy_(&total);
        });
    }

    /// Normalizes `x` of shape `[N, dim]`.
    ///
    /// Divides by the standard deviation, subtracting the mean first if `center_mean`,
    /// and clips the result to `[-clip, clip]` if given.
    pub fn normalize(&self, x: &Tensor, center_mean: bool, clip: Option<f64>) -> Tensor {
        let std = (&self.var + EPSILON).sqrt();
        let x = if center_mean {
            (x - &self.mean) / std
        } else {
            x / std
        };
        match clip {
            Some(c) => x.clamp(-c, c),
            None => x,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    fn batch(xs: &[f32]) -> Tensor {
        Tensor::from_slice(xs).reshape(&[-1, 1])
    }

    #[test]
    fn test_streaming_estimates() {
        let vs = VarStore::new(Device::Cpu);
        let mut norm = Normalizer::build(&(vs.root() / "obs"), 1);
        assert_eq!(norm.count(), 0.0);

        norm.update(&batch(&[1.0, 2.0]));
        norm.update(&batch(&[3.0, 4.0, 5.0]));
        assert_eq!(norm.count(), 5.0);
        assert!(approx(norm.mean().double_value(&[0]), 3.0));
        assert!(approx(norm.var().double_value(&[0]), 2.0));

        let y = norm.normalize(&batch(&[5.0]), true, None);
        assert!(approx(y.double_value(&[0, 0]), 2.0 / 2f64.sqrt()));
        let y = norm.normalize(&batch(&[100.0]), false, Some(5.0));
        assert_eq!(y.double_value(&[0, 0]), 5.0);
    }

    #[test]
    fn test_matches_full_batch_estimates() {
        fastrand::seed(42);
        let xs: Vec<f32> = (0..60).map(|_| fastrand::f32() * 10.0 - 5.0).collect();
        let vs = VarStore::new(Device::Cpu);
        let mut norm = Normalizer::build(&vs.root(), 3);
        for chunk in xs.chunks(12) {
            norm.update(&Tensor::from_slice(chunk).reshape(&[-1, 3]));
        }

        let all = Tensor::from_slice(&xs).reshape(&[-1, 3]);
        let mean = all.mean_dim(Some(&[0i64][..]), false, Kind::Float);
        let var = (&all - &mean)
            .pow_tensor_scalar(2)
            .mean_dim(Some(&[0i64][..]), false, Kind::Float);
        for i in 0..3 {
            assert!(approx(norm.mean().double_value(&[i]), mean.double_value(&[i])));
            assert!(approx(norm.var().double_value(&[i]), var.double_value(&[i])));
        }
    }

    #[test]
    fn test_variables_are_not_trainable() {
        let vs = VarStore::new(Device::Cpu);
        let _norm = Normalizer::build(&(vs.root() / "obs"), 3);
        assert_eq!(vs.variables().len(), 3);
        assert!(vs.trainable_variables().is_empty());
    }

    #[test]
    fn test_identity_before_update() {
        let vs = VarStore::new(Device::Cpu);
        let norm = Normalizer::build(&vs.root(), 2);
        let x = Tensor::from_slice(&[0.5f32, -0.5]).reshape(&[1, 2]);
        let y = norm.normalize(&x, true, None);
        assert!(approx(y.double_value(&[0, 1]), -0.5));
    }
}
