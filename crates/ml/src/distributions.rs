//! Diagonal Gaussian policies.
//!
//! Sampling is split into drawing standard-normal noise (the only random
//! step) and the deterministic reparameterization `mean + std * noise`, so
//! gradients can flow through a sample and tests can fix the noise.

use crate::tape::{Tape, Var};
use crate::Tensor;

/// `ln(2π) / 2`
pub const HALF_LN_2PI: f32 = 0.918_938_5;

/// Keeps `ln(1 - tanh²)` finite at saturation.
pub const TANH_EPS: f32 = 1e-6;

/// Draws one `N(0, 1)` value with the Box–Muller transform.
pub fn standard_normal(rng: &mut fastrand::Rng) -> f32 {
    // 1 - U keeps the logarithm away from zero
    let u1 = 1.0 - rng.f32();
    let u2 = rng.f32();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// A `[rows, cols]` tensor of independent standard-normal draws.
pub fn noise(rows: usize, cols: usize, rng: &mut fastrand::Rng) -> Tensor {
    let data = (0..rows * cols).map(|_| standard_normal(rng)).collect();
    Tensor::from_vec(vec![rows, cols], data)
}

/// The reparameterized sample `mean + std * noise`.
#[must_use]
pub fn reparameterize(mean: f32, std: f32, noise: f32) -> f32 {
    mean + std * noise
}

/// Log density of `x` under `N(mean, exp(log_std)²)`.
#[must_use]
pub fn gaussian_log_prob(x: f32, mean: f32, log_std: f32) -> f32 {
    let z = (x - mean) / log_std.exp();
    -0.5 * z * z - log_std - HALF_LN_2PI
}

/// `ln |d tanh(u) / du|`, subtracted from the Gaussian log density when a
/// sample is squashed through `tanh`.
#[must_use]
pub fn tanh_log_det(u: f32) -> f32 {
    let t = u.tanh();
    (1.0 - t * t + TANH_EPS).ln()
}

/// A `tanh`-squashed reparameterized sample recorded on a tape.
#[derive(Clone, Copy, Debug)]
pub struct SquashedSample {
    /// `scale * tanh(mean + std * noise)`, `[n, act]`
    pub action: Var,
    /// Corrected log-probability per row, `[n, 1]`
    pub log_prob: Var,
}

/// Samples `scale * tanh(u)` with `u = mean + exp(log_std) * noise` and its
/// log-probability, including the `tanh` Jacobian correction.
///
/// `noise` is normally a constant; its value fixes the sample.
pub fn squashed_sample(
    tape: &mut Tape,
    mean: Var,
    log_std: Var,
    noise: Var,
    scale: f32,
) -> SquashedSample {
    let std = tape.exp(log_std);
    let spread = tape.mul(std, noise);
    let u = tape.add(mean, spread);
    let squashed = tape.tanh(u);
    let action = tape.mul_scalar(squashed, scale);

    // (u - mean) / std is exactly the noise
    let noise_sq = tape.square(noise);
    let quad = tape.mul_scalar(noise_sq, -0.5);
    let gauss = tape.sub(quad, log_std);
    let gauss = tape.add_scalar(gauss, -HALF_LN_2PI);

    let sq = tape.square(squashed);
    let one_minus = tape.mul_scalar(sq, -1.0);
    let one_minus = tape.add_scalar(one_minus, 1.0 + TANH_EPS);
    let log_det = tape.log(one_minus);

    let per_dim = tape.sub(gauss, log_det);
    let log_prob = tape.row_sum(per_dim);
    SquashedSample { action, log_prob }
}

/// Per-row log density of `actions` under `N(mean, exp(log_std)²)`.
///
/// `log_std` must have the same shape as `mean`.
pub fn gaussian_log_prob_on(tape: &mut Tape, actions: Var, mean: Var, log_std: Var) -> Var {
    let diff = tape.sub(actions, mean);
    let neg = tape.neg(log_std);
    let inv_std = tape.exp(neg);
    let z = tape.mul(diff, inv_std);
    let z_sq = tape.square(z);
    let quad = tape.mul_scalar(z_sq, -0.5);
    let per_dim = tape.sub(quad, log_std);
    let per_dim = tape.add_scalar(per_dim, -HALF_LN_2PI);
    tape.row_sum(per_dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standard_normal_has_unit_moments() {
        let mut rng = fastrand::Rng::with_seed(11);
        let draws: Vec<f32> = (0..20_000).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f32>() / draws.len() as f32;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / draws.len() as f32;
        assert!(mean.abs() < 0.03, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "var {var}");
    }

    #[test]
    fn reparameterization_is_deterministic_given_noise() {
        assert_relative_eq!(reparameterize(0.5, 2.0, -0.25), 0.0);
        assert_relative_eq!(reparameterize(0.5, 2.0, -0.25), reparameterize(0.5, 2.0, -0.25));
    }

    #[test]
    fn squashed_log_prob_matches_scalar_formula() {
        let (mean, log_std, eps) = (0.3f32, -0.7f32, 0.8f32);
        let mut tape = Tape::new();
        let m = tape.constant(Tensor::from_vec(vec![1, 1], vec![mean]));
        let s = tape.constant(Tensor::from_vec(vec![1, 1], vec![log_std]));
        let n = tape.constant(Tensor::from_vec(vec![1, 1], vec![eps]));
        let sample = squashed_sample(&mut tape, m, s, n, 2.0);

        let u = reparameterize(mean, log_std.exp(), eps);
        let expected = gaussian_log_prob(u, mean, log_std) - tanh_log_det(u);
        assert_relative_eq!(tape.value(sample.log_prob).data[0], expected, epsilon = 1e-5);
        assert_relative_eq!(tape.value(sample.action).data[0], 2.0 * u.tanh(), epsilon = 1e-6);
    }

    #[test]
    fn tape_gaussian_log_prob_matches_scalar_formula() {
        let mut tape = Tape::new();
        let a = tape.constant(Tensor::from_vec(vec![2, 1], vec![0.1, -1.2]));
        let m = tape.constant(Tensor::from_vec(vec![2, 1], vec![0.0, 0.4]));
        let s = tape.constant(Tensor::from_vec(vec![2, 1], vec![-0.5, 0.2]));
        let lp = gaussian_log_prob_on(&mut tape, a, m, s);
        let v = &tape.value(lp).data;
        assert_relative_eq!(v[0], gaussian_log_prob(0.1, 0.0, -0.5), epsilon = 1e-5);
        assert_relative_eq!(v[1], gaussian_log_prob(-1.2, 0.4, 0.2), epsilon = 1e-5);
    }
}
