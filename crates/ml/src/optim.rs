use crate::nn::Mlp;
use crate::Tensor;

/// Adam with bias-corrected step size.
#[derive(Clone, Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: u32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(params: &[&Tensor], lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: params.iter().map(|p| vec![0.0; p.data.len()]).collect(),
            v: params.iter().map(|p| vec![0.0; p.data.len()]).collect(),
        }
    }

    /// An optimiser over every parameter of `net`.
    pub fn for_mlp(net: &Mlp, lr: f32) -> Self {
        Self::new(&net.params(), lr)
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> u32 {
        self.t
    }

    /// Applies one descent step; `grads[i]` belongs to `params[i]`.
    ///
    /// # Panics
    ///
    /// Panics if the parameter list does not match the one the optimiser
    /// was created for.
    pub fn step(&mut self, params: &mut [&mut Tensor], grads: &[Vec<f32>]) {
        assert_eq!(params.len(), self.m.len(), "parameter count changed");
        assert_eq!(params.len(), grads.len(), "one gradient per parameter");
        self.t += 1;
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let lr_t = self.lr * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        for (i, p) in params.iter_mut().enumerate() {
            let grad = &grads[i];
            for j in 0..p.data.len() {
                self.m[i][j] = self.beta1 * self.m[i][j] + (1.0 - self.beta1) * grad[j];
                self.v[i][j] = self.beta2 * self.v[i][j] + (1.0 - self.beta2) * grad[j].powi(2);
                p.data[j] -= lr_t * self.m[i][j] / (self.v[i][j].sqrt() + self.eps);
            }
        }
    }

    /// Steps `net` with gradients from [`Mlp::gradients`].
    pub fn step_mlp(&mut self, net: &mut Mlp, grads: &[Vec<f32>]) {
        self.step(&mut net.params_mut(), grads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_lr_against_gradient_sign() {
        let mut p = Tensor::from_vec(vec![2], vec![1.0, -1.0]);
        let mut opt = Adam::new(&[&p], 0.1);
        opt.step(&mut [&mut p], &[vec![4.0, -0.5]]);
        assert!((p.data[0] - 0.9).abs() < 1e-4);
        assert!((p.data[1] + 0.9).abs() < 1e-4);
        assert_eq!(opt.steps(), 1);
    }

    #[test]
    fn minimises_a_quadratic() {
        let mut x = Tensor::from_vec(vec![1], vec![5.0]);
        let mut opt = Adam::new(&[&x], 0.1);
        for _ in 0..500 {
            let grad = vec![2.0 * (x.data[0] - 2.0)];
            opt.step(&mut [&mut x], &[grad]);
        }
        assert!((x.data[0] - 2.0).abs() < 0.05, "{}", x.data[0]);
    }
}
