//! Noise injected into actions while collecting experience.

use ml::distributions::standard_normal;

/// Discretised Ornstein–Uhlenbeck process.
///
/// `x ← x + θ(μ − x)·dt + σ·√dt·N(0, 1)`, carried across calls and reset at
/// the start of every episode.
pub struct OrnsteinUhlenbeck {
    pub theta: f32,
    pub sigma: f32,
    pub dt: f32,
    mu: Vec<f32>,
    x_prev: Vec<f32>,
    rng: fastrand::Rng,
}

impl OrnsteinUhlenbeck {
    #[must_use]
    pub fn new(dim: usize, theta: f32, sigma: f32, dt: f32, seed: u64) -> Self {
        Self {
            theta,
            sigma,
            dt,
            mu: vec![0.0; dim],
            x_prev: vec![0.0; dim],
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn sample(&mut self) -> Vec<f32> {
        let scale = self.sigma * self.dt.sqrt();
        for (x, mu) in self.x_prev.iter_mut().zip(&self.mu) {
            *x += self.theta * (mu - *x) * self.dt + scale * standard_normal(&mut self.rng);
        }
        self.x_prev.clone()
    }

    pub fn reset(&mut self) {
        self.x_prev.iter_mut().for_each(|x| *x = 0.0);
    }

    #[must_use]
    pub fn state(&self) -> &[f32] {
        &self.x_prev
    }
}

/// Linear decay from 1 toward `min_eps`, reached at `max_episode`.
#[must_use]
pub fn epsilon_annealing(episode: usize, max_episode: usize, min_eps: f32) -> f32 {
    if max_episode == 0 {
        return min_eps;
    }
    let slope = (min_eps - 1.0) / max_episode as f32;
    (slope * episode as f32 + 1.0).max(min_eps)
}

/// Index of the largest value; ties go to the first.
#[must_use]
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// ε-greedy choice over per-action values.
pub struct EpsilonGreedy {
    epsilon: f32,
    min_epsilon: f32,
    decay_episodes: usize,
    rng: fastrand::Rng,
}

impl EpsilonGreedy {
    #[must_use]
    pub fn new(min_epsilon: f32, decay_episodes: usize, seed: u64) -> Self {
        Self { epsilon: 1.0, min_epsilon, decay_episodes, rng: fastrand::Rng::with_seed(seed) }
    }

    /// Sets ε for `episode`.
    pub fn anneal(&mut self, episode: usize) {
        self.epsilon = epsilon_annealing(episode, self.decay_episodes, self.min_epsilon);
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn choose(&mut self, values: &[f32]) -> usize {
        if self.rng.f32() < self.epsilon {
            self.rng.usize(..values.len())
        } else {
            argmax(values)
        }
    }
}
