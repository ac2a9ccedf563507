//! Soft actor-critic with twin critics and a learned temperature.

use ml::distributions::{noise, squashed_sample, standard_normal};
use ml::{Adam, Bound, Mlp, Tape, Tensor, Var};
use physics::Action;
use tracing::debug;

use crate::agent::{
    descend, frozen_forward, state_action, widths, ActMode, Agent, Checkpoint, Losses,
    UpdateOutcome,
};
use crate::buffer::ReplayBuffer;
use crate::config::SacConfig;
use crate::error::RlError;
use crate::target::{TargetNetwork, TargetSync};
use crate::transition::{Batch, Transition};

pub const LOG_STD_MIN: f32 = -20.0;
pub const LOG_STD_MAX: f32 = 2.0;

/// Entropy-regularised bootstrap target per row:
/// `r + γ · alive · (min(q1, q2) − α · log π)`.
///
/// `alive` is `1` for transitions that may bootstrap and `0` for terminal
/// ones, where the target collapses to `r`.
#[must_use]
pub fn soft_q_target(
    rewards: &[f32],
    alive: &[f32],
    q1: &[f32],
    q2: &[f32],
    log_probs: &[f32],
    alpha: f32,
    gamma: f32,
) -> Vec<f32> {
    rewards
        .iter()
        .zip(alive)
        .zip(q1.iter().zip(q2))
        .zip(log_probs)
        .map(|(((r, a), (q1, q2)), lp)| r + gamma * a * (q1.min(*q2) - alpha * lp))
        .collect()
}

/// SAC agent for a one-dimensional bounded force.
///
/// The policy network emits `[mean, log_std]` of a Gaussian whose samples
/// are squashed by `tanh` into a normalised force.
pub struct SacAgent {
    config: SacConfig,
    max_force: f32,
    policy: Mlp,
    q1: Mlp,
    q2: Mlp,
    q1_target: TargetNetwork,
    q2_target: TargetNetwork,
    /// `[1]`
    log_alpha: Tensor,
    target_entropy: f32,
    policy_opt: Adam,
    q1_opt: Adam,
    q2_opt: Adam,
    alpha_opt: Adam,
    buffer: ReplayBuffer,
    sync: TargetSync,
    rng: fastrand::Rng,
}

impl SacAgent {
    #[must_use]
    pub fn new(config: &SacConfig, obs_dim: usize, max_force: f32, seed: u64) -> Self {
        const ACT_DIM: usize = 1;
        let mut rng = fastrand::Rng::with_seed(seed);
        let policy_sizes = widths(obs_dim, &config.hidden, 2 * ACT_DIM);
        let policy = Mlp::new(&policy_sizes, config.activation, &mut rng)
            .with_output_init(config.output_init, &mut rng);
        let q_sizes = widths(obs_dim + ACT_DIM, &config.hidden, 1);
        let q1 = Mlp::new(&q_sizes, config.activation, &mut rng);
        let q2 = Mlp::new(&q_sizes, config.activation, &mut rng);
        let log_alpha = Tensor::from_vec(vec![1], vec![config.initial_alpha.ln()]);
        Self {
            q1_target: TargetNetwork::new(&q1),
            q2_target: TargetNetwork::new(&q2),
            policy_opt: Adam::for_mlp(&policy, config.policy_lr),
            q1_opt: Adam::for_mlp(&q1, config.q_lr),
            q2_opt: Adam::for_mlp(&q2, config.q_lr),
            alpha_opt: Adam::new(&[&log_alpha], config.alpha_lr),
            target_entropy: config.target_entropy.unwrap_or(-(ACT_DIM as f32)),
            buffer: ReplayBuffer::new(config.buffer_capacity, rng.u64(..)),
            sync: TargetSync::Soft { tau: config.tau },
            rng: fastrand::Rng::with_seed(rng.u64(..)),
            config: config.clone(),
            max_force,
            policy,
            q1,
            q2,
            log_alpha,
        }
    }

    pub fn alpha(&self) -> f32 {
        self.log_alpha.data[0].exp()
    }

    pub fn policy(&self) -> &Mlp {
        &self.policy
    }

    pub fn critics(&self) -> (&Mlp, &Mlp) {
        (&self.q1, &self.q2)
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// Mean and clamped log-std columns of the policy output.
    fn heads(&self, tape: &mut Tape, bound: &Bound, states: Var) -> (Var, Var) {
        let out = self.policy.forward(tape, bound, states);
        let mean = tape.slice(out, 0, 1);
        let log_std = tape.slice(out, 1, 1);
        let log_std = tape.clamp(log_std, LOG_STD_MIN, LOG_STD_MAX);
        (mean, log_std)
    }

    /// Soft targets from the target critics and a fresh policy sample at
    /// the next states.
    fn critic_targets(&mut self, batch: &Batch) -> Vec<f32> {
        let n = batch.len();
        let eps = noise(n, 1, &mut self.rng);
        let mut tape = Tape::new();
        let bound = self.policy.bind(&mut tape, false);
        let next = tape.constant(batch.next_states.clone());
        let (mean, log_std) = self.heads(&mut tape, &bound, next);
        let eps = tape.constant(eps);
        let sample = squashed_sample(&mut tape, mean, log_std, eps, 1.0);
        let sa = state_action(&mut tape, &batch.next_states, sample.action);
        let q1 = frozen_forward(self.q1_target.net(), &mut tape, sa);
        let q2 = frozen_forward(self.q2_target.net(), &mut tape, sa);
        soft_q_target(
            &batch.rewards.data,
            &batch.alive(),
            &tape.value(q1).data,
            &tape.value(q2).data,
            &tape.value(sample.log_prob).data,
            self.alpha(),
            self.config.gamma,
        )
    }

    fn update_critics(&mut self, batch: &Batch) -> anyhow::Result<(f32, f32)> {
        let targets = self.critic_targets(batch);
        let mut tape = Tape::new();
        let b1 = self.q1.bind(&mut tape, true);
        let b2 = self.q2.bind(&mut tape, true);
        let actions = tape.constant(batch.actions.clone());
        let actions = tape.mul_scalar(actions, 1.0 / self.max_force);
        let sa = state_action(&mut tape, &batch.states, actions);
        let q1 = self.q1.forward(&mut tape, &b1, sa);
        let q2 = self.q2.forward(&mut tape, &b2, sa);
        let y = tape.constant(Tensor::column(targets));
        let l1 = tape.mse(q1, y);
        let l2 = tape.mse(q2, y);
        let loss = tape.add(l1, l2);
        tape.backward(loss)?;
        descend(&mut self.q1, &mut self.q1_opt, &tape, &b1);
        descend(&mut self.q2, &mut self.q2_opt, &tape, &b2);
        Ok((tape.value(l1).data[0], tape.value(l2).data[0]))
    }

    /// Minimises `α · log π(a|s) − min(Q1, Q2)(s, a)` over reparameterised
    /// samples. Returns the loss and the detached log-probabilities.
    fn update_policy(&mut self, batch: &Batch) -> anyhow::Result<(f32, Vec<f32>)> {
        let eps = noise(batch.len(), 1, &mut self.rng);
        let mut tape = Tape::new();
        let bound = self.policy.bind(&mut tape, true);
        let states = tape.constant(batch.states.clone());
        let (mean, log_std) = self.heads(&mut tape, &bound, states);
        let eps = tape.constant(eps);
        let sample = squashed_sample(&mut tape, mean, log_std, eps, 1.0);
        let sa = state_action(&mut tape, &batch.states, sample.action);
        let q1 = frozen_forward(&self.q1, &mut tape, sa);
        let q2 = frozen_forward(&self.q2, &mut tape, sa);
        let q = tape.min(q1, q2);
        let entropy_term = tape.mul_scalar(sample.log_prob, self.alpha());
        let objective = tape.sub(entropy_term, q);
        let loss = tape.reduce_mean(objective);
        tape.backward(loss)?;
        descend(&mut self.policy, &mut self.policy_opt, &tape, &bound);
        Ok((tape.value(loss).data[0], tape.value(sample.log_prob).data.clone()))
    }

    /// Gradient step on `−α · mean(log π + target_entropy)`.
    fn update_alpha(&mut self, log_probs: &[f32]) -> anyhow::Result<f32> {
        let shifted: Vec<f32> = log_probs.iter().map(|lp| lp + self.target_entropy).collect();
        let mut tape = Tape::new();
        let log_alpha = tape.param(&self.log_alpha);
        let alpha = tape.exp(log_alpha);
        let shifted = tape.constant(Tensor::column(shifted));
        let weighted = tape.scale(shifted, alpha);
        let mean = tape.reduce_mean(weighted);
        let loss = tape.neg(mean);
        tape.backward(loss)?;
        let grad = tape.grad(log_alpha).map_or_else(|| vec![0.0], <[f32]>::to_vec);
        self.alpha_opt.step(&mut [&mut self.log_alpha], &[grad]);
        Ok(tape.value(loss).data[0])
    }

    /// Both critics, the policy, the temperature, then both targets.
    ///
    /// # Errors
    ///
    /// Fails if a backward pass fails.
    pub fn update(&mut self, batch: &Batch) -> anyhow::Result<Losses> {
        let (q1_loss, q2_loss) = self.update_critics(batch)?;
        let (policy_loss, log_probs) = self.update_policy(batch)?;
        let alpha_loss = self.update_alpha(&log_probs)?;
        self.sync.after_step(&mut self.q1_target, &self.q1);
        self.sync.after_step(&mut self.q2_target, &self.q2);
        debug!(q1_loss, q2_loss, policy_loss, alpha = self.alpha(), "sac update");
        Ok(Losses::default()
            .with("q1", q1_loss)
            .with("q2", q2_loss)
            .with("policy", policy_loss)
            .with("alpha", alpha_loss))
    }
}

impl Agent for SacAgent {
    fn name(&self) -> &'static str {
        "sac"
    }

    fn act(&mut self, obs: &[f32], mode: ActMode) -> Action {
        let out = self.policy.predict(&Tensor::row(obs));
        let mean = out.data[0];
        let u = match mode {
            ActMode::Greedy => mean,
            ActMode::Explore => {
                let log_std = out.data[1].clamp(LOG_STD_MIN, LOG_STD_MAX);
                mean + log_std.exp() * standard_normal(&mut self.rng)
            }
        };
        Action::Continuous(u.tanh() * self.max_force)
    }

    fn observe(&mut self, transition: Transition) -> anyhow::Result<UpdateOutcome> {
        self.buffer.store(transition);
        if self.buffer.len() < self.config.min_buffer.max(self.config.batch_size) {
            return Ok(UpdateOutcome::Skipped);
        }
        match self.buffer.sample(self.config.batch_size) {
            None => Ok(UpdateOutcome::Skipped),
            Some(batch) => Ok(UpdateOutcome::Trained(self.update(&batch)?)),
        }
    }

    fn export(&self) -> Checkpoint {
        Checkpoint::new(self.name())
            .with_network("policy", &self.policy)
            .with_network("q1", &self.q1)
            .with_network("q2", &self.q2)
            .with_network("q1_target", self.q1_target.net())
            .with_network("q2_target", self.q2_target.net())
            .with_scalar("log_alpha", self.log_alpha.data[0])
    }

    fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), RlError> {
        checkpoint.expect_algorithm(self.name())?;
        let log_alpha = checkpoint.scalar("log_alpha")?;
        let mut policy = self.policy.clone();
        let mut q1 = self.q1.clone();
        let mut q2 = self.q2.clone();
        let mut q1_target = self.q1_target.clone();
        let mut q2_target = self.q2_target.clone();
        checkpoint.restore("policy", &mut policy)?;
        checkpoint.restore("q1", &mut q1)?;
        checkpoint.restore("q2", &mut q2)?;
        checkpoint.restore("q1_target", q1_target.net_mut())?;
        checkpoint.restore("q2_target", q2_target.net_mut())?;
        self.policy = policy;
        self.q1 = q1;
        self.q2 = q2;
        self.q1_target = q1_target;
        self.q2_target = q2_target;
        self.log_alpha.data[0] = log_alpha;
        Ok(())
    }
}
