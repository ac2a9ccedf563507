//! Single-trajectory proximal policy optimisation.

use ml::distributions::{gaussian_log_prob, gaussian_log_prob_on, standard_normal};
use ml::{Adam, Mlp, Tape, Tensor};
use physics::Action;
use tracing::debug;

use crate::agent::{descend, widths, ActMode, Agent, Checkpoint, Losses, UpdateOutcome};
use crate::config::PpoConfig;
use crate::error::RlError;
use crate::transition::Transition;

/// `G_t = r_t + γ · G_{t+1}`, computed backward from the episode end.
#[must_use]
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;
    for (t, r) in rewards.iter().enumerate().rev() {
        running = r + gamma * running;
        returns[t] = running;
    }
    returns
}

/// One step of the current trajectory.
#[derive(Clone, Debug)]
struct Step {
    obs: Vec<f32>,
    /// Unclipped normalised action that was sampled
    action: f32,
    log_prob: f32,
    reward: f32,
}

/// PPO agent for a one-dimensional bounded force.
///
/// The policy is a Gaussian whose mean comes from a network and whose
/// log-std is a single learned parameter. Samples are clipped to `[-1, 1]`
/// and scaled to a force before they reach the environment; the update
/// uses the unclipped sample.
pub struct PpoAgent {
    config: PpoConfig,
    max_force: f32,
    policy: Mlp,
    /// `[1]`
    log_std: Tensor,
    value: Mlp,
    policy_opt: Adam,
    log_std_opt: Adam,
    value_opt: Adam,
    trajectory: Vec<Step>,
    /// Sample and log-probability from the last exploring `act`
    pending: Option<(f32, f32)>,
    rng: fastrand::Rng,
}

impl PpoAgent {
    #[must_use]
    pub fn new(config: &PpoConfig, obs_dim: usize, max_force: f32, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let policy = Mlp::new(&widths(obs_dim, &config.hidden, 1), config.activation, &mut rng)
            .with_output_init(config.output_init, &mut rng);
        let value = Mlp::new(&widths(obs_dim, &config.hidden, 1), config.activation, &mut rng);
        let log_std = Tensor::from_vec(vec![1], vec![config.initial_log_std]);
        Self {
            policy_opt: Adam::for_mlp(&policy, config.policy_lr),
            log_std_opt: Adam::new(&[&log_std], config.policy_lr),
            value_opt: Adam::for_mlp(&value, config.value_lr),
            trajectory: Vec::new(),
            pending: None,
            rng: fastrand::Rng::with_seed(rng.u64(..)),
            config: config.clone(),
            max_force,
            policy,
            log_std,
            value,
        }
    }

    pub fn policy(&self) -> &Mlp {
        &self.policy
    }

    pub fn value(&self) -> &Mlp {
        &self.value
    }

    pub fn log_std(&self) -> f32 {
        self.log_std.data[0]
    }

    /// Steps recorded since the episode began.
    pub fn trajectory_len(&self) -> usize {
        self.trajectory.len()
    }

    fn mean(&self, obs: &[f32]) -> f32 {
        self.policy.predict(&Tensor::row(obs)).data[0]
    }

    /// Clipped-surrogate policy epochs, then value regression epochs, over
    /// the recorded trajectory.
    ///
    /// # Errors
    ///
    /// Fails if a backward pass fails.
    pub fn update(&mut self) -> anyhow::Result<UpdateOutcome> {
        let n = self.trajectory.len();
        if n == 0 {
            return Ok(UpdateOutcome::Skipped);
        }
        let width = self.trajectory[0].obs.len();
        let obs: Vec<&[f32]> = self.trajectory.iter().map(|s| s.obs.as_slice()).collect();
        let states = Tensor::stack(&obs, width);
        let actions = Tensor::column(self.trajectory.iter().map(|s| s.action).collect());
        let old_log_probs: Vec<f32> = self.trajectory.iter().map(|s| s.log_prob).collect();
        let rewards: Vec<f32> = self.trajectory.iter().map(|s| s.reward).collect();
        let returns = discounted_returns(&rewards, self.config.gamma);

        let baseline = self.value.predict(&states);
        let advantages = normalise(
            returns.iter().zip(&baseline.data).map(|(g, v)| g - v).collect(),
        );

        let (policy_loss, kl, epochs) =
            self.policy_epochs(&states, &actions, &old_log_probs, &advantages)?;
        let value_loss = self.value_epochs(&states, &returns)?;
        self.trajectory.clear();

        debug!(policy_loss, value_loss, kl, epochs, "ppo update");
        Ok(UpdateOutcome::Trained(
            Losses::default()
                .with("policy", policy_loss)
                .with("value", value_loss)
                .with("kl", kl)
                .with("policy_epochs", epochs as f32),
        ))
    }

    /// Returns the last policy loss, the last KL estimate and the number of
    /// epochs that stepped.
    fn policy_epochs(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        old_log_probs: &[f32],
        advantages: &[f32],
    ) -> anyhow::Result<(f32, f32, usize)> {
        let n = old_log_probs.len();
        let (mut loss_value, mut kl, mut epochs) = (0.0, 0.0, 0);
        for _ in 0..self.config.policy_epochs {
            let mut tape = Tape::new();
            let bound = self.policy.bind(&mut tape, true);
            let log_std = tape.param(&self.log_std);
            let s = tape.constant(states.clone());
            let mean = self.policy.forward(&mut tape, &bound, s);
            let zeros = tape.constant(Tensor::zeros(vec![n, 1]));
            let log_std_rows = tape.add_broadcast(zeros, log_std);
            let a = tape.constant(actions.clone());
            let new_log_probs = gaussian_log_prob_on(&mut tape, a, mean, log_std_rows);

            kl = old_log_probs
                .iter()
                .zip(&tape.value(new_log_probs).data)
                .map(|(old, new)| old - new)
                .sum::<f32>()
                / n as f32;
            if kl > self.config.target_kl_div {
                debug!(kl, epochs, "ppo policy epochs stopped early");
                break;
            }

            let old = tape.constant(Tensor::column(old_log_probs.to_vec()));
            let log_ratio = tape.sub(new_log_probs, old);
            let ratio = tape.exp(log_ratio);
            let adv = tape.constant(Tensor::column(advantages.to_vec()));
            let unclipped = tape.mul(ratio, adv);
            let clip = self.config.clip;
            let clipped = tape.clamp(ratio, 1.0 - clip, 1.0 + clip);
            let clipped = tape.mul(clipped, adv);
            let surrogate = tape.min(unclipped, clipped);
            let surrogate = tape.reduce_mean(surrogate);
            let loss = tape.neg(surrogate);
            tape.backward(loss)?;

            descend(&mut self.policy, &mut self.policy_opt, &tape, &bound);
            let grad = tape.grad(log_std).map_or_else(|| vec![0.0], <[f32]>::to_vec);
            self.log_std_opt.step(&mut [&mut self.log_std], &[grad]);
            loss_value = tape.value(loss).data[0];
            epochs += 1;
        }
        Ok((loss_value, kl, epochs))
    }

    fn value_epochs(&mut self, states: &Tensor, returns: &[f32]) -> anyhow::Result<f32> {
        let mut loss_value = 0.0;
        for _ in 0..self.config.value_epochs {
            let mut tape = Tape::new();
            let bound = self.value.bind(&mut tape, true);
            let s = tape.constant(states.clone());
            let v = self.value.forward(&mut tape, &bound, s);
            let g = tape.constant(Tensor::column(returns.to_vec()));
            let loss = tape.mse(v, g);
            tape.backward(loss)?;
            descend(&mut self.value, &mut self.value_opt, &tape, &bound);
            loss_value = tape.value(loss).data[0];
        }
        Ok(loss_value)
    }
}

/// Zero mean, unit variance; a single value is only centred.
fn normalise(values: Vec<f32>) -> Vec<f32> {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    if values.len() < 2 {
        return values.iter().map(|v| v - mean).collect();
    }
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
    values.iter().map(|v| (v - mean) / (std + 1e-8)).collect()
}

impl Agent for PpoAgent {
    fn name(&self) -> &'static str {
        "ppo"
    }

    fn act(&mut self, obs: &[f32], mode: ActMode) -> Action {
        let mean = self.mean(obs);
        let sample = match mode {
            ActMode::Greedy => mean,
            ActMode::Explore => {
                let log_std = self.log_std();
                let sample = mean + log_std.exp() * standard_normal(&mut self.rng);
                self.pending = Some((sample, gaussian_log_prob(sample, mean, log_std)));
                sample
            }
        };
        Action::Continuous(sample.clamp(-1.0, 1.0) * self.max_force)
    }

    fn begin_episode(&mut self, _episode: usize) {
        self.trajectory.clear();
        self.pending = None;
    }

    fn observe(&mut self, transition: Transition) -> anyhow::Result<UpdateOutcome> {
        let (action, log_prob) = match self.pending.take() {
            Some(pending) => pending,
            None => {
                // The action did not come from an exploring `act`; score the
                // applied one instead.
                let action = transition.action_values()[0] / self.max_force;
                let mean = self.mean(&transition.state);
                (action, gaussian_log_prob(action, mean, self.log_std()))
            }
        };
        self.trajectory.push(Step {
            obs: transition.state,
            action,
            log_prob,
            reward: transition.reward,
        });
        Ok(UpdateOutcome::Skipped)
    }

    fn end_episode(&mut self, _episode: usize) -> anyhow::Result<UpdateOutcome> {
        self.update()
    }

    fn export(&self) -> Checkpoint {
        Checkpoint::new(self.name())
            .with_network("policy", &self.policy)
            .with_network("value", &self.value)
            .with_scalar("log_std", self.log_std())
    }

    fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), RlError> {
        checkpoint.expect_algorithm(self.name())?;
        let log_std = checkpoint.scalar("log_std")?;
        let mut policy = self.policy.clone();
        let mut value = self.value.clone();
        checkpoint.restore("policy", &mut policy)?;
        checkpoint.restore("value", &mut value)?;
        self.policy = policy;
        self.value = value;
        self.log_std.data[0] = log_std;
        Ok(())
    }
}
