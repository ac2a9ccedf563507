//! Deterministic actor-critic with soft-updated targets.

use ml::{Adam, Mlp, Tape, Tensor};
use physics::Action;
use tracing::debug;

use crate::agent::{
    descend, frozen_forward, state_action, widths, ActMode, Agent, Checkpoint, Losses,
    UpdateOutcome,
};
use crate::buffer::ReplayBuffer;
use crate::config::DdpgConfig;
use crate::error::RlError;
use crate::exploration::OrnsteinUhlenbeck;
use crate::target::{TargetNetwork, TargetSync};
use crate::transition::{Batch, Transition};

/// DDPG agent for a one-dimensional bounded force.
///
/// The actor emits `tanh` of its last layer, i.e. a force normalised to
/// `[-1, 1]`; the critic reads the state joined with that normalised force.
pub struct DdpgAgent {
    config: DdpgConfig,
    max_force: f32,
    actor: Mlp,
    critic: Mlp,
    actor_target: TargetNetwork,
    critic_target: TargetNetwork,
    actor_opt: Adam,
    critic_opt: Adam,
    buffer: ReplayBuffer,
    noise: OrnsteinUhlenbeck,
    sync: TargetSync,
}

impl DdpgAgent {
    #[must_use]
    pub fn new(config: &DdpgConfig, obs_dim: usize, max_force: f32, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let actor = Mlp::new(&widths(obs_dim, &config.hidden, 1), config.activation, &mut rng)
            .with_output_init(config.output_init, &mut rng);
        let critic = Mlp::new(&widths(obs_dim + 1, &config.hidden, 1), config.activation, &mut rng);
        Self {
            actor_target: TargetNetwork::new(&actor),
            critic_target: TargetNetwork::new(&critic),
            actor_opt: Adam::for_mlp(&actor, config.actor_lr),
            critic_opt: Adam::for_mlp(&critic, config.critic_lr),
            buffer: ReplayBuffer::new(config.buffer_capacity, rng.u64(..)),
            noise: OrnsteinUhlenbeck::new(
                1,
                config.ou_theta,
                config.ou_sigma,
                config.ou_dt,
                rng.u64(..),
            ),
            sync: TargetSync::Soft { tau: config.tau },
            config: config.clone(),
            max_force,
            actor,
            critic,
        }
    }

    pub fn actor(&self) -> &Mlp {
        &self.actor
    }

    pub fn critic(&self) -> &Mlp {
        &self.critic
    }

    pub fn actor_target(&self) -> &Mlp {
        self.actor_target.net()
    }

    pub fn critic_target(&self) -> &Mlp {
        self.critic_target.net()
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// Normalised deterministic action in `[-1, 1]`.
    fn policy(&self, obs: &[f32]) -> f32 {
        self.actor.predict(&Tensor::row(obs)).data[0].tanh()
    }

    /// `y = r + γ · (1 − done) · Q'(s', μ'(s'))`, read from the targets only.
    #[must_use]
    pub fn critic_targets(&self, batch: &Batch) -> Vec<f32> {
        let mut tape = Tape::new();
        let next = tape.constant(batch.next_states.clone());
        let next_action = frozen_forward(self.actor_target.net(), &mut tape, next);
        let next_action = tape.tanh(next_action);
        let sa = state_action(&mut tape, &batch.next_states, next_action);
        let q_next = frozen_forward(self.critic_target.net(), &mut tape, sa);
        let gamma = self.config.gamma;
        batch
            .rewards
            .data
            .iter()
            .zip(batch.alive())
            .zip(&tape.value(q_next).data)
            .map(|((r, alive), q)| r + gamma * alive * q)
            .collect()
    }

    /// Regresses `Q(s, a)` onto the bootstrapped targets. Only the critic
    /// moves.
    ///
    /// # Errors
    ///
    /// Fails if the backward pass fails.
    pub fn update_critic(&mut self, batch: &Batch) -> anyhow::Result<f32> {
        let targets = self.critic_targets(batch);
        let mut tape = Tape::new();
        let bound = self.critic.bind(&mut tape, true);
        let actions = tape.constant(batch.actions.clone());
        let actions = tape.mul_scalar(actions, 1.0 / self.max_force);
        let sa = state_action(&mut tape, &batch.states, actions);
        let q = self.critic.forward(&mut tape, &bound, sa);
        let y = tape.constant(Tensor::column(targets));
        let loss = tape.mse(q, y);
        tape.backward(loss)?;
        descend(&mut self.critic, &mut self.critic_opt, &tape, &bound);
        Ok(tape.value(loss).data[0])
    }

    /// Ascends `Q(s, μ(s))` with the critic held fixed. Only the actor
    /// moves.
    ///
    /// # Errors
    ///
    /// Fails if the backward pass fails.
    pub fn update_actor(&mut self, batch: &Batch) -> anyhow::Result<f32> {
        let mut tape = Tape::new();
        let bound = self.actor.bind(&mut tape, true);
        let states = tape.constant(batch.states.clone());
        let action = self.actor.forward(&mut tape, &bound, states);
        let action = tape.tanh(action);
        let sa = state_action(&mut tape, &batch.states, action);
        let q = frozen_forward(&self.critic, &mut tape, sa);
        let mean_q = tape.reduce_mean(q);
        let loss = tape.neg(mean_q);
        tape.backward(loss)?;
        descend(&mut self.actor, &mut self.actor_opt, &tape, &bound);
        Ok(tape.value(loss).data[0])
    }

    /// Critic step, actor step, then both targets.
    ///
    /// # Errors
    ///
    /// Fails if either backward pass fails.
    pub fn update(&mut self, batch: &Batch) -> anyhow::Result<Losses> {
        let critic_loss = self.update_critic(batch)?;
        let actor_loss = self.update_actor(batch)?;
        self.sync.after_step(&mut self.actor_target, &self.actor);
        self.sync.after_step(&mut self.critic_target, &self.critic);
        debug!(critic_loss, actor_loss, "ddpg update");
        Ok(Losses::default().with("critic", critic_loss).with("actor", actor_loss))
    }
}

impl Agent for DdpgAgent {
    fn name(&self) -> &'static str {
        "ddpg"
    }

    fn act(&mut self, obs: &[f32], mode: ActMode) -> Action {
        let mean = self.policy(obs);
        let normalised = match mode {
            ActMode::Greedy => mean,
            ActMode::Explore => (mean + self.noise.sample()[0]).clamp(-1.0, 1.0),
        };
        Action::Continuous(normalised * self.max_force)
    }

    fn begin_episode(&mut self, _episode: usize) {
        self.noise.reset();
    }

    fn observe(&mut self, transition: Transition) -> anyhow::Result<UpdateOutcome> {
        self.buffer.store(transition);
        match self.buffer.sample(self.config.batch_size) {
            None => Ok(UpdateOutcome::Skipped),
            Some(batch) => Ok(UpdateOutcome::Trained(self.update(&batch)?)),
        }
    }

    fn export(&self) -> Checkpoint {
        Checkpoint::new(self.name())
            .with_network("actor", &self.actor)
            .with_network("critic", &self.critic)
            .with_network("actor_target", self.actor_target.net())
            .with_network("critic_target", self.critic_target.net())
    }

    fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), RlError> {
        checkpoint.expect_algorithm(self.name())?;
        let mut actor = self.actor.clone();
        let mut critic = self.critic.clone();
        let mut actor_target = self.actor_target.clone();
        let mut critic_target = self.critic_target.clone();
        checkpoint.restore("actor", &mut actor)?;
        checkpoint.restore("critic", &mut critic)?;
        checkpoint.restore("actor_target", actor_target.net_mut())?;
        checkpoint.restore("critic_target", critic_target.net_mut())?;
        self.actor = actor;
        self.critic = critic;
        self.actor_target = actor_target;
        self.critic_target = critic_target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_agent() -> DdpgAgent {
        let config = DdpgConfig { batch_size: 8, hidden: vec![16, 16], ..DdpgConfig::default() };
        let mut agent = DdpgAgent::new(&config, 4, 10.0, 1);
        let mut rng = fastrand::Rng::with_seed(2);
        for _ in 0..7 {
            let state: Vec<f32> = (0..4).map(|_| rng.f32() - 0.5).collect();
            let t = Transition {
                next_state: state.iter().map(|v| v * 0.9).collect(),
                state,
                action: Action::Continuous(rng.f32() * 20.0 - 10.0),
                reward: -rng.f32(),
                done: false,
            };
            assert_eq!(agent.observe(t).unwrap(), UpdateOutcome::Skipped);
        }
        agent
    }

    #[test]
    fn critic_update_leaves_actor_untouched() {
        let mut agent = filled_agent();
        let batch = Batch::from_transitions(agent.buffer.iter());
        let actor = agent.actor.clone();
        let critic = agent.critic.clone();
        agent.update_critic(&batch).unwrap();
        assert_eq!(agent.actor, actor);
        assert_ne!(agent.critic, critic);
    }

    #[test]
    fn actor_update_leaves_critic_untouched() {
        let mut agent = filled_agent();
        let batch = Batch::from_transitions(agent.buffer.iter());
        let actor = agent.actor.clone();
        let critic = agent.critic.clone();
        agent.update_actor(&batch).unwrap();
        assert_eq!(agent.critic, critic);
        assert_ne!(agent.actor, actor);
    }

    #[test]
    fn trains_once_batch_is_available() {
        let mut agent = filled_agent();
        let target_before = agent.actor_target().clone();
        let t = Transition {
            state: vec![0.0; 4],
            action: Action::Continuous(1.0),
            reward: -1.0,
            next_state: vec![0.0; 4],
            done: true,
        };
        let outcome = agent.observe(t).unwrap();
        let UpdateOutcome::Trained(losses) = outcome else { panic!("expected an update") };
        assert!(losses.get("critic").is_some_and(f32::is_finite));
        assert_ne!(agent.actor_target(), &target_before);
        assert_ne!(agent.actor_target(), agent.actor());
    }
}
