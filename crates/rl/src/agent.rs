//! The update-rule abstraction shared by every algorithm.

use std::collections::BTreeMap;

use ml::{Adam, Bound, Mlp, NetworkSnapshot, Tape, Tensor, Var};
use physics::{Action, ActionSpace};
use serde::{Deserialize, Serialize};

use crate::config::{Algorithm, ExperimentConfig};
use crate::ddpg::DdpgAgent;
use crate::dqn::DqnAgent;
use crate::error::RlError;
use crate::ppo::PpoAgent;
use crate::sac::SacAgent;
use crate::transition::Transition;

/// Whether an action is for collecting experience or for evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActMode {
    /// Add exploration noise or sample from the policy.
    Explore,
    /// Deterministic best action.
    Greedy,
}

/// Named scalar losses from one update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Losses(Vec<(&'static str, f32)>);

impl Losses {
    #[must_use]
    pub fn with(mut self, name: &'static str, value: f32) -> Self {
        self.0.push((name, value));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.0.iter().copied()
    }
}

/// What a call into the update rule did.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOutcome {
    /// Not enough data yet.
    Skipped,
    Trained(Losses),
}

/// Parameters of every trainable network plus loose scalars.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub algorithm: String,
    pub networks: BTreeMap<String, NetworkSnapshot>,
    pub scalars: BTreeMap<String, f32>,
}

impl Checkpoint {
    #[must_use]
    pub fn new(algorithm: &str) -> Self {
        Self { algorithm: algorithm.to_owned(), ..Self::default() }
    }

    #[must_use]
    pub fn with_network(mut self, name: &str, net: &Mlp) -> Self {
        self.networks.insert(name.to_owned(), net.export());
        self
    }

    #[must_use]
    pub fn with_scalar(mut self, name: &str, value: f32) -> Self {
        self.scalars.insert(name.to_owned(), value);
        self
    }

    /// Checks that this checkpoint was written by `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`RlError::Checkpoint`] on a mismatch.
    pub fn expect_algorithm(&self, algorithm: &str) -> Result<(), RlError> {
        if self.algorithm == algorithm {
            Ok(())
        } else {
            Err(RlError::Checkpoint(format!(
                "written by {}, loading into {algorithm}",
                self.algorithm
            )))
        }
    }

    /// Loads snapshot `name` into `net`.
    ///
    /// # Errors
    ///
    /// Returns [`RlError::Checkpoint`] if the snapshot is missing or does not
    /// fit `net`.
    pub fn restore(&self, name: &str, net: &mut Mlp) -> Result<(), RlError> {
        let snapshot = self
            .networks
            .get(name)
            .ok_or_else(|| RlError::Checkpoint(format!("missing network `{name}`")))?;
        net.load(snapshot).map_err(|e| RlError::Checkpoint(format!("{name}: {e:#}")))
    }

    /// # Errors
    ///
    /// Returns [`RlError::Checkpoint`] if the scalar is missing.
    pub fn scalar(&self, name: &str) -> Result<f32, RlError> {
        self.scalars
            .get(name)
            .copied()
            .ok_or_else(|| RlError::Checkpoint(format!("missing scalar `{name}`")))
    }
}

/// A learning algorithm driven by the training loop.
///
/// The loop calls [`begin_episode`], then alternates [`act`] and
/// [`observe`] for every step, then [`end_episode`]. Update cadence
/// (per step, per episode, or never while data is short) is the agent's
/// own business.
///
/// [`begin_episode`]: Agent::begin_episode
/// [`act`]: Agent::act
/// [`observe`]: Agent::observe
/// [`end_episode`]: Agent::end_episode
pub trait Agent {
    fn name(&self) -> &'static str;

    /// Chooses an action for `obs`; always inside the action space.
    fn act(&mut self, obs: &[f32], mode: ActMode) -> Action;

    fn begin_episode(&mut self, _episode: usize) {}

    /// Records a transition and trains if the update rule calls for it.
    ///
    /// # Errors
    ///
    /// Fails if a gradient step fails.
    fn observe(&mut self, transition: Transition) -> anyhow::Result<UpdateOutcome>;

    /// # Errors
    ///
    /// Fails if a gradient step fails.
    fn end_episode(&mut self, _episode: usize) -> anyhow::Result<UpdateOutcome> {
        Ok(UpdateOutcome::Skipped)
    }

    fn export(&self) -> Checkpoint;

    /// # Errors
    ///
    /// Returns [`RlError::Checkpoint`] if the checkpoint does not fit.
    fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), RlError>;
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn act(&mut self, obs: &[f32], mode: ActMode) -> Action {
        (**self).act(obs, mode)
    }

    fn begin_episode(&mut self, episode: usize) {
        (**self).begin_episode(episode);
    }

    fn observe(&mut self, transition: Transition) -> anyhow::Result<UpdateOutcome> {
        (**self).observe(transition)
    }

    fn end_episode(&mut self, episode: usize) -> anyhow::Result<UpdateOutcome> {
        (**self).end_episode(episode)
    }

    fn export(&self) -> Checkpoint {
        (**self).export()
    }

    fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), RlError> {
        (**self).load(checkpoint)
    }
}

/// Builds the agent `config.algorithm` names for observations of `obs_dim`.
///
/// # Errors
///
/// Returns [`RlError::Config`] if the configuration is invalid.
pub fn build_agent(config: &ExperimentConfig, obs_dim: usize) -> Result<Box<dyn Agent>, RlError> {
    config.validate()?;
    let seed = config.train.seed;
    let agent: Box<dyn Agent> = match (config.algorithm, config.env.action_space) {
        (Algorithm::Ddpg, ActionSpace::Continuous { max_force }) => {
            Box::new(DdpgAgent::new(&config.ddpg, obs_dim, max_force, seed))
        }
        (Algorithm::Sac, ActionSpace::Continuous { max_force }) => {
            Box::new(SacAgent::new(&config.sac, obs_dim, max_force, seed))
        }
        (Algorithm::Ppo, ActionSpace::Continuous { max_force }) => {
            Box::new(PpoAgent::new(&config.ppo, obs_dim, max_force, seed))
        }
        (Algorithm::Dqn, ActionSpace::Discrete { n, .. }) => {
            Box::new(DqnAgent::new(&config.dqn, obs_dim, n, seed))
        }
        (algorithm, space) => {
            return Err(RlError::Config(format!("{algorithm} cannot act in {space:?}")));
        }
    };
    Ok(agent)
}

/// Layer widths `[input, hidden.., output]`.
pub(crate) fn widths(input: usize, hidden: &[usize], output: usize) -> Vec<usize> {
    let mut sizes = Vec::with_capacity(hidden.len() + 2);
    sizes.push(input);
    sizes.extend_from_slice(hidden);
    sizes.push(output);
    sizes
}

/// One Adam step on `net` from the gradients on `tape`.
pub(crate) fn descend(net: &mut Mlp, opt: &mut Adam, tape: &Tape, bound: &Bound) {
    let grads = net.gradients(tape, bound);
    opt.step_mlp(net, &grads);
}

/// Forward pass of `net` with its parameters bound as constants.
pub(crate) fn frozen_forward(net: &Mlp, tape: &mut Tape, x: Var) -> Var {
    let bound = net.bind(tape, false);
    net.forward(tape, &bound, x)
}

/// States joined column-wise with actions, the input of a Q critic.
pub(crate) fn state_action(tape: &mut Tape, states: &Tensor, actions: Var) -> Var {
    let s = tape.constant(states.clone());
    tape.concat(s, actions)
}
