//! Hyper-parameters for every agent and the training loop.
//!
//! Every struct deserialises with defaults for missing fields, so a JSON
//! document only needs to name what it changes.

use std::fmt;
use std::str::FromStr;

use ml::Activation;
use physics::ActionSpace;
pub use physics::{DynamicsModel as DynamicsConfig, EnvConfig, RewardConfig};
use serde::{Deserialize, Serialize};

use crate::error::RlError;
use crate::trainer::DEFAULT_MAX_STEPS;

/// The update rule to train with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Ddpg,
    Sac,
    Dqn,
    Ppo,
}

impl Algorithm {
    /// Whether the rule acts on discrete action indices.
    #[must_use]
    pub fn is_discrete(self) -> bool {
        self == Algorithm::Dqn
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Ddpg => "ddpg",
            Algorithm::Sac => "sac",
            Algorithm::Dqn => "dqn",
            Algorithm::Ppo => "ppo",
        };
        f.write_str(name)
    }
}

impl FromStr for Algorithm {
    type Err = RlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ddpg" => Ok(Algorithm::Ddpg),
            "sac" => Ok(Algorithm::Sac),
            "dqn" => Ok(Algorithm::Dqn),
            "ppo" => Ok(Algorithm::Ppo),
            other => Err(RlError::Config(format!("unknown algorithm `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdpgConfig {
    pub hidden: Vec<usize>,
    pub activation: Activation,
    pub actor_lr: f32,
    pub critic_lr: f32,
    pub gamma: f32,
    pub tau: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub ou_theta: f32,
    pub ou_sigma: f32,
    pub ou_dt: f32,
    /// Half-width of the uniform init of the actor's output layer
    pub output_init: f32,
}

impl Default for DdpgConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 64],
            activation: Activation::Relu,
            actor_lr: 1e-4,
            critic_lr: 1e-3,
            gamma: 0.99,
            tau: 0.005,
            batch_size: 64,
            buffer_capacity: 100_000,
            ou_theta: 0.15,
            ou_sigma: 0.2,
            ou_dt: 0.01,
            output_init: 3e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SacConfig {
    pub hidden: Vec<usize>,
    pub activation: Activation,
    pub policy_lr: f32,
    pub q_lr: f32,
    pub alpha_lr: f32,
    pub gamma: f32,
    pub tau: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    /// Transitions stored before the first update
    pub min_buffer: usize,
    pub initial_alpha: f32,
    /// Defaults to minus the action dimension
    pub target_entropy: Option<f32>,
    pub output_init: f32,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 64],
            activation: Activation::Relu,
            policy_lr: 3e-4,
            q_lr: 3e-4,
            alpha_lr: 3e-4,
            gamma: 0.99,
            tau: 0.005,
            batch_size: 64,
            buffer_capacity: 100_000,
            min_buffer: 256,
            initial_alpha: 0.2,
            target_entropy: None,
            output_init: 3e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub hidden: Vec<usize>,
    pub activation: Activation,
    pub lr: f32,
    pub gamma: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    /// Hard target copy every this many episodes
    pub target_sync_episodes: usize,
    pub min_epsilon: f32,
    /// Episodes over which ε decays linearly from 1
    pub epsilon_decay_episodes: usize,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 64],
            activation: Activation::Relu,
            lr: 1e-3,
            gamma: 0.99,
            batch_size: 64,
            buffer_capacity: 50_000,
            target_sync_episodes: 10,
            min_epsilon: 0.01,
            epsilon_decay_episodes: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    pub hidden: Vec<usize>,
    pub activation: Activation,
    pub policy_lr: f32,
    pub value_lr: f32,
    pub gamma: f32,
    pub clip: f32,
    /// Policy epochs stop once the sample KL estimate exceeds this
    pub target_kl_div: f32,
    pub policy_epochs: usize,
    pub value_epochs: usize,
    pub initial_log_std: f32,
    pub output_init: f32,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 64],
            activation: Activation::Tanh,
            policy_lr: 3e-4,
            value_lr: 1e-3,
            gamma: 0.99,
            clip: 0.2,
            target_kl_div: 0.02,
            policy_epochs: 40,
            value_epochs: 40,
            initial_log_std: -0.5,
            output_init: 3e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub episodes: usize,
    /// Step ceiling per episode, on top of the environment horizon
    pub max_steps_per_episode: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self { episodes: 200, max_steps_per_episode: DEFAULT_MAX_STEPS, seed: 0 }
    }
}

/// Everything needed to run one training experiment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub algorithm: Algorithm,
    pub env: EnvConfig,
    pub train: TrainConfig,
    pub ddpg: DdpgConfig,
    pub sac: SacConfig,
    pub dqn: DqnConfig,
    pub ppo: PpoConfig,
}

impl ExperimentConfig {
    /// Defaults for `algorithm`, on the environment preset it expects.
    #[must_use]
    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        let env =
            if algorithm.is_discrete() { EnvConfig::discrete() } else { EnvConfig::continuous() };
        Self { algorithm, env, ..Self::default() }
    }

    /// Parses a JSON document; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RlError::Config`] for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self, RlError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`RlError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), RlError> {
        let fail = |msg: String| Err(RlError::Config(msg));

        if self.env.dynamics.dt <= 0.0 || !self.env.dynamics.dt.is_finite() {
            return fail(format!("env.dynamics.dt must be positive, got {}", self.env.dynamics.dt));
        }
        match (self.algorithm.is_discrete(), self.env.action_space) {
            (true, ActionSpace::Continuous { .. }) => {
                return fail(format!("{} needs a discrete action space", self.algorithm));
            }
            (false, ActionSpace::Discrete { .. }) => {
                return fail(format!("{} needs a continuous action space", self.algorithm));
            }
            (_, ActionSpace::Continuous { max_force }) if max_force <= 0.0 => {
                return fail(format!("max_force must be positive, got {max_force}"));
            }
            (_, ActionSpace::Discrete { n, .. }) if n == 0 => {
                return fail("discrete action space needs at least one action".into());
            }
            _ => {}
        }

        check_replay("ddpg", self.ddpg.batch_size, self.ddpg.buffer_capacity)?;
        check_replay("sac", self.sac.batch_size, self.sac.buffer_capacity)?;
        check_replay("dqn", self.dqn.batch_size, self.dqn.buffer_capacity)?;
        check_unit("ddpg.gamma", self.ddpg.gamma)?;
        check_unit("ddpg.tau", self.ddpg.tau)?;
        check_unit("sac.gamma", self.sac.gamma)?;
        check_unit("sac.tau", self.sac.tau)?;
        check_unit("dqn.gamma", self.dqn.gamma)?;
        check_unit("ppo.gamma", self.ppo.gamma)?;
        if self.sac.initial_alpha <= 0.0 {
            return fail(format!(
                "sac.initial_alpha must be positive, got {}",
                self.sac.initial_alpha
            ));
        }
        Ok(())
    }
}

fn check_replay(name: &str, batch_size: usize, capacity: usize) -> Result<(), RlError> {
    if batch_size == 0 {
        return Err(RlError::Config(format!("{name}.batch_size must be positive")));
    }
    if capacity < batch_size {
        return Err(RlError::Config(format!(
            "{name}.buffer_capacity {capacity} is smaller than batch_size {batch_size}"
        )));
    }
    Ok(())
}

fn check_unit(name: &str, value: f32) -> Result<(), RlError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RlError::Config(format!("{name} must lie in [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ExperimentConfig::from_json(
            r#"{ "algorithm": "sac", "sac": { "batch_size": 32 }, "train": { "seed": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::Sac);
        assert_eq!(config.sac.batch_size, 32);
        assert_eq!(config.sac.tau, SacConfig::default().tau);
        assert_eq!(config.train.seed, 4);
        assert_eq!(config.env, EnvConfig::continuous());
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = ExperimentConfig::default();
        config.ddpg.tau = 1.5;
        assert!(matches!(config.validate(), Err(RlError::Config(_))));

        let mut config = ExperimentConfig::default();
        config.dqn.buffer_capacity = 8;
        config.dqn.batch_size = 16;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.env.dynamics.dt = 0.0;
        assert!(config.validate().is_err());

        let config = ExperimentConfig { algorithm: Algorithm::Dqn, ..ExperimentConfig::default() };
        assert!(config.validate().is_err());
        assert!(ExperimentConfig::for_algorithm(Algorithm::Dqn).validate().is_ok());
    }

    #[test]
    fn algorithm_names_round_trip() {
        for alg in [Algorithm::Ddpg, Algorithm::Sac, Algorithm::Dqn, Algorithm::Ppo] {
            assert_eq!(alg.to_string().parse::<Algorithm>().unwrap(), alg);
        }
        assert!("a2c".parse::<Algorithm>().is_err());
    }
}
