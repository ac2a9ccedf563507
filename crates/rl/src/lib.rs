//! Reinforcement learning on the cart-pole environment.
//!
//! Four update rules share one [`Agent`] interface and the same building
//! blocks: a uniform [`ReplayBuffer`], [`TargetNetwork`] copies kept in
//! sync by a [`TargetSync`] discipline, and exploration noise. A
//! [`Trainer`] owns an environment and an agent and drives episodes.
//!
//! ```no_run
//! use physics::CartPoleEnv;
//! use rl::{build_agent, Algorithm, ExperimentConfig, Trainer};
//!
//! let config = ExperimentConfig::for_algorithm(Algorithm::Ddpg);
//! let env = CartPoleEnv::new(config.env.clone());
//! let agent = build_agent(&config, env.obs_size())?;
//! let mut trainer = Trainer::new(env, agent);
//! trainer.train(10, |m| println!("{} {}", m.episode, m.total_reward))?;
//! # Ok::<(), rl::RlError>(())
//! ```

pub mod agent;
pub mod buffer;
pub mod config;
pub mod ddpg;
pub mod dqn;
pub mod env;
pub mod error;
pub mod eval;
pub mod exploration;
pub mod ppo;
pub mod sac;
pub mod target;
pub mod trainer;
pub mod transition;

pub use agent::{build_agent, ActMode, Agent, Checkpoint, Losses, UpdateOutcome};
pub use buffer::ReplayBuffer;
pub use config::{
    Algorithm, DdpgConfig, DqnConfig, DynamicsConfig, EnvConfig, ExperimentConfig, PpoConfig,
    RewardConfig, SacConfig, TrainConfig,
};
pub use ddpg::DdpgAgent;
pub use dqn::DqnAgent;
pub use env::Env;
pub use error::RlError;
pub use eval::{evaluate, EpisodeTrace, EVAL_ANGLES};
pub use exploration::{epsilon_annealing, EpsilonGreedy, OrnsteinUhlenbeck};
pub use ppo::PpoAgent;
pub use sac::{soft_q_target, SacAgent};
pub use target::{soft_update, TargetNetwork, TargetSync};
pub use trainer::{EpisodeMetrics, Trainer, DEFAULT_MAX_STEPS};
pub use transition::{Batch, Transition};
