//! CartPole environment for reinforcement learning
//!
//! This module wraps a [`DynamicsModel`] in an episode state machine: it owns
//! the mutable [`State`], validates actions, decides termination and computes
//! the reward signal.

use std::f32::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::dynamics::{DynamicsModel, State};
use crate::error::EnvError;

/// An action as submitted by an agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Horizontal force in newtons
    Continuous(f32),
    /// Index into a discrete force table
    Discrete(usize),
}

/// How discrete action indices translate to forces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForceMap {
    /// Index 0 pushes with `-magnitude`, every other index with `+magnitude`.
    Bang { magnitude: f32 },
    /// The index itself is the force.
    Index,
}

impl ForceMap {
    #[must_use]
    pub fn force(&self, index: usize) -> f32 {
        match *self {
            ForceMap::Bang { magnitude } => {
                if index == 0 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            ForceMap::Index => index as f32,
        }
    }
}

/// The actions an environment accepts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpace {
    Continuous { max_force: f32 },
    Discrete { n: usize, force_map: ForceMap },
}

impl ActionSpace {
    /// Validates `action` and converts it to a force.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError`] when the action lies outside the space.
    pub fn force(&self, action: Action) -> Result<f32, EnvError> {
        match (*self, action) {
            (ActionSpace::Continuous { max_force }, Action::Continuous(f)) => {
                if f.is_finite() && f.abs() <= max_force {
                    Ok(f)
                } else {
                    Err(EnvError::InvalidAction { action: f, bound: max_force })
                }
            }
            (ActionSpace::Discrete { n, force_map }, Action::Discrete(index)) => {
                if index < n {
                    Ok(force_map.force(index))
                } else {
                    Err(EnvError::InvalidDiscreteAction { index, n })
                }
            }
            (ActionSpace::Continuous { .. }, Action::Discrete(_)) => {
                Err(EnvError::ActionKindMismatch { expected: "continuous" })
            }
            (ActionSpace::Discrete { .. }, Action::Continuous(_)) => {
                Err(EnvError::ActionKindMismatch { expected: "discrete" })
            }
        }
    }

    /// Dimension of a continuous action, or the number of discrete choices.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            ActionSpace::Continuous { .. } => 1,
            ActionSpace::Discrete { n, .. } => *n,
        }
    }
}

/// Initial pole angle drawn at every reset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialAngle {
    Fixed { angle: f32 },
    /// Uniform in `[-bound, bound]`
    Uniform { bound: f32 },
}

/// What [`CartPoleEnv`] reports to the agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    /// `[x, x_dot, theta, theta_dot]`
    #[default]
    Raw,
    /// `[cos theta, sin theta, theta_dot]`
    Trig,
}

impl ObservationMode {
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            ObservationMode::Raw => 4,
            ObservationMode::Trig => 3,
        }
    }
}

/// Quadratic penalty weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub theta_weight: f32,
    pub theta_dot_weight: f32,
    pub x_weight: f32,
    /// Extra penalty charged on the step the pole falls or the cart leaves
    /// the track
    pub failure_penalty: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self { theta_weight: 1.0, theta_dot_weight: 1.0, x_weight: 0.0, failure_penalty: 0.0 }
    }
}

impl RewardConfig {
    #[must_use]
    pub fn reward(&self, state: &State, failed: bool) -> f32 {
        let penalty = self.theta_weight * state.theta * state.theta
            + self.theta_dot_weight * state.theta_dot * state.theta_dot
            + self.x_weight * state.x * state.x;
        if failed {
            -penalty - self.failure_penalty
        } else {
            -penalty
        }
    }
}

/// Configuration for a [`CartPoleEnv`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub dynamics: DynamicsModel,
    pub action_space: ActionSpace,
    pub initial_angle: InitialAngle,
    pub observation: ObservationMode,
    pub reward: RewardConfig,
    /// Position threshold for failure detection (meters)
    pub position_limit: f32,
    /// Angle threshold for failure detection (radians)
    pub failure_angle: f32,
    /// Episode horizon in seconds; `None` never truncates
    pub horizon: Option<f32>,
    pub seed: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::continuous()
    }
}

impl EnvConfig {
    /// Bounded continuous force, starting within ±15° of upright.
    #[must_use]
    pub fn continuous() -> Self {
        Self {
            dynamics: DynamicsModel::default(),
            action_space: ActionSpace::Continuous { max_force: 10.0 },
            initial_angle: InitialAngle::Uniform { bound: PI / 12.0 },
            observation: ObservationMode::Raw,
            reward: RewardConfig::default(),
            position_limit: 2.4,
            failure_angle: FRAC_PI_2,
            horizon: Some(10.0),
            seed: 0,
        }
    }

    /// Two-action bang-bang control with a heavier angle penalty.
    #[must_use]
    pub fn discrete() -> Self {
        Self {
            action_space: ActionSpace::Discrete {
                n: 2,
                force_map: ForceMap::Bang { magnitude: 10.0 },
            },
            reward: RewardConfig { theta_weight: 100.0, ..RewardConfig::default() },
            ..Self::continuous()
        }
    }

    /// Starts anywhere up to horizontal and observes the angle through its
    /// sine and cosine.
    #[must_use]
    pub fn swing_up() -> Self {
        Self {
            initial_angle: InitialAngle::Uniform { bound: FRAC_PI_2 },
            observation: ObservationMode::Trig,
            ..Self::continuous()
        }
    }
}

/// Why an episode ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    OutOfBounds,
    PoleFell,
    TimeLimit,
    /// A state component became NaN or infinite.
    Diverged,
}

impl Termination {
    /// `true` unless the episode was merely truncated by the horizon.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Termination::TimeLimit)
    }
}

/// Side information returned with every step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    pub time: f32,
    pub force: f32,
    pub state: State,
    pub termination: Option<Termination>,
}

/// `(observation, reward, done, info)` for one step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub obs: Vec<f32>,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Fraction of a timestep by which elapsed time may fall short of the
/// horizon and still count as reaching it.
const HORIZON_TOLERANCE: f32 = 1e-3;

/// A single cart-pole episode state machine.
pub struct CartPoleEnv {
    /// Configuration for this cartpole
    pub config: EnvConfig,
    state: State,
    /// Steps since the last reset; elapsed time is derived from it so that
    /// rounding does not accumulate.
    steps: usize,
    rng: fastrand::Rng,
}

impl CartPoleEnv {
    #[must_use]
    pub fn new(config: EnvConfig) -> Self {
        let rng = fastrand::Rng::with_seed(config.seed);
        Self { config, state: State::default(), steps: 0, rng }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Elapsed simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.steps as f32 * self.config.dynamics.dt
    }

    /// Steps taken since the last reset.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    #[must_use]
    pub fn obs_size(&self) -> usize {
        self.config.observation.size()
    }

    #[must_use]
    pub fn action_space(&self) -> ActionSpace {
        self.config.action_space
    }

    /// Puts the cart at rest at the origin.
    ///
    /// The pole starts at `angle` when given, otherwise at an angle drawn
    /// from [`EnvConfig::initial_angle`].
    pub fn reset(&mut self, angle: Option<f32>) -> Vec<f32> {
        let theta = angle.unwrap_or_else(|| match self.config.initial_angle {
            InitialAngle::Fixed { angle } => angle,
            InitialAngle::Uniform { bound } => (self.rng.f32() * 2.0 - 1.0) * bound,
        });
        self.state = State::at_angle(theta);
        self.steps = 0;
        self.observe()
    }

    /// Applies `action` for one timestep.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError`] if the action is outside the action space; the
    /// state is left untouched in that case.
    pub fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        let force = self.config.action_space.force(action)?;
        self.steps += 1;
        self.state = self.config.dynamics.integrate(&self.state, force);

        let termination = self.check_termination();
        let failed = matches!(
            termination,
            Some(Termination::OutOfBounds | Termination::PoleFell)
        );
        let reward = if termination == Some(Termination::Diverged) {
            -self.config.reward.failure_penalty
        } else {
            self.config.reward.reward(&self.state, failed)
        };

        Ok(StepResult {
            obs: self.observe(),
            reward,
            done: termination.is_some(),
            info: StepInfo { time: self.time(), force, state: self.state, termination },
        })
    }

    fn check_termination(&self) -> Option<Termination> {
        if !self.state.is_finite() {
            return Some(Termination::Diverged);
        }
        if self.state.x.abs() > self.config.position_limit {
            return Some(Termination::OutOfBounds);
        }
        if self.state.theta.abs() > self.config.failure_angle {
            return Some(Termination::PoleFell);
        }
        match self.config.horizon {
            Some(horizon)
                if self.time() >= horizon - HORIZON_TOLERANCE * self.config.dynamics.dt =>
            {
                Some(Termination::TimeLimit)
            }
            _ => None,
        }
    }

    fn observe(&self) -> Vec<f32> {
        match self.config.observation {
            ObservationMode::Raw => self.state.to_array().to_vec(),
            ObservationMode::Trig => {
                let (sin_theta, cos_theta) = self.state.theta.sin_cos();
                vec![cos_theta, sin_theta, self.state.theta_dot]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bang_map_is_not_symmetric_in_index() {
        let map = ForceMap::Bang { magnitude: 10.0 };
        assert_eq!(map.force(0), -10.0);
        assert_eq!(map.force(1), 10.0);
        assert_eq!(map.force(7), 10.0);
        assert_eq!(ForceMap::Index.force(3), 3.0);
    }

    #[test]
    fn rejects_mismatched_action_kind() {
        let space = ActionSpace::Continuous { max_force: 1.0 };
        assert!(matches!(
            space.force(Action::Discrete(0)),
            Err(EnvError::ActionKindMismatch { .. })
        ));
    }

    #[test]
    fn rejected_action_leaves_state_untouched() {
        let mut env = CartPoleEnv::new(EnvConfig::continuous());
        env.reset(Some(0.1));
        let before = env.state();
        assert!(env.step(Action::Continuous(f32::NAN)).is_err());
        assert_eq!(env.state(), before);
        assert_eq!(env.time(), 0.0);
    }

    #[test]
    fn trig_observation_has_three_components() {
        let mut env = CartPoleEnv::new(EnvConfig::swing_up());
        let obs = env.reset(Some(0.0));
        assert_eq!(obs, vec![1.0, 0.0, 0.0]);
    }
}
