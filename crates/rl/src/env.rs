use physics::{Action, ActionSpace, CartPoleEnv, EnvError, State, StepResult};

/// Reinforcement learning environment trait.
///
/// Each call to [`step`] advances the simulation by one action and returns
/// the new observation, the reward, whether the episode is over and why.
///
/// [`step`]: Env::step
pub trait Env {
    /// Advance the environment by one action.
    ///
    /// # Errors
    ///
    /// Fails if `action` lies outside [`Env::action_space`].
    fn step(&mut self, action: Action) -> Result<StepResult, EnvError>;

    /// Reset to a starting state and return the initial observation. A
    /// given `angle` overrides the configured initial pole angle.
    fn reset(&mut self, angle: Option<f32>) -> Vec<f32>;

    /// Size of the observation vector.
    fn obs_size(&self) -> usize;

    fn action_space(&self) -> ActionSpace;

    /// The full physical state behind the current observation.
    fn state(&self) -> State;
}

impl Env for CartPoleEnv {
    fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        CartPoleEnv::step(self, action)
    }

    fn reset(&mut self, angle: Option<f32>) -> Vec<f32> {
        CartPoleEnv::reset(self, angle)
    }

    fn obs_size(&self) -> usize {
        CartPoleEnv::obs_size(self)
    }

    fn action_space(&self) -> ActionSpace {
        CartPoleEnv::action_space(self)
    }

    fn state(&self) -> State {
        CartPoleEnv::state(self)
    }
}
