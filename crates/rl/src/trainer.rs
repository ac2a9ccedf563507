//! The episode loop tying an environment to an agent.

use physics::Termination;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{ActMode, Agent, UpdateOutcome};
use crate::env::Env;
use crate::error::RlError;
use crate::transition::Transition;

/// Step ceiling per episode unless configured otherwise.
pub const DEFAULT_MAX_STEPS: usize = 1_000;

/// Per-episode metrics handed to the host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpisodeMetrics {
    pub episode: usize,
    pub total_reward: f32,
    pub steps: usize,
    /// `None` when the step ceiling ended the episode
    pub termination: Option<Termination>,
}

/// Owns an environment and an agent and runs training episodes.
pub struct Trainer<E: Env, A: Agent> {
    env: E,
    agent: A,
    max_steps: usize,
    episode: usize,
}

impl<E: Env, A: Agent> Trainer<E, A> {
    pub fn new(env: E, agent: A) -> Self {
        Self { env, agent, max_steps: DEFAULT_MAX_STEPS, episode: 0 }
    }

    /// Caps every episode at `max_steps`, on top of the environment horizon.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut A {
        &mut self.agent
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Episodes run so far.
    pub fn episodes(&self) -> usize {
        self.episode
    }

    pub fn into_parts(self) -> (E, A) {
        (self.env, self.agent)
    }

    /// Runs one exploring episode, feeding every transition to the agent.
    ///
    /// A step that diverges ends the episode and is not handed to the
    /// agent.
    ///
    /// # Errors
    ///
    /// Fails if the agent produces an invalid action or an update fails.
    pub fn run_episode(&mut self) -> Result<EpisodeMetrics, RlError> {
        let episode = self.episode;
        self.agent.begin_episode(episode);
        let mut obs = self.env.reset(None);
        let mut total_reward = 0.0;
        let mut steps = 0;
        let mut termination = None;

        while steps < self.max_steps {
            let action = self.agent.act(&obs, ActMode::Explore);
            let step = self.env.step(action)?;
            steps += 1;
            termination = step.info.termination;

            if termination == Some(Termination::Diverged) {
                warn!(episode, steps, "state diverged, ending episode");
                break;
            }
            total_reward += step.reward;

            let transition = Transition {
                state: obs,
                action,
                reward: step.reward,
                next_state: step.obs.clone(),
                done: termination.is_some_and(|t| t.is_terminal()),
            };
            if let UpdateOutcome::Trained(losses) = self.agent.observe(transition)? {
                debug!(episode, steps, ?losses, "update");
            }
            obs = step.obs;
            if step.done {
                break;
            }
        }

        if let UpdateOutcome::Trained(losses) = self.agent.end_episode(episode)? {
            debug!(episode, ?losses, "episode update");
        }
        self.episode += 1;

        let metrics = EpisodeMetrics { episode, total_reward, steps, termination };
        info!(
            episode,
            reward = total_reward,
            steps,
            termination = ?termination,
            agent = self.agent.name(),
            "episode finished"
        );
        Ok(metrics)
    }

    /// Runs `episodes` episodes, calling `on_episode` after each.
    ///
    /// # Errors
    ///
    /// Stops at the first failing episode.
    pub fn train(
        &mut self,
        episodes: usize,
        mut on_episode: impl FnMut(&EpisodeMetrics),
    ) -> Result<Vec<EpisodeMetrics>, RlError> {
        let mut history = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            let metrics = self.run_episode()?;
            on_episode(&metrics);
            history.push(metrics);
        }
        Ok(history)
    }
}
