//! Greedy rollouts from fixed starting angles, for inspection and plots.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, FRAC_PI_6};

use physics::{Action, State};
use serde::Serialize;

use crate::agent::{ActMode, Agent};
use crate::env::Env;
use crate::error::RlError;

/// Starting angles used to compare trained policies.
pub const EVAL_ANGLES: [f32; 3] = [FRAC_PI_6, FRAC_PI_3, FRAC_PI_2];

/// What happened at every step of one evaluation episode.
///
/// `states[i]` is the state after `actions[i]` earned `rewards[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EpisodeTrace {
    pub rewards: Vec<f32>,
    pub actions: Vec<Action>,
    pub states: Vec<State>,
}

impl EpisodeTrace {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }
}

/// Runs the agent greedily from pole angle `angle` until the episode ends
/// or `max_steps` steps have passed. The agent is not trained.
///
/// # Errors
///
/// Fails if the agent produces an invalid action.
pub fn evaluate<E, A>(
    agent: &mut A,
    env: &mut E,
    angle: f32,
    max_steps: usize,
) -> Result<EpisodeTrace, RlError>
where
    E: Env + ?Sized,
    A: Agent + ?Sized,
{
    let mut trace = EpisodeTrace::default();
    let mut obs = env.reset(Some(angle));
    for _ in 0..max_steps {
        let action = agent.act(&obs, ActMode::Greedy);
        let step = env.step(action)?;
        trace.rewards.push(step.reward);
        trace.actions.push(action);
        trace.states.push(step.info.state);
        if step.done {
            break;
        }
        obs = step.obs;
    }
    Ok(trace)
}
