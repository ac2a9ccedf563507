use ml::Tensor;
use physics::Action;

/// One recorded environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    /// The action actually applied
    pub action: Action,
    pub reward: f32,
    pub next_state: Vec<f32>,
    /// `true` only for true terminal states; horizon truncation bootstraps.
    pub done: bool,
}

impl Transition {
    /// The action as a row of floats; a discrete index becomes its value.
    #[must_use]
    pub fn action_values(&self) -> [f32; 1] {
        match self.action {
            Action::Continuous(f) => [f],
            Action::Discrete(i) => [i as f32],
        }
    }
}

/// A sampled minibatch laid out field by field.
#[derive(Clone, Debug)]
pub struct Batch {
    /// `[n, obs]`
    pub states: Tensor,
    /// `[n, 1]` applied force, or index for discrete actions
    pub actions: Tensor,
    /// Discrete action indices; empty for continuous actions
    pub indices: Vec<usize>,
    /// `[n, 1]`
    pub rewards: Tensor,
    /// `[n, obs]`
    pub next_states: Tensor,
    /// `[n, 1]`, `1.0` where the transition was terminal
    pub dones: Tensor,
}

impl Batch {
    pub fn from_transitions<'a>(transitions: impl IntoIterator<Item = &'a Transition>) -> Self {
        let transitions: Vec<&Transition> = transitions.into_iter().collect();
        let width = transitions.first().map_or(0, |t| t.state.len());
        let states: Vec<&[f32]> = transitions.iter().map(|t| t.state.as_slice()).collect();
        let next: Vec<&[f32]> = transitions.iter().map(|t| t.next_state.as_slice()).collect();
        let actions: Vec<[f32; 1]> = transitions.iter().map(|t| t.action_values()).collect();
        let indices = transitions
            .iter()
            .filter_map(|t| match t.action {
                Action::Discrete(i) => Some(i),
                Action::Continuous(_) => None,
            })
            .collect();
        Self {
            states: Tensor::stack(&states, width),
            actions: Tensor::stack(&actions, 1),
            indices,
            rewards: Tensor::column(transitions.iter().map(|t| t.reward).collect()),
            next_states: Tensor::stack(&next, width),
            dones: Tensor::column(
                transitions.iter().map(|t| if t.done { 1.0 } else { 0.0 }).collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// `1 - done` per row.
    #[must_use]
    pub fn alive(&self) -> Vec<f32> {
        self.dones.data.iter().map(|d| 1.0 - d).collect()
    }
}
