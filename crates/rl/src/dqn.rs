//! Deep Q-learning over a discrete force table.

use ml::{Adam, Mlp, Tape, Tensor};
use physics::Action;
use tracing::debug;

use crate::agent::{descend, widths, ActMode, Agent, Checkpoint, Losses, UpdateOutcome};
use crate::buffer::ReplayBuffer;
use crate::config::DqnConfig;
use crate::error::RlError;
use crate::exploration::{argmax, EpsilonGreedy};
use crate::target::{TargetNetwork, TargetSync};
use crate::transition::{Batch, Transition};

/// DQN agent; the target network is copied every few episodes instead of
/// tracking the live network every step.
pub struct DqnAgent {
    config: DqnConfig,
    q: Mlp,
    target: TargetNetwork,
    opt: Adam,
    buffer: ReplayBuffer,
    exploration: EpsilonGreedy,
    sync: TargetSync,
    target_syncs: usize,
}

impl DqnAgent {
    #[must_use]
    pub fn new(config: &DqnConfig, obs_dim: usize, n_actions: usize, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let q = Mlp::new(&widths(obs_dim, &config.hidden, n_actions), config.activation, &mut rng);
        Self {
            target: TargetNetwork::new(&q),
            opt: Adam::for_mlp(&q, config.lr),
            buffer: ReplayBuffer::new(config.buffer_capacity, rng.u64(..)),
            exploration: EpsilonGreedy::new(
                config.min_epsilon,
                config.epsilon_decay_episodes,
                rng.u64(..),
            ),
            sync: TargetSync::Hard { every_episodes: config.target_sync_episodes },
            target_syncs: 0,
            config: config.clone(),
            q,
        }
    }

    pub fn q_network(&self) -> &Mlp {
        &self.q
    }

    pub fn target_network(&self) -> &Mlp {
        self.target.net()
    }

    /// How many hard target copies have happened.
    pub fn target_syncs(&self) -> usize {
        self.target_syncs
    }

    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon()
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// `y = r + γ · (1 − done) · max_a' Q_target(s', a')`.
    #[must_use]
    pub fn td_targets(&self, batch: &Batch) -> Vec<f32> {
        let q_next = self.target.net().predict(&batch.next_states);
        let (_, n_actions) = q_next.dims();
        let gamma = self.config.gamma;
        batch
            .rewards
            .data
            .iter()
            .zip(batch.alive())
            .zip(q_next.data.chunks(n_actions.max(1)))
            .map(|((r, alive), row)| {
                let best = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                r + gamma * alive * best
            })
            .collect()
    }

    /// Regresses the taken action's value onto the TD targets.
    ///
    /// # Errors
    ///
    /// Fails if the backward pass fails.
    pub fn update(&mut self, batch: &Batch) -> anyhow::Result<Losses> {
        let targets = self.td_targets(batch);
        let mut tape = Tape::new();
        let bound = self.q.bind(&mut tape, true);
        let states = tape.constant(batch.states.clone());
        let q_all = self.q.forward(&mut tape, &bound, states);
        let q_taken = tape.gather(q_all, &batch.indices);
        let y = tape.constant(Tensor::column(targets));
        let loss = tape.mse(q_taken, y);
        tape.backward(loss)?;
        descend(&mut self.q, &mut self.opt, &tape, &bound);
        let loss = tape.value(loss).data[0];
        debug!(loss, "dqn update");
        Ok(Losses::default().with("q", loss))
    }
}

impl Agent for DqnAgent {
    fn name(&self) -> &'static str {
        "dqn"
    }

    fn act(&mut self, obs: &[f32], mode: ActMode) -> Action {
        let values = self.q.predict(&Tensor::row(obs)).data;
        let index = match mode {
            ActMode::Greedy => argmax(&values),
            ActMode::Explore => self.exploration.choose(&values),
        };
        Action::Discrete(index)
    }

    fn begin_episode(&mut self, episode: usize) {
        self.exploration.anneal(episode);
    }

    fn observe(&mut self, transition: Transition) -> anyhow::Result<UpdateOutcome> {
        self.buffer.store(transition);
        match self.buffer.sample(self.config.batch_size) {
            None => Ok(UpdateOutcome::Skipped),
            Some(batch) => Ok(UpdateOutcome::Trained(self.update(&batch)?)),
        }
    }

    fn end_episode(&mut self, episode: usize) -> anyhow::Result<UpdateOutcome> {
        if self.sync.after_episode(episode, &mut self.target, &self.q) {
            self.target_syncs += 1;
            debug!(episode, "dqn target synced");
        }
        Ok(UpdateOutcome::Skipped)
    }

    fn export(&self) -> Checkpoint {
        Checkpoint::new(self.name())
            .with_network("q", &self.q)
            .with_network("q_target", self.target.net())
    }

    fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), RlError> {
        checkpoint.expect_algorithm(self.name())?;
        let mut q = self.q.clone();
        let mut target = self.target.clone();
        checkpoint.restore("q", &mut q)?;
        checkpoint.restore("q_target", target.net_mut())?;
        self.q = q;
        self.target = target;
        Ok(())
    }
}
