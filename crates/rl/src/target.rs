//! Slowly tracking copies of live networks.

use ml::Mlp;
use serde::{Deserialize, Serialize};

/// Blends every parameter `target ← tau · live + (1 − tau) · target`.
///
/// # Panics
///
/// Panics if the two networks have different architectures.
pub fn soft_update(target: &mut Mlp, live: &Mlp, tau: f32) {
    let live = live.params();
    let target = target.params_mut();
    assert_eq!(live.len(), target.len(), "target and live networks differ");
    for (t, l) in target.into_iter().zip(live) {
        assert_eq!(t.shape, l.shape, "target and live networks differ");
        for (tv, lv) in t.data.iter_mut().zip(&l.data) {
            *tv = tau * lv + (1.0 - tau) * *tv;
        }
    }
}

/// A shadow copy of a live network, never trained directly.
#[derive(Clone, Debug)]
pub struct TargetNetwork {
    net: Mlp,
}

impl TargetNetwork {
    /// Starts as an exact copy of `live`.
    #[must_use]
    pub fn new(live: &Mlp) -> Self {
        Self { net: live.clone() }
    }

    #[must_use]
    pub fn net(&self) -> &Mlp {
        &self.net
    }

    /// `tau = 1` copies `live`, `tau = 0` leaves the target unchanged.
    pub fn sync(&mut self, live: &Mlp, tau: f32) {
        soft_update(&mut self.net, live, tau);
    }

    pub(crate) fn net_mut(&mut self) -> &mut Mlp {
        &mut self.net
    }
}

/// When targets follow their live networks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSync {
    /// Blend with rate `tau` after every training step.
    Soft { tau: f32 },
    /// Copy outright at the end of every `every_episodes`-th episode.
    Hard { every_episodes: usize },
}

impl TargetSync {
    /// Called after each gradient step.
    pub fn after_step(&self, target: &mut TargetNetwork, live: &Mlp) {
        if let TargetSync::Soft { tau } = *self {
            target.sync(live, tau);
        }
    }

    /// Called when episode `episode` (zero-based) ends; returns whether the
    /// target was copied.
    pub fn after_episode(&self, episode: usize, target: &mut TargetNetwork, live: &Mlp) -> bool {
        match *self {
            TargetSync::Hard { every_episodes } if every_episodes > 0 => {
                let due = (episode + 1) % every_episodes == 0;
                if due {
                    target.sync(live, 1.0);
                }
                due
            }
            _ => false,
        }
    }
}
