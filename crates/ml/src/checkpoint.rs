use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::nn::{Activation, Mlp};
use crate::Tensor;

/// Opaque copy of a network's parameters, in [`Mlp::params`] order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub activation: Activation,
    pub params: Vec<Tensor>,
}

impl Mlp {
    /// Copies every parameter into a snapshot.
    #[must_use]
    pub fn export(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            activation: self.activation,
            params: self.params().into_iter().cloned().collect(),
        }
    }

    /// Overwrites the parameters with those in `snapshot`.
    ///
    /// # Errors
    ///
    /// Fails without modifying the network if the snapshot was taken from a
    /// network with a different activation, parameter count or shape.
    pub fn load(&mut self, snapshot: &NetworkSnapshot) -> Result<()> {
        ensure!(
            snapshot.activation == self.activation,
            "activation mismatch: network uses {:?}, snapshot {:?}",
            self.activation,
            snapshot.activation
        );
        let params = self.params_mut();
        ensure!(
            params.len() == snapshot.params.len(),
            "expected {} parameter tensors, snapshot has {}",
            params.len(),
            snapshot.params.len()
        );
        for (i, (p, s)) in params.iter().zip(&snapshot.params).enumerate() {
            ensure!(
                p.shape == s.shape && s.data.len() == p.data.len(),
                "parameter {i}: expected shape {:?}, snapshot has {:?}",
                p.shape,
                s.shape
            );
        }
        for (p, s) in params.into_iter().zip(&snapshot.params) {
            p.data.copy_from_slice(&s.data);
        }
        Ok(())
    }
}
