#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::must_use_candidate
)]
//! # Cart-Pole Physics
//!
//! The simulation layer of the workspace. It has two parts:
//!
//! -   **Dynamics:** [`DynamicsModel`] in the [`dynamics`] module evaluates
//!     the nonlinear cart-pole equations of motion and integrates them with a
//!     fixed-step semi-implicit Euler rule. The equations are selected by
//!     configuration ([`Equations`]), not baked in.
//! -   **Environment:** [`CartPoleEnv`] in the [`cartpole`] module owns the
//!     episode state, validates actions, and decides reward and termination.
//!
//! ## Usage
//!
//! ```rust
//! use physics::{Action, CartPoleEnv, EnvConfig};
//!
//! let mut env = CartPoleEnv::new(EnvConfig::continuous());
//! let _obs = env.reset(Some(0.1));
//! let step = env.step(Action::Continuous(0.0)).unwrap();
//! assert_eq!(step.obs.len(), 4);
//! ```

pub mod cartpole;
pub mod dynamics;
pub mod error;

pub use cartpole::{
    Action, ActionSpace, CartPoleEnv, EnvConfig, ForceMap, InitialAngle, ObservationMode,
    RewardConfig, StepInfo, StepResult, Termination,
};
pub use dynamics::{Derivative, DynamicsModel, Equations, State};
pub use error::EnvError;
