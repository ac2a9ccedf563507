//! # Cart-Pole Equations of Motion
//!
//! Stateless physics for a pole hinged on a cart that slides along a
//! frictionless track. [`DynamicsModel::derivative`] evaluates the
//! accelerations for a given state and horizontal force, and
//! [`DynamicsModel::integrate`] advances the state by one fixed timestep.
//!
//! Two parameterizations of the same family are available through
//! [`Equations`]:
//!
//! ```text
//! Coupled (Barto et al., l = half pole length):
//!   temp      = (F + m l θ̇² sinθ) / (M + m)
//!   θ̈         = (g sinθ - cosθ temp) / (l (4/3 - m cos²θ / (M + m)))
//!   ẍ         = temp - m l θ̈ cosθ / (M + m)
//!
//! PivotForce (l = pole length):
//!   ẍ         = F / (M + m)
//!   θ̈         = (g sinθ - ẍ cosθ) / l
//! ```
//!
//! Integration is semi-implicit Euler: velocities are updated from the
//! accelerations first, positions then move with the new velocities.

use serde::{Deserialize, Serialize};

/// Cart-pole state `(x, x_dot, theta, theta_dot)`.
///
/// `theta` is measured in radians from the upright position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub x: f32,
    pub x_dot: f32,
    pub theta: f32,
    pub theta_dot: f32,
}

impl State {
    #[must_use]
    pub fn new(x: f32, x_dot: f32, theta: f32, theta_dot: f32) -> Self {
        Self { x, x_dot, theta, theta_dot }
    }

    /// Upright and at rest, with the pole tilted by `theta`.
    #[must_use]
    pub fn at_angle(theta: f32) -> Self {
        Self { theta, ..Self::default() }
    }

    #[must_use]
    pub fn to_array(&self) -> [f32; 4] {
        [self.x, self.x_dot, self.theta, self.theta_dot]
    }

    /// `false` once any component has become NaN or infinite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Accelerations returned by [`DynamicsModel::derivative`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Derivative {
    pub x_ddot: f32,
    pub theta_ddot: f32,
}

/// Which form of the equations of motion to evaluate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equations {
    /// Full coupling between cart and pole, with mixed sin·cos terms.
    #[default]
    Coupled,
    /// The cart accelerates with the applied force alone; that acceleration
    /// enters the pole as a torque opposing gravity.
    PivotForce,
}

/// Physical constants and timestep for a cart-pole system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsModel {
    pub equations: Equations,
    /// Cart mass in kg
    pub cart_mass: f32,
    /// Pole mass in kg
    pub pole_mass: f32,
    /// Half length for [`Equations::Coupled`], full length for
    /// [`Equations::PivotForce`], in meters
    pub pole_length: f32,
    pub gravity: f32,
    /// Fixed integration step in seconds
    pub dt: f32,
}

impl Default for DynamicsModel {
    fn default() -> Self {
        Self {
            equations: Equations::Coupled,
            cart_mass: 1.0,
            pole_mass: 0.1,
            pole_length: 0.5,
            gravity: 9.8,
            dt: 0.02,
        }
    }
}

impl DynamicsModel {
    /// The pivot-force parameterization with a coarse 0.2 s step.
    #[must_use]
    pub fn pivot_force() -> Self {
        Self {
            equations: Equations::PivotForce,
            pole_length: 1.0,
            dt: 0.2,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn total_mass(&self) -> f32 {
        self.cart_mass + self.pole_mass
    }

    /// Accelerations of the cart and the pole under horizontal `force`.
    #[must_use]
    pub fn derivative(&self, state: &State, force: f32) -> Derivative {
        let (sin_theta, cos_theta) = state.theta.sin_cos();
        let total_mass = self.total_mass();
        match self.equations {
            Equations::Coupled => {
                let pole_mass_length = self.pole_mass * self.pole_length;
                let temp = (force
                    + pole_mass_length * state.theta_dot * state.theta_dot * sin_theta)
                    / total_mass;
                let theta_ddot = (self.gravity * sin_theta - cos_theta * temp)
                    / (self.pole_length
                        * (4.0 / 3.0 - self.pole_mass * cos_theta * cos_theta / total_mass));
                let x_ddot = temp - pole_mass_length * theta_ddot * cos_theta / total_mass;
                Derivative { x_ddot, theta_ddot }
            }
            Equations::PivotForce => {
                let x_ddot = force / total_mass;
                let theta_ddot =
                    (self.gravity * sin_theta - x_ddot * cos_theta) / self.pole_length;
                Derivative { x_ddot, theta_ddot }
            }
        }
    }

    /// Advances `state` by one `dt` with semi-implicit Euler.
    #[must_use]
    pub fn integrate(&self, state: &State, force: f32) -> State {
        let d = self.derivative(state, force);
        let x_dot = state.x_dot + d.x_ddot * self.dt;
        let theta_dot = state.theta_dot + d.theta_ddot * self.dt;
        State {
            x: state.x + x_dot * self.dt,
            x_dot,
            theta: state.theta + theta_dot * self.dt,
            theta_dot,
        }
    }
}
