//! Tests for CartPole environment behavior
//!
//! These tests pin down the episode state machine:
//! - Time advances by exactly one timestep per step
//! - Identical action sequences give identical trajectories
//! - Termination, reward shape and action validation

use approx::assert_relative_eq;
use physics::{
    Action, ActionSpace, CartPoleEnv, DynamicsModel, EnvConfig, EnvError, Equations,
    InitialAngle, Termination,
};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_6, PI};

#[test]
fn step_advances_time_by_dt_and_returns_four_values() {
    let mut env = CartPoleEnv::new(EnvConfig::continuous());
    env.reset(Some(0.05));
    assert_eq!(env.time(), 0.0);

    let step = env.step(Action::Continuous(3.0)).unwrap();
    assert_eq!(step.info.time, 0.02);
    assert_eq!(step.obs.len(), 4);

    for _ in 0..10 {
        let before = env.time();
        let step = env.step(Action::Continuous(-1.5)).unwrap();
        assert_relative_eq!(step.info.time - before, 0.02, epsilon = 1e-6);
        assert_eq!(step.obs.len(), 4);
    }
}

#[test]
fn identical_actions_reproduce_identical_trajectories() {
    let actions: Vec<f32> = (0..60).map(|i| ((i as f32) * 0.37).sin() * 8.0).collect();
    let run = |env: &mut CartPoleEnv| {
        env.reset(Some(0.1));
        actions
            .iter()
            .map(|&a| env.step(Action::Continuous(a)).unwrap().obs)
            .collect::<Vec<_>>()
    };

    let mut first = CartPoleEnv::new(EnvConfig::continuous());
    let mut second = CartPoleEnv::new(EnvConfig { seed: 99, ..EnvConfig::continuous() });
    let a = run(&mut first);
    let b = run(&mut second);
    assert_eq!(a, b);
    // And again on the same instance after another reset.
    assert_eq!(run(&mut first), a);
}

#[test]
fn pole_falls_without_control_with_worsening_reward() {
    let config = EnvConfig { horizon: None, ..EnvConfig::continuous() };
    let mut env = CartPoleEnv::new(config);
    env.reset(Some(FRAC_PI_6));

    let mut rewards = Vec::new();
    let mut last = None;
    for _ in 0..500 {
        let step = env.step(Action::Continuous(0.0)).unwrap();
        rewards.push(step.reward);
        if step.done {
            last = Some(step);
            break;
        }
    }

    let last = last.expect("episode should end once the pole falls over");
    assert_eq!(last.info.termination, Some(Termination::PoleFell));
    assert!(last.info.state.theta.abs() > FRAC_PI_2);
    for pair in rewards.windows(2) {
        assert!(pair[1] <= pair[0], "reward increased: {pair:?}");
    }
}

#[test]
fn out_of_range_force_is_rejected_not_clamped() {
    let mut env = CartPoleEnv::new(EnvConfig::continuous());
    env.reset(Some(0.0));
    let err = env.step(Action::Continuous(10.5)).unwrap_err();
    assert_eq!(err, EnvError::InvalidAction { action: 10.5, bound: 10.0 });
    // The bound itself is valid.
    assert!(env.step(Action::Continuous(-10.0)).is_ok());
}

#[test]
fn discrete_index_maps_to_bang_force() {
    let mut env = CartPoleEnv::new(EnvConfig::discrete());
    env.reset(Some(0.0));
    assert_eq!(env.step(Action::Discrete(0)).unwrap().info.force, -10.0);
    assert_eq!(env.step(Action::Discrete(1)).unwrap().info.force, 10.0);
    assert_eq!(
        env.step(Action::Discrete(2)).unwrap_err(),
        EnvError::InvalidDiscreteAction { index: 2, n: 2 }
    );
}

#[test]
fn horizon_truncates_episode() {
    let config = EnvConfig { horizon: Some(0.09), ..EnvConfig::continuous() };
    let mut env = CartPoleEnv::new(config);
    env.reset(Some(0.0));
    let mut steps = 0;
    loop {
        steps += 1;
        let step = env.step(Action::Continuous(0.0)).unwrap();
        if step.done {
            assert_eq!(step.info.termination, Some(Termination::TimeLimit));
            assert!(!Termination::TimeLimit.is_terminal());
            break;
        }
        assert!(steps < 10);
    }
    assert_eq!(steps, 5);
}

fn steps_until_time_limit(dt: f32, horizon: f32) -> (usize, f32) {
    let config = EnvConfig {
        dynamics: DynamicsModel { dt, ..DynamicsModel::default() },
        horizon: Some(horizon),
        position_limit: f32::INFINITY,
        failure_angle: f32::INFINITY,
        ..EnvConfig::continuous()
    };
    let mut env = CartPoleEnv::new(config);
    env.reset(Some(0.0));
    loop {
        let step = env.step(Action::Continuous(0.0)).unwrap();
        if step.done {
            assert_eq!(step.info.termination, Some(Termination::TimeLimit));
            return (env.steps(), step.info.time);
        }
        assert!(env.steps() < 10_000);
    }
}

#[test]
fn time_limit_hits_on_the_exact_step() {
    for (dt, horizon, expected) in [
        (0.2, 10.0, 50),
        (0.02, 1.0, 50),
        (0.2, 3.0, 15),
        (0.2, 4.0, 20),
        (0.2, 7.0, 35),
        (0.02, 10.0, 500),
    ] {
        let (steps, time) = steps_until_time_limit(dt, horizon);
        assert_eq!(steps, expected, "dt {dt} horizon {horizon}");
        assert_relative_eq!(time, horizon, max_relative = 1e-5);
    }
}

#[test]
fn reset_restarts_the_clock() {
    let mut env = CartPoleEnv::new(EnvConfig::continuous());
    env.reset(Some(0.0));
    for _ in 0..7 {
        env.step(Action::Continuous(0.0)).unwrap();
    }
    assert_eq!(env.steps(), 7);
    env.reset(Some(0.0));
    assert_eq!(env.steps(), 0);
    assert_eq!(env.time(), 0.0);
}

#[test]
fn cart_leaving_track_terminates() {
    let config = EnvConfig { position_limit: 0.05, horizon: None, ..EnvConfig::continuous() };
    let mut env = CartPoleEnv::new(config);
    env.reset(Some(0.0));
    let mut termination = None;
    for _ in 0..100 {
        let step = env.step(Action::Continuous(10.0)).unwrap();
        if step.done {
            termination = step.info.termination;
            break;
        }
    }
    assert_eq!(termination, Some(Termination::OutOfBounds));
}

#[test]
fn failure_penalty_is_charged_on_failure_only() {
    let mut config = EnvConfig { horizon: None, ..EnvConfig::continuous() };
    config.reward.failure_penalty = 50.0;
    let mut env = CartPoleEnv::new(config);
    env.reset(Some(1.57));
    let step = env.step(Action::Continuous(0.0)).unwrap();
    assert_eq!(step.info.termination, Some(Termination::PoleFell));
    let s = step.info.state;
    let expected = -(s.theta * s.theta + s.theta_dot * s.theta_dot) - 50.0;
    assert_relative_eq!(step.reward, expected, epsilon = 1e-4);
}

#[test]
fn non_finite_state_is_reported_as_divergence() {
    let dynamics = DynamicsModel { pole_length: 0.0, ..DynamicsModel::default() };
    let mut env = CartPoleEnv::new(EnvConfig { dynamics, ..EnvConfig::continuous() });
    env.reset(Some(FRAC_PI_6));
    let step = env.step(Action::Continuous(0.0)).unwrap();
    assert!(step.done);
    assert_eq!(step.info.termination, Some(Termination::Diverged));
    assert!(step.reward.is_finite());
}

#[test]
fn uniform_reset_stays_within_bound() {
    let config = EnvConfig {
        initial_angle: InitialAngle::Uniform { bound: PI / 12.0 },
        seed: 7,
        ..EnvConfig::continuous()
    };
    let mut env = CartPoleEnv::new(config);
    for _ in 0..200 {
        let obs = env.reset(None);
        assert!(obs[2].abs() <= PI / 12.0);
        assert_eq!([obs[0], obs[1], obs[3]], [0.0, 0.0, 0.0]);
    }

    let mut fixed = CartPoleEnv::new(EnvConfig {
        initial_angle: InitialAngle::Fixed { angle: 0.3 },
        ..EnvConfig::continuous()
    });
    assert_eq!(fixed.reset(None)[2], 0.3);
    assert_eq!(fixed.reset(Some(-0.2))[2], -0.2);
}

#[test]
fn pivot_force_equations_are_selectable() {
    let config = EnvConfig {
        dynamics: DynamicsModel::pivot_force(),
        action_space: ActionSpace::Continuous { max_force: 5.0 },
        horizon: None,
        ..EnvConfig::continuous()
    };
    assert_eq!(config.dynamics.equations, Equations::PivotForce);
    let mut env = CartPoleEnv::new(config);
    env.reset(Some(0.0));
    let step = env.step(Action::Continuous(1.1)).unwrap();
    // ẍ = 1.0 over dt = 0.2
    assert_relative_eq!(step.info.state.x_dot, 0.2, epsilon = 1e-6);
    assert_relative_eq!(step.info.time, 0.2);
}
