//! Slow end-to-end learning checks. Run with `cargo test -- --ignored`.

use physics::CartPoleEnv;
use rl::{build_agent, evaluate, Algorithm, ExperimentConfig, Trainer, EVAL_ANGLES};

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

fn train_and_compare(algorithm: Algorithm, episodes: usize) {
    let mut config = ExperimentConfig::for_algorithm(algorithm);
    config.train.seed = 3;
    let env = CartPoleEnv::new(config.env.clone());
    let agent = build_agent(&config, env.obs_size()).unwrap();
    let mut trainer = Trainer::new(env, agent).with_max_steps(config.train.max_steps_per_episode);

    let history = trainer.train(episodes, |_| {}).unwrap();
    let steps: Vec<f32> = history.iter().map(|m| m.steps as f32).collect();
    let early = mean(&steps[..10]);
    let late = mean(&steps[steps.len() - 10..]);
    eprintln!("{algorithm}: early {early} late {late}");
    assert!(late > early, "{algorithm} should balance longer after training");

    let (mut env, mut agent) = trainer.into_parts();
    let trace = evaluate(&mut agent, &mut env, EVAL_ANGLES[0], 500).unwrap();
    assert!(trace.len() > 10);
}

#[test]
#[ignore]
fn ddpg_learns_to_balance() {
    train_and_compare(Algorithm::Ddpg, 150);
}

#[test]
#[ignore]
fn dqn_learns_to_balance() {
    train_and_compare(Algorithm::Dqn, 150);
}

#[test]
#[ignore]
fn sac_learns_to_balance() {
    train_and_compare(Algorithm::Sac, 150);
}

#[test]
#[ignore]
fn ppo_learns_to_balance() {
    train_and_compare(Algorithm::Ppo, 300);
}
