//! Wiring between the command line and the training engine.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use physics::CartPoleEnv;
use rl::{build_agent, evaluate, Agent, ExperimentConfig, Trainer, EVAL_ANGLES};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::Args;

/// Steps allowed in one evaluation rollout.
const EVAL_STEPS: usize = 1_000;

#[derive(Serialize)]
struct EvalSummary {
    angle: f32,
    steps: usize,
    total_reward: f32,
}

/// Trains, evaluates and checkpoints according to `args`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read or is invalid,
/// training fails, or the checkpoint cannot be written.
pub fn run(args: Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args)?;
    info!(
        algorithm = %config.algorithm,
        episodes = config.train.episodes,
        seed = config.train.seed,
        "starting"
    );

    let env = CartPoleEnv::new(config.env.clone());
    let agent = build_agent(&config, env.obs_size())?;
    let mut trainer = Trainer::new(env, agent).with_max_steps(config.train.max_steps_per_episode);

    let mut best = f32::NEG_INFINITY;
    let history = trainer.train(config.train.episodes, |m| best = best.max(m.total_reward))?;
    let last = history.last().map_or(0.0, |m| m.total_reward);
    info!(episodes = history.len(), best, last, "training finished");

    let (mut env, mut agent) = trainer.into_parts();
    let angles = args.eval_angles.unwrap_or_else(|| EVAL_ANGLES.to_vec());
    for angle in angles {
        let trace = evaluate(&mut agent, &mut env, angle, EVAL_STEPS)?;
        let summary = EvalSummary { angle, steps: trace.len(), total_reward: trace.total_reward() };
        info!(summary = %serde_json::to_string(&summary)?, "evaluation");
    }

    if let Some(path) = &args.checkpoint {
        write_checkpoint(&agent, path)?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ExperimentConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ExperimentConfig::for_algorithm(args.algorithm.unwrap_or_default()),
    };

    if let Some(algorithm) = args.algorithm {
        if algorithm != config.algorithm {
            // the environment preset follows the algorithm's action space
            let env = ExperimentConfig::for_algorithm(algorithm).env;
            config.algorithm = algorithm;
            config.env.action_space = env.action_space;
            config.env.reward = env.reward;
        }
    }
    if let Some(episodes) = args.episodes {
        config.train.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.train.seed = seed;
        config.env.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn write_checkpoint(agent: &impl Agent, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&agent.export()).context("serialising checkpoint")?;
    fs::write(path, json).with_context(|| format!("writing checkpoint {}", path.display()))?;
    info!(path = %path.display(), "checkpoint written");
    Ok(())
}
