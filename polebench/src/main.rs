//! # polebench
//!
//! Trains one of the cart-pole agents, evaluates it greedily from a few fixed
//! starting angles and optionally writes its parameters to a JSON checkpoint.
//!
//! ```text
//! polebench --algorithm sac --episodes 300 --checkpoint sac.json
//! RUST_LOG=debug polebench --config experiment.json
//! ```

mod app;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rl::Algorithm;

/// Command-line arguments. Flags override values from `--config`.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// ddpg, sac, dqn or ppo
    #[arg(long)]
    pub algorithm: Option<Algorithm>,

    #[arg(long)]
    pub episodes: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON experiment configuration; missing fields take defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write the trained parameters
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Initial pole angles (radians) for the greedy evaluation runs
    #[arg(long, value_delimiter = ',')]
    pub eval_angles: Option<Vec<f32>>,
}

fn main() -> Result<()> {
    app::run(Args::parse())
}
