//! `specq run`: execute a training session and report the comparison

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use specq_core::{DataSource, RngStream, RunContext};
use specq_rl::{
    build_provider, Checkpoint, EpisodeEngine, Policy, PolicySnapshot, QLearningPolicy,
    QueuedProvider, RandomPolicy, RunSummary,
};

use crate::config;

#[derive(Args)]
pub struct RunArgs {
    /// Override the RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of episodes
    #[arg(long)]
    episodes: Option<u64>,

    /// Override steps per episode
    #[arg(long)]
    steps: Option<u64>,

    /// Stop after this many seconds regardless of episode budget
    #[arg(long, value_name = "SECONDS")]
    time_budget: Option<u64>,

    /// Replay spectrum data from a trace file instead of simulating
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Q-table checkpoint to resume from and save to
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Sample through a bounded real-time queue
    #[arg(long)]
    realtime: bool,

    /// Write per-episode metrics as JSON
    #[arg(long, value_name = "FILE")]
    metrics: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut run_config = config::load()?;

    if let Some(seed) = args.seed {
        run_config.seed = Some(seed);
    }
    if let Some(episodes) = args.episodes {
        run_config.episode_count = episodes;
    }
    if let Some(steps) = args.steps {
        run_config.steps_per_episode = steps;
    }
    if let Some(budget) = args.time_budget {
        run_config.time_budget_seconds = Some(budget);
    }
    if let Some(trace) = args.trace {
        run_config.data_source = DataSource::TraceFile;
        run_config.trace_path = Some(trace);
    }
    if let Some(checkpoint) = args.checkpoint {
        run_config.checkpoint_path = Some(checkpoint);
    }
    if args.realtime {
        run_config.realtime = true;
    }

    let ctx = RunContext::new(run_config).context("invalid configuration")?;
    info!(seed = ctx.seed(), "run context ready");

    let q_policy = build_q_policy(&ctx)?;
    let policies: Vec<Box<dyn Policy>> = vec![
        q_policy,
        Box::new(RandomPolicy::new(ctx.rng(RngStream::RandomPolicy))),
    ];

    let mut provider = build_provider(&ctx);
    if ctx.config().realtime {
        info!(depth = ctx.config().queue_depth, "enabling real-time sampling queue");
        provider = Box::new(QueuedProvider::spawn(provider, ctx.config().queue_depth));
    }

    // Ctrl-C requests a graceful stop; the engine finishes its current step
    // and persists the checkpoint before exiting.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current step");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let run_config = ctx.config().clone();
    let mut engine = EpisodeEngine::new(run_config, provider, policies, stop);

    // The engine loop is synchronous and blocking by construction.
    let summary = tokio::task::spawn_blocking(move || engine.run())
        .await
        .context("engine task panicked")??;

    if let Some(path) = args.metrics {
        let json = serde_json::to_string_pretty(&summary.episodes)?;
        std::fs::write(&path, json)
            .with_context(|| format!("cannot write metrics to {}", path.display()))?;
        info!(path = %path.display(), episodes = summary.episodes.len(), "metrics written");
    }

    print_summary(&summary);
    Ok(())
}

/// Fresh learner, or one resumed from the configured checkpoint if a
/// compatible one exists.
fn build_q_policy(ctx: &RunContext) -> Result<Box<dyn Policy>> {
    let config = ctx.config();
    let rng = ctx.rng(RngStream::QPolicy);

    if let Some(path) = config.checkpoint_path.as_deref() {
        if let Some(checkpoint) = Checkpoint::load(path)? {
            let policy = QLearningPolicy::from_checkpoint(config, checkpoint, rng)
                .context("incompatible checkpoint")?;
            info!(path = %path.display(), "resumed Q-learning policy from checkpoint");
            return Ok(Box::new(policy));
        }
    }
    Ok(Box::new(QLearningPolicy::new(config, rng)))
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "Run complete: {} episodes, {} steps",
        summary.episodes_completed, summary.steps
    );
    println!();
    println!(
        "{:<12} {:>8} {:>10} {:>9} {:>11} {:>8} {:>9}",
        "policy", "steps", "reward", "success", "collision", "defer", "epsilon"
    );
    for stats in &summary.final_stats {
        println!(
            "{:<12} {:>8} {:>10.2} {:>8.1}% {:>10.1}% {:>7.1}% {:>9}",
            stats.policy,
            stats.steps,
            stats.total_reward,
            stats.success_rate * 100.0,
            stats.collision_rate * 100.0,
            stats.defer_rate * 100.0,
            stats
                .epsilon
                .map_or_else(|| "-".to_string(), |e| format!("{e:.3}")),
        );
    }
    println!();
    print_histogram(&summary.final_stats);
}

fn print_histogram(stats: &[PolicySnapshot]) {
    for snap in stats {
        let total: u64 = snap.channel_histogram.iter().sum();
        if total == 0 {
            continue;
        }
        println!("{} channel usage:", snap.policy);
        let channels = snap.channel_histogram.len() - 1;
        for (idx, &count) in snap.channel_histogram.iter().enumerate() {
            let label = if idx == channels {
                "defer".to_string()
            } else {
                format!("ch{idx}")
            };
            let share = count as f64 / total as f64;
            let bar = "#".repeat((share * 40.0).round() as usize);
            println!("  {label:<6} {count:>8}  {bar}");
        }
        println!();
    }
}
