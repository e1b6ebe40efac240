//! `specq validate`: load, validate, and display the effective configuration

use anyhow::{Context, Result};

use specq_core::DataSource;

use crate::config;

pub fn execute() -> Result<()> {
    let run_config = config::load()?;
    run_config.validate().context("configuration invalid")?;

    println!("Configuration OK");
    println!(
        "  channels:        {} (threshold {} dB)",
        run_config.num_channels, run_config.power_threshold_db
    );
    println!(
        "  learning:        alpha {} gamma {} epsilon {} -> {} (decay {})",
        run_config.learning_rate,
        run_config.discount_factor,
        run_config.initial_epsilon,
        run_config.min_epsilon,
        run_config.epsilon_decay
    );
    println!(
        "  rewards:         success {} collision {} defer {}",
        run_config.success_reward, run_config.collision_penalty, run_config.defer_reward
    );
    println!(
        "  schedule:        {} episodes x {} steps{}",
        run_config.episode_count,
        run_config.steps_per_episode,
        run_config
            .time_budget_seconds
            .map_or_else(String::new, |s| format!(", {s}s time budget"))
    );
    match run_config.data_source {
        DataSource::Simulated => println!("  source:          simulated"),
        DataSource::TraceFile => println!(
            "  source:          trace {}",
            run_config
                .trace_path
                .as_deref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string())
        ),
    }
    if let Some(path) = &run_config.checkpoint_path {
        println!("  checkpoint:      {}", path.display());
    }
    if run_config.realtime {
        println!("  realtime:        queue depth {}", run_config.queue_depth);
    }
    Ok(())
}
