//! Run configuration for the learning core
//!
//! The configuration object is produced by an external loader (CLI) and
//! consumed here. Validation is explicit and fatal: a run never starts with
//! an out-of-range value.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, SpecqError};
use crate::types::{Outcome, Reward};

/// Largest supported channel count. The state space is `2^num_channels`, so
/// the tabular representation stops being meaningful well before this.
pub const MAX_CHANNELS: usize = 16;

/// Which spectrum data source feeds the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Stochastic generator (seedable)
    Simulated,
    /// Replay of an externally generated trace file
    TraceFile,
}

/// Full configuration surface consumed by the core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of radio channels (state/action space size)
    pub num_channels: usize,
    /// Busy/idle decision threshold in dB
    pub power_threshold_db: f64,

    /// Q-update learning rate (alpha), in (0, 1]
    pub learning_rate: f64,
    /// Discount factor (gamma), in [0, 1]
    pub discount_factor: f64,
    /// Starting exploration rate
    pub initial_epsilon: f64,
    /// Geometric per-step epsilon decay, in (0, 1]
    pub epsilon_decay: f64,
    /// Exploration floor
    pub min_epsilon: f64,

    /// Reward for transmitting on an idle channel
    pub success_reward: f64,
    /// Reward for transmitting on a busy channel
    pub collision_penalty: f64,
    /// Reward for deferring
    pub defer_reward: f64,

    /// Number of reporting episodes to run
    pub episode_count: u64,
    /// Steps per reporting episode
    pub steps_per_episode: u64,
    /// Optional wall-clock budget; the run stops at whichever budget is
    /// exhausted first
    pub time_budget_seconds: Option<u64>,

    pub data_source: DataSource,
    /// Trace file path (required for `data_source = "trace-file"`)
    pub trace_path: Option<PathBuf>,
    /// Loop the trace at EOF instead of ending the run
    pub trace_loop: bool,

    /// RNG seed; `None` draws one from entropy
    pub seed: Option<u64>,
    /// Where to persist/restore the Q-table checkpoint
    pub checkpoint_path: Option<PathBuf>,

    /// Real-time mode: sample the provider from a background producer into a
    /// bounded queue
    pub realtime: bool,
    /// Bounded queue depth for real-time mode
    pub queue_depth: usize,

    pub simulation: SimulationConfig,
}

/// Parameters of the stochastic spectrum generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Baseline noise floor in dB
    pub noise_floor_db: f64,
    /// Std-dev of Gaussian jitter on idle channels, in dB
    pub idle_jitter_db: f64,
    /// Probability that a channel carries interference this step
    pub interference_probability: f64,
    /// Mean interference magnitude in dB (added to the floor)
    pub interference_mean_db: f64,
    /// Std-dev of the interference magnitude in dB
    pub interference_std_db: f64,
    /// Per-channel interference probability override; empty means use
    /// `interference_probability` for every channel
    pub channel_interference: Vec<f64>,
    /// Simulated sensing interval, drives observation timestamps
    pub sensing_interval_s: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            noise_floor_db: -70.0,
            idle_jitter_db: 2.0,
            interference_probability: 0.3,
            interference_mean_db: 20.0,
            interference_std_db: 5.0,
            channel_interference: Vec::new(),
            sensing_interval_s: 0.1,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_channels: 5,
            power_threshold_db: -60.0,
            learning_rate: 0.1,
            discount_factor: 0.9,
            initial_epsilon: 1.0,
            epsilon_decay: 0.995,
            min_epsilon: 0.01,
            success_reward: 1.0,
            collision_penalty: -1.0,
            defer_reward: 0.0,
            episode_count: 100,
            steps_per_episode: 100,
            time_budget_seconds: None,
            data_source: DataSource::Simulated,
            trace_path: None,
            trace_loop: false,
            seed: None,
            checkpoint_path: None,
            realtime: false,
            queue_depth: 64,
            simulation: SimulationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Check every value range. Errors name the offending option so startup
    /// failures are actionable.
    pub fn validate(&self) -> Result<()> {
        if self.num_channels == 0 || self.num_channels > MAX_CHANNELS {
            return Err(SpecqError::Config(format!(
                "num_channels must be in 1..={MAX_CHANNELS}, got {}",
                self.num_channels
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(SpecqError::Config(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(SpecqError::Config(format!(
                "discount_factor must be in [0, 1], got {}",
                self.discount_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.initial_epsilon) {
            return Err(SpecqError::Config(format!(
                "initial_epsilon must be in [0, 1], got {}",
                self.initial_epsilon
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(SpecqError::Config(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if !(0.0..=1.0).contains(&self.min_epsilon) {
            return Err(SpecqError::Config(format!(
                "min_epsilon must be in [0, 1], got {}",
                self.min_epsilon
            )));
        }
        if self.min_epsilon > self.initial_epsilon {
            return Err(SpecqError::Config(format!(
                "min_epsilon ({}) must not exceed initial_epsilon ({})",
                self.min_epsilon, self.initial_epsilon
            )));
        }
        if self.episode_count == 0 {
            return Err(SpecqError::Config(
                "episode_count must be at least 1".to_string(),
            ));
        }
        if self.steps_per_episode == 0 {
            return Err(SpecqError::Config(
                "steps_per_episode must be at least 1".to_string(),
            ));
        }
        if self.data_source == DataSource::TraceFile && self.trace_path.is_none() {
            return Err(SpecqError::Config(
                "trace_path is required when data_source is trace-file".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(SpecqError::Config(
                "queue_depth must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.simulation.interference_probability) {
            return Err(SpecqError::Config(format!(
                "simulation.interference_probability must be in [0, 1], got {}",
                self.simulation.interference_probability
            )));
        }
        for (ch, &p) in self.simulation.channel_interference.iter().enumerate() {
            if !(0.0..=1.0).contains(&p) {
                return Err(SpecqError::Config(format!(
                    "simulation.channel_interference[{ch}] must be in [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    /// Fixed outcome -> reward mapping for this run.
    pub fn reward_for(&self, outcome: Outcome) -> Reward {
        match outcome {
            Outcome::Success => self.success_reward,
            Outcome::Collision => self.collision_penalty,
            Outcome::Defer => self.defer_reward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_channels_rejected() {
        let cfg = RunConfig {
            num_channels: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("num_channels"));
    }

    #[test]
    fn test_oversized_channel_count_rejected() {
        let cfg = RunConfig {
            num_channels: MAX_CHANNELS + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_learning_rate_out_of_range() {
        for lr in [0.0, -0.5, 1.5] {
            let cfg = RunConfig {
                learning_rate: lr,
                ..Default::default()
            };
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().contains("learning_rate"), "lr={lr}");
        }
    }

    #[test]
    fn test_trace_source_requires_path() {
        let cfg = RunConfig {
            data_source: DataSource::TraceFile,
            trace_path: None,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("trace_path"));
    }

    #[test]
    fn test_min_epsilon_above_initial_rejected() {
        let cfg = RunConfig {
            initial_epsilon: 0.1,
            min_epsilon: 0.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_reward_mapping() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.reward_for(Outcome::Success), 1.0);
        assert_eq!(cfg.reward_for(Outcome::Collision), -1.0);
        assert_eq!(cfg.reward_for(Outcome::Defer), 0.0);
    }

    #[test]
    fn test_data_source_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Wrap {
            data_source: DataSource,
        }
        let w: Wrap = serde_json::from_str(r#"{"data_source":"trace-file"}"#).unwrap();
        assert_eq!(w.data_source, DataSource::TraceFile);
    }
}
