//! Episode engine: drives the per-step observe/decide/score/learn loop
//!
//! Every policy sees the same observation at the same step, so the
//! comparison between the learner and the baseline is fair. Episodes are a
//! reporting and checkpoint granularity only; nothing in any policy resets
//! at an episode boundary.
//!
//! Learning uses one-step lookahead with continuing-stream semantics: each
//! completed step is held until the next observation arrives, then handed to
//! `Policy::learn` with the new state as `next_state` - across episode
//! boundaries. The final step of the run uses its own state as a terminal
//! proxy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use specq_core::{
    encode, Action, OccupancyVector, Outcome, Result, Reward, RunConfig, State, StepRecord,
};

use crate::policy::Policy;
use crate::spectrum::SpectrumProvider;

/// Per-policy running counters.
#[derive(Debug, Clone, Default)]
pub struct PolicyStats {
    pub success_count: u64,
    pub collision_count: u64,
    pub defer_count: u64,
    pub total_reward: f64,
    /// Selection counts per channel, with the defer action in the last slot
    pub channel_histogram: Vec<u64>,
}

impl PolicyStats {
    fn new(num_channels: usize) -> Self {
        Self {
            channel_histogram: vec![0; Action::action_space_size(num_channels)],
            ..Default::default()
        }
    }

    fn record(&mut self, action: Action, outcome: Outcome, reward: Reward, num_channels: usize) {
        match outcome {
            Outcome::Success => self.success_count += 1,
            Outcome::Collision => self.collision_count += 1,
            Outcome::Defer => self.defer_count += 1,
        }
        self.total_reward += reward;
        self.channel_histogram[action.to_index(num_channels)] += 1;
    }

    pub fn steps(&self) -> u64 {
        self.success_count + self.collision_count + self.defer_count
    }

    pub fn success_rate(&self) -> f64 {
        self.rate(self.success_count)
    }

    pub fn collision_rate(&self) -> f64 {
        self.rate(self.collision_count)
    }

    pub fn defer_rate(&self) -> f64 {
        self.rate(self.defer_count)
    }

    fn rate(&self, count: u64) -> f64 {
        let steps = self.steps();
        if steps == 0 {
            0.0
        } else {
            count as f64 / steps as f64
        }
    }
}

/// Point-in-time view of one policy's statistics, for metrics export.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub policy: String,
    pub steps: u64,
    pub total_reward: f64,
    pub success_rate: f64,
    pub collision_rate: f64,
    pub defer_rate: f64,
    pub channel_histogram: Vec<u64>,
    pub epsilon: Option<f64>,
}

/// Per-episode metrics handed to the external visualization collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeMetrics {
    pub episode: u64,
    pub policies: Vec<PolicySnapshot>,
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub episodes_completed: u64,
    pub steps: u64,
    pub episodes: Vec<EpisodeMetrics>,
    pub final_stats: Vec<PolicySnapshot>,
}

/// A step waiting for the next observation to complete its learning update.
struct PendingStep {
    state: State,
    action: Action,
    reward: Reward,
    outcome: Outcome,
}

struct PolicySlot {
    policy: Box<dyn Policy>,
    stats: PolicyStats,
    pending: Option<PendingStep>,
}

impl PolicySlot {
    fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            policy: self.policy.name().to_string(),
            steps: self.stats.steps(),
            total_reward: self.stats.total_reward,
            success_rate: self.stats.success_rate(),
            collision_rate: self.stats.collision_rate(),
            defer_rate: self.stats.defer_rate(),
            channel_histogram: self.stats.channel_histogram.clone(),
            epsilon: self.policy.epsilon(),
        }
    }
}

/// Drives the decision/learning loop for any number of policies over one
/// spectrum provider.
pub struct EpisodeEngine {
    config: RunConfig,
    provider: Box<dyn SpectrumProvider>,
    slots: Vec<PolicySlot>,
    stop: Arc<AtomicBool>,
}

impl EpisodeEngine {
    pub fn new(
        config: RunConfig,
        provider: Box<dyn SpectrumProvider>,
        policies: Vec<Box<dyn Policy>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let num_channels = config.num_channels;
        let slots = policies
            .into_iter()
            .map(|policy| PolicySlot {
                policy,
                stats: PolicyStats::new(num_channels),
                pending: None,
            })
            .collect();
        Self {
            config,
            provider,
            slots,
            stop,
        }
    }

    /// Run until the episode budget, the time budget, the data source, or a
    /// stop request ends the run - whichever comes first. The Q-table
    /// checkpoint is persisted on every exit path when a path is configured.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let deadline = self.config.time_budget_seconds.map(Duration::from_secs);

        let mut episodes: Vec<EpisodeMetrics> = Vec::new();
        let mut steps: u64 = 0;

        info!(
            provider = self.provider.name(),
            episodes = self.config.episode_count,
            steps_per_episode = self.config.steps_per_episode,
            "starting run"
        );

        'episodes: for episode in 0..self.config.episode_count {
            for _ in 0..self.config.steps_per_episode {
                // Cancellation and budgets are observed between steps, never
                // mid-update, so persisted state is always consistent.
                if self.stop.load(Ordering::Relaxed) {
                    info!(episode, steps, "stop requested, finishing run");
                    break 'episodes;
                }
                if let Some(budget) = deadline {
                    if started.elapsed() >= budget {
                        info!(episode, steps, "time budget exhausted");
                        break 'episodes;
                    }
                }

                let Some(observation) = self.provider.next_observation()? else {
                    info!(episode, steps, "spectrum source exhausted");
                    break 'episodes;
                };

                self.step(&observation.powers_db)?;
                steps += 1;
            }

            let metrics = EpisodeMetrics {
                episode,
                policies: self.slots.iter().map(PolicySlot::snapshot).collect(),
            };
            if (episode + 1) % 10 == 0 {
                for snap in &metrics.policies {
                    info!(
                        episode,
                        policy = %snap.policy,
                        total_reward = format_args!("{:.2}", snap.total_reward),
                        success_rate = format_args!("{:.3}", snap.success_rate),
                        collision_rate = format_args!("{:.3}", snap.collision_rate),
                        epsilon = ?snap.epsilon,
                        "episode complete"
                    );
                }
            }
            episodes.push(metrics);
        }

        self.flush_pending();
        self.persist_checkpoints();

        Ok(RunSummary {
            episodes_completed: episodes.len() as u64,
            steps,
            episodes,
            final_stats: self.slots.iter().map(PolicySlot::snapshot).collect(),
        })
    }

    /// One decision cycle over a fresh observation.
    fn step(&mut self, powers_db: &[f64]) -> Result<()> {
        let (sensed, state) = encode(
            powers_db,
            self.config.power_threshold_db,
            self.config.num_channels,
        )?;

        // Masking uses the sensed vector; with the current providers sensing
        // is perfect, so the same vector also serves as ground truth for
        // scoring.
        let valid_actions = sensed.valid_actions();
        let truth = &sensed;

        for slot in &mut self.slots {
            // Complete the previous step now that its next-state is known.
            if let Some(pending) = slot.pending.take() {
                let record = StepRecord {
                    state: pending.state,
                    action: pending.action,
                    reward: pending.reward,
                    outcome: pending.outcome,
                    next_state: state,
                };
                slot.policy.learn(&record, &valid_actions);
            }

            let action = slot.policy.select_action(state, &valid_actions);
            let outcome = Outcome::classify(action, truth);
            let reward = self.config.reward_for(outcome);

            debug!(
                policy = slot.policy.name(),
                %state,
                %action,
                ?outcome,
                reward,
                "step"
            );

            slot.stats
                .record(action, outcome, reward, self.config.num_channels);
            slot.pending = Some(PendingStep {
                state,
                action,
                reward,
                outcome,
            });
        }
        Ok(())
    }

    /// Learn the held final step using its own state as a terminal proxy.
    fn flush_pending(&mut self) {
        let num_channels = self.config.num_channels;
        for slot in &mut self.slots {
            if let Some(pending) = slot.pending.take() {
                let vector = OccupancyVector::decode(pending.state, num_channels);
                let valid_actions = vector.valid_actions();
                let record = StepRecord {
                    state: pending.state,
                    action: pending.action,
                    reward: pending.reward,
                    outcome: pending.outcome,
                    next_state: pending.state,
                };
                slot.policy.learn(&record, &valid_actions);
            }
        }
    }

    fn persist_checkpoints(&self) {
        let Some(path) = self.config.checkpoint_path.as_deref() else {
            return;
        };
        for slot in &self.slots {
            if let Some(checkpoint) = slot.policy.checkpoint() {
                if let Err(e) = checkpoint.save(path) {
                    warn!(error = %e, path = %path.display(), "failed to persist Q-table checkpoint");
                }
            }
        }
    }
}
