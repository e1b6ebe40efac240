//! Sparse Q-table and checkpoint persistence
//!
//! The table maps `(state, action)` to a value estimate; absent entries are
//! zero. Checkpoints persist the full table together with the exploration
//! rate and the channel count that built it. The channel count doubles as the
//! compatibility guard: the state encoding (channel 0 = LSB, see
//! `specq_core::occupancy`) changes meaning with the channel count, so a
//! mismatched checkpoint must be rejected rather than silently reused.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use specq_core::{Action, Result, SpecqError, State};

/// In-memory value table, owned exclusively by the Q-learning policy.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    values: HashMap<(u32, usize), f64>,
    num_channels: usize,
}

impl QTable {
    pub fn new(num_channels: usize) -> Self {
        Self {
            values: HashMap::new(),
            num_channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Current estimate for `(state, action)`; unvisited pairs are 0.0.
    pub fn get(&self, state: State, action: Action) -> f64 {
        self.values
            .get(&(state.value(), action.to_index(self.num_channels)))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set(&mut self, state: State, action: Action, value: f64) {
        self.values
            .insert((state.value(), action.to_index(self.num_channels)), value);
    }

    /// Max Q-value over a non-empty action set.
    pub fn max_over(&self, state: State, actions: &[Action]) -> f64 {
        actions
            .iter()
            .map(|&a| self.get(state, a))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Best action from `actions` by current value. Ties break to the first
    /// candidate in iteration order; callers pass actions in ascending index
    /// order, so this is the deterministic lowest-index rule.
    pub fn best_action(&self, state: State, actions: &[Action]) -> Option<Action> {
        let mut best: Option<(Action, f64)> = None;
        for &action in actions {
            let q = self.get(state, action);
            match best {
                Some((_, best_q)) if q <= best_q => {}
                _ => best = Some((action, q)),
            }
        }
        best.map(|(a, _)| a)
    }

    /// Number of materialized (visited) entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn entries(&self) -> Vec<CheckpointEntry> {
        let mut entries: Vec<CheckpointEntry> = self
            .values
            .iter()
            .map(|(&(state, action), &value)| CheckpointEntry {
                state,
                action,
                value,
            })
            .collect();
        // Stable file contents for identical tables
        entries.sort_by_key(|e| (e.state, e.action));
        entries
    }
}

/// One persisted `(state, action) -> value` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub state: u32,
    pub action: usize,
    pub value: f64,
}

/// Persisted learning state: the whole table plus epsilon, keyed to the
/// channel count that built it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub num_channels: usize,
    pub epsilon: f64,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<CheckpointEntry>,
}

impl Checkpoint {
    pub fn from_table(table: &QTable, epsilon: f64) -> Self {
        Self {
            num_channels: table.num_channels(),
            epsilon,
            saved_at: Utc::now(),
            entries: table.entries(),
        }
    }

    /// Rebuild the in-memory table for a run with `num_channels` channels.
    /// A checkpoint built for a different channel count is fatal: its state
    /// and action keys would silently mean something else.
    pub fn into_table(self, num_channels: usize) -> Result<(QTable, f64)> {
        if self.num_channels != num_channels {
            return Err(SpecqError::Persistence(format!(
                "checkpoint was built for {} channels but the run is configured for {}",
                self.num_channels, num_channels
            )));
        }

        let mut table = QTable::new(num_channels);
        for entry in self.entries {
            table.values.insert((entry.state, entry.action), entry.value);
        }
        Ok((table, self.epsilon))
    }

    /// Write the checkpoint as JSON. The write goes to a sibling temp file
    /// first and is renamed into place, so an interrupted save never leaves
    /// a truncated checkpoint over a good one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), entries = self.entries.len(), "Q-table checkpoint saved");
        Ok(())
    }

    /// Load a checkpoint. A missing file is "no checkpoint" (`Ok(None)`), so
    /// a fresh run proceeds; anything else unreadable is an error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no checkpoint found, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&json)
            .map_err(|e| SpecqError::Persistence(format!("malformed checkpoint: {e}")))?;
        debug!(path = %path.display(), entries = checkpoint.entries.len(), "checkpoint loaded");
        Ok(Some(checkpoint))
    }
}
