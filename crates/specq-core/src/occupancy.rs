//! Occupancy vector and canonical state encoding
//!
//! A per-step spectrum observation is reduced to an [`OccupancyVector`]
//! (busy/idle per channel) by thresholding power readings, and the vector is
//! encoded into a canonical integer [`State`] with channel 0 as the
//! least-significant bit.
//!
//! This module is the single source of truth for the bit order. The Q-table
//! key space and every persisted checkpoint depend on it: changing the order
//! silently invalidates existing checkpoints.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecqError};
use crate::types::Action;

/// Canonical integer encoding of an occupancy vector, in `[0, 2^N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State(pub u32);

impl State {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Busy/idle reading for every channel at one time step.
///
/// Immutable value type: created once per step, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyVector {
    busy: Vec<bool>,
}

impl OccupancyVector {
    /// Build from raw busy/idle flags.
    pub fn new(busy: Vec<bool>) -> Self {
        Self { busy }
    }

    /// Threshold power readings in dB: `power > threshold` means busy.
    pub fn from_powers(powers_db: &[f64], threshold_db: f64) -> Self {
        Self {
            busy: powers_db.iter().map(|&p| p > threshold_db).collect(),
        }
    }

    pub fn num_channels(&self) -> usize {
        self.busy.len()
    }

    pub fn is_busy(&self, channel: usize) -> bool {
        self.busy.get(channel).copied().unwrap_or(false)
    }

    /// Indices of currently idle channels, ascending.
    pub fn idle_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.busy
            .iter()
            .enumerate()
            .filter(|(_, &busy)| !busy)
            .map(|(ch, _)| ch)
    }

    /// The action set a policy may choose from: every idle channel plus the
    /// always-valid defer action, in ascending index order.
    pub fn valid_actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self.idle_channels().map(Action::Channel).collect();
        actions.push(Action::Defer);
        actions
    }

    /// Encode to the canonical state integer. Channel 0 is the LSB.
    pub fn encode(&self) -> State {
        let mut bits = 0u32;
        for (ch, &busy) in self.busy.iter().enumerate() {
            if busy {
                bits |= 1 << ch;
            }
        }
        State(bits)
    }

    /// Decode a state integer back into an occupancy vector of `num_channels`.
    pub fn decode(state: State, num_channels: usize) -> Self {
        Self {
            busy: (0..num_channels).map(|ch| state.0 & (1 << ch) != 0).collect(),
        }
    }
}

/// Threshold `powers_db` into an occupancy vector and its canonical state.
///
/// Pure function; errors if the reading count does not match the configured
/// channel count.
pub fn encode(
    powers_db: &[f64],
    threshold_db: f64,
    num_channels: usize,
) -> Result<(OccupancyVector, State)> {
    if powers_db.len() != num_channels {
        return Err(SpecqError::DataSource(format!(
            "expected {} power readings, got {}",
            num_channels,
            powers_db.len()
        )));
    }

    let vector = OccupancyVector::from_powers(powers_db, threshold_db);
    let state = vector.encode();
    Ok((vector, state))
}
