//! Action, Outcome, and per-step record types

use serde::{Deserialize, Serialize};

use crate::occupancy::{OccupancyVector, State};

/// Reward value from the environment
pub type Reward = f64;

/// Action in the channel-selection environment: transmit on a channel, or
/// defer (no transmission this step). Defer is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Transmit on channel `0..num_channels`
    Channel(usize),
    /// Skip this transmission opportunity
    Defer,
}

impl Action {
    /// Convert to a dense index: channels map to their own index, defer to
    /// `num_channels`. This is the Q-table action key space.
    pub fn to_index(self, num_channels: usize) -> usize {
        match self {
            Action::Channel(ch) => ch,
            Action::Defer => num_channels,
        }
    }

    /// Inverse of [`Action::to_index`]. `None` for out-of-range indices.
    pub fn from_index(index: usize, num_channels: usize) -> Option<Self> {
        match index {
            ch if ch < num_channels => Some(Action::Channel(ch)),
            defer if defer == num_channels => Some(Action::Defer),
            _ => None,
        }
    }

    /// Number of discrete actions for a given channel count
    pub fn action_space_size(num_channels: usize) -> usize {
        num_channels + 1
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Channel(ch) => write!(f, "ch{ch}"),
            Action::Defer => write!(f, "defer"),
        }
    }
}

/// Result of an action scored against the ground-truth occupancy.
///
/// A busy channel is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Chosen channel was idle at action time
    Success,
    /// Chosen channel was busy at action time
    Collision,
    /// The defer action was chosen
    Defer,
}

impl Outcome {
    /// Score an action against the ground-truth occupancy at action time.
    pub fn classify(action: Action, truth: &OccupancyVector) -> Self {
        match action {
            Action::Defer => Outcome::Defer,
            Action::Channel(ch) if truth.is_busy(ch) => Outcome::Collision,
            Action::Channel(_) => Outcome::Success,
        }
    }
}

/// One completed step: ephemeral, consumed by the learning update and the
/// statistics aggregation, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub state: State,
    pub action: Action,
    pub reward: Reward,
    pub outcome: Outcome,
    pub next_state: State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_to_index() {
        assert_eq!(Action::Channel(0).to_index(5), 0);
        assert_eq!(Action::Channel(4).to_index(5), 4);
        assert_eq!(Action::Defer.to_index(5), 5);
    }

    #[test]
    fn test_action_from_index() {
        assert_eq!(Action::from_index(0, 5), Some(Action::Channel(0)));
        assert_eq!(Action::from_index(4, 5), Some(Action::Channel(4)));
        assert_eq!(Action::from_index(5, 5), Some(Action::Defer));
        assert_eq!(Action::from_index(6, 5), None);
    }

    #[test]
    fn test_action_space_size() {
        assert_eq!(Action::action_space_size(5), 6);
        assert_eq!(Action::action_space_size(3), 4);
    }

    #[test]
    fn test_classify_against_ground_truth() {
        let truth = OccupancyVector::new(vec![true, false, false]);

        assert_eq!(
            Outcome::classify(Action::Channel(0), &truth),
            Outcome::Collision
        );
        assert_eq!(
            Outcome::classify(Action::Channel(1), &truth),
            Outcome::Success
        );
        assert_eq!(Outcome::classify(Action::Defer, &truth), Outcome::Defer);
    }

    #[test]
    fn test_defer_never_collides() {
        let all_busy = OccupancyVector::new(vec![true; 5]);
        assert_eq!(Outcome::classify(Action::Defer, &all_busy), Outcome::Defer);
    }

    #[test]
    fn test_action_serialization() {
        let action = Action::Channel(3);
        let json = serde_json::to_string(&action).unwrap();
        let parsed: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Action::Channel(3));
    }
}
