//! Decision policies: epsilon-greedy Q-learning and the random baseline
//!
//! Both policies implement the same [`Policy`] trait so the episode engine
//! drives them uniformly; the concrete variant is chosen once at
//! construction, never by branching on a mode flag inside the engine.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use specq_core::{Action, Result, RunConfig, State, StepRecord};

use crate::qtable::{Checkpoint, QTable};

/// Capability interface shared by all decision policies.
pub trait Policy: Send {
    /// Policy name for logs and metrics
    fn name(&self) -> &str;

    /// Choose an action from `valid_actions` for the given state.
    ///
    /// `valid_actions` always contains at least the defer action.
    fn select_action(&mut self, state: State, valid_actions: &[Action]) -> Action;

    /// Apply the learning update for one completed step. `next_valid_actions`
    /// is the action set available in `record.next_state`.
    fn learn(&mut self, record: &StepRecord, next_valid_actions: &[Action]);

    /// Current exploration rate, if the policy has one.
    fn epsilon(&self) -> Option<f64> {
        None
    }

    /// Learning state to persist on shutdown, if the policy has any.
    fn checkpoint(&self) -> Option<Checkpoint> {
        None
    }
}

/// Tabular Q-learning with epsilon-greedy exploration.
///
/// State beyond the configuration is exactly the Q-table and epsilon; both
/// survive episode boundaries and round-trip through checkpoints.
pub struct QLearningPolicy {
    table: QTable,
    learning_rate: f64,
    discount_factor: f64,
    epsilon: f64,
    epsilon_decay: f64,
    min_epsilon: f64,
    rng: StdRng,
}

impl QLearningPolicy {
    pub fn new(config: &RunConfig, rng: StdRng) -> Self {
        Self {
            table: QTable::new(config.num_channels),
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            epsilon: config.initial_epsilon,
            epsilon_decay: config.epsilon_decay,
            min_epsilon: config.min_epsilon,
            rng,
        }
    }

    /// Restore a policy from a persisted checkpoint. Fails if the checkpoint
    /// was built for a different channel count.
    pub fn from_checkpoint(config: &RunConfig, checkpoint: Checkpoint, rng: StdRng) -> Result<Self> {
        let (table, epsilon) = checkpoint.into_table(config.num_channels)?;
        debug!(entries = table.len(), epsilon, "resuming Q-learning policy from checkpoint");
        let mut policy = Self::new(config, rng);
        policy.table = table;
        policy.epsilon = epsilon;
        Ok(policy)
    }

    /// Snapshot the table and epsilon for persistence.
    pub fn export(&self) -> Checkpoint {
        Checkpoint::from_table(&self.table, self.epsilon)
    }

    /// Restore exact learning state from a snapshot.
    pub fn import(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let (table, epsilon) = checkpoint.into_table(self.table.num_channels())?;
        self.table = table;
        self.epsilon = epsilon;
        Ok(())
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    #[cfg(test)]
    pub(crate) fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    #[cfg(test)]
    pub(crate) fn set_q(&mut self, state: State, action: Action, value: f64) {
        self.table.set(state, action, value);
    }
}

impl Policy for QLearningPolicy {
    fn name(&self) -> &str {
        "q_learning"
    }

    fn select_action(&mut self, state: State, valid_actions: &[Action]) -> Action {
        if valid_actions.is_empty() {
            // The mask always includes defer; guard anyway.
            return Action::Defer;
        }

        if self.rng.gen::<f64>() < self.epsilon {
            // Exploration: uniform over valid actions
            valid_actions[self.rng.gen_range(0..valid_actions.len())]
        } else {
            // Exploitation: highest Q-value, lowest index on ties
            self.table
                .best_action(state, valid_actions)
                .unwrap_or(Action::Defer)
        }
    }

    fn learn(&mut self, record: &StepRecord, next_valid_actions: &[Action]) {
        // Defer is always valid, so the max is over a non-empty set.
        let max_next_q = self.table.max_over(record.next_state, next_valid_actions);

        let current_q = self.table.get(record.state, record.action);
        let new_q = current_q
            + self.learning_rate
                * (record.reward + self.discount_factor * max_next_q - current_q);
        self.table.set(record.state, record.action, new_q);

        // Epsilon decays after every step, not every episode.
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.min_epsilon);
    }

    fn epsilon(&self) -> Option<f64> {
        Some(self.epsilon)
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        Some(self.export())
    }
}

/// Baseline policy: uniform random over the valid actions, no learning.
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn select_action(&mut self, _state: State, valid_actions: &[Action]) -> Action {
        if valid_actions.is_empty() {
            return Action::Defer;
        }
        valid_actions[self.rng.gen_range(0..valid_actions.len())]
    }

    fn learn(&mut self, _record: &StepRecord, _next_valid_actions: &[Action]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use specq_core::{Outcome, State};

    fn test_config() -> RunConfig {
        RunConfig {
            seed: Some(1),
            ..Default::default()
        }
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn record(state: State, action: Action, reward: f64, next_state: State) -> StepRecord {
        let outcome = match action {
            Action::Defer => Outcome::Defer,
            _ if reward < 0.0 => Outcome::Collision,
            _ => Outcome::Success,
        };
        StepRecord {
            state,
            action,
            reward,
            outcome,
            next_state,
        }
    }

    #[test]
    fn test_exploitation_selects_dominant_channel() {
        let mut policy = QLearningPolicy::new(&test_config(), rng(3));
        policy.set_epsilon(0.0);
        policy.set_q(State(0), Action::Channel(2), 5.0);
        policy.set_q(State(0), Action::Channel(0), 1.0);

        let valid = vec![
            Action::Channel(0),
            Action::Channel(1),
            Action::Channel(2),
            Action::Channel(3),
            Action::Channel(4),
            Action::Defer,
        ];
        for _ in 0..100 {
            assert_eq!(policy.select_action(State(0), &valid), Action::Channel(2));
        }
    }

    #[test]
    fn test_exploitation_tie_breaks_to_lowest_index() {
        let mut policy = QLearningPolicy::new(&test_config(), rng(3));
        policy.set_epsilon(0.0);

        let valid = vec![Action::Channel(1), Action::Channel(4), Action::Defer];
        assert_eq!(policy.select_action(State(7), &valid), Action::Channel(1));
    }

    #[test]
    fn test_defer_only_mask_selects_defer() {
        let mut policy = QLearningPolicy::new(&test_config(), rng(9));
        for _ in 0..20 {
            assert_eq!(policy.select_action(State(31), &[Action::Defer]), Action::Defer);
        }
    }

    #[test]
    fn test_bellman_update() {
        let config = test_config(); // alpha 0.1, gamma 0.9
        let mut policy = QLearningPolicy::new(&config, rng(5));
        policy.set_q(State(2), Action::Defer, 0.5);

        let next_valid = vec![Action::Channel(0), Action::Defer];
        policy.learn(&record(State(0), Action::Channel(0), 1.0, State(2)), &next_valid);

        // Q(0, ch0) = 0 + 0.1 * (1.0 + 0.9 * 0.5 - 0) = 0.145
        let q = policy.table().get(State(0), Action::Channel(0));
        assert!((q - 0.145).abs() < 1e-12, "q = {q}");
    }

    #[test]
    fn test_epsilon_decays_per_step_and_floors() {
        let config = RunConfig {
            initial_epsilon: 1.0,
            epsilon_decay: 0.5,
            min_epsilon: 0.1,
            ..test_config()
        };
        let mut policy = QLearningPolicy::new(&config, rng(5));

        let next_valid = vec![Action::Defer];
        let mut last = policy.epsilon().unwrap();
        for _ in 0..10 {
            policy.learn(&record(State(0), Action::Defer, 0.0, State(0)), &next_valid);
            let now = policy.epsilon().unwrap();
            assert!(now <= last, "epsilon must be non-increasing");
            assert!(now >= 0.1, "epsilon must not fall below min_epsilon");
            last = now;
        }
        assert_eq!(last, 0.1);
    }

    #[test]
    fn test_export_import_reproduces_choices() {
        let config = test_config();
        let mut trained = QLearningPolicy::new(&config, rng(11));

        // A little training to populate the table and decay epsilon
        let valid = vec![Action::Channel(0), Action::Channel(1), Action::Defer];
        for i in 0..50 {
            let state = State(i % 4);
            let action = trained.select_action(state, &valid);
            let reward = if action == Action::Channel(0) { 1.0 } else { -0.1 };
            trained.learn(&record(state, action, reward, State((i + 1) % 4)), &valid);
        }
        let snapshot = trained.export();

        let mut a = QLearningPolicy::new(&config, rng(99));
        a.import(snapshot.clone()).unwrap();
        let mut b = QLearningPolicy::new(&config, rng(99));
        b.import(snapshot).unwrap();

        for i in 0..200 {
            let state = State(i % 8);
            assert_eq!(a.select_action(state, &valid), b.select_action(state, &valid));
        }
    }

    #[test]
    fn test_import_rejects_channel_mismatch() {
        let five = QLearningPolicy::new(&test_config(), rng(1));
        let snapshot = five.export();

        let three = RunConfig {
            num_channels: 3,
            ..test_config()
        };
        assert!(QLearningPolicy::from_checkpoint(&three, snapshot, rng(1)).is_err());
    }

    #[test]
    fn test_random_policy_stays_within_mask() {
        let mut policy = RandomPolicy::new(rng(21));
        let valid = vec![Action::Channel(1), Action::Channel(3), Action::Defer];

        for _ in 0..500 {
            let action = policy.select_action(State(0), &valid);
            assert!(valid.contains(&action));
        }
    }

    #[test]
    fn test_random_policy_learn_is_noop() {
        let mut policy = RandomPolicy::new(rng(21));
        policy.learn(&record(State(0), Action::Defer, 0.0, State(0)), &[Action::Defer]);
        assert!(policy.epsilon().is_none());
        assert!(policy.checkpoint().is_none());
    }
}
