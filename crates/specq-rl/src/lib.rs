//! specq RL - policies, spectrum providers, and the episode engine
//!
//! This crate turns the core types into a running system: spectrum providers
//! produce per-channel power observations (simulated, trace replay, or a
//! real-time queued overlay), policies turn encoded states into channel
//! decisions, and the episode engine drives both through the
//! observe/decide/score/learn loop with checkpoint persistence.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod engine;
pub mod policy;
pub mod qtable;
pub mod realtime;
pub mod spectrum;

pub use engine::{EpisodeEngine, EpisodeMetrics, PolicySnapshot, PolicyStats, RunSummary};
pub use policy::{Policy, QLearningPolicy, RandomPolicy};
pub use qtable::{Checkpoint, CheckpointEntry, QTable};
pub use realtime::QueuedProvider;
pub use spectrum::{build_provider, Observation, SimulatedProvider, SpectrumProvider, TraceProvider};
