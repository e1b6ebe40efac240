//! specq Core - spectrum state types, occupancy encoder, and configuration
//!
//! This crate provides the foundational types shared by the learning engine
//! and the CLI: the occupancy vector / canonical state encoding, the action
//! and outcome model, the configuration surface with validation, and the run
//! context that makes randomness explicit and reproducible.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod occupancy;
pub mod types;

pub use config::{DataSource, RunConfig, SimulationConfig, MAX_CHANNELS};
pub use context::{RngStream, RunContext};
pub use error::{Result, SpecqError};
pub use occupancy::{encode, OccupancyVector, State};
pub use types::{Action, Outcome, Reward, StepRecord};
