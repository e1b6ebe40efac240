//! Error types for specq

use thiserror::Error;

/// Main error type for specq
#[derive(Error, Debug)]
pub enum SpecqError {
    /// Invalid configuration value. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Spectrum data source failure. Recoverable by falling back to the
    /// simulated provider.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Checkpoint save/load failure. A missing checkpoint is not an error
    /// (see `qtable::load`); an incompatible one is fatal.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for specq operations
pub type Result<T> = std::result::Result<T, SpecqError>;
