//! Configuration loading for the specq CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};

use specq_core::RunConfig;

/// Load the run configuration from file and environment.
///
/// Precedence, lowest to highest: built-in defaults, the first config file
/// found, then `SPECQ_`-prefixed environment variables
/// (`SPECQ_SIMULATION__NOISE_FLOOR_DB` style for nested fields).
pub fn load() -> Result<RunConfig> {
    let config_path = find_config_file();

    let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

    if let Some(path) = &config_path {
        tracing::info!("Loading config from: {:?}", path);
        builder = builder.add_source(File::from(path.clone()).required(false));
    } else {
        tracing::info!("No config file found, using defaults");
    }

    builder = builder.add_source(
        Environment::with_prefix("SPECQ")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Find the configuration file.
fn find_config_file() -> Option<PathBuf> {
    // Check in order: SPECQ_CONFIG env, ./specq.toml, ~/.config/specq/specq.toml
    if let Ok(path) = std::env::var("SPECQ_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let local = PathBuf::from("specq.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(home) = dirs::home_dir() {
        let user_config = home.join(".config").join("specq").join("specq.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    None
}
