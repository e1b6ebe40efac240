//! CLI command modules

pub mod run;
pub mod validate;
