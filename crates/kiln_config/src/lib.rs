//! Parsing and validation of `kiln.toml` build configuration files.
//!
//! This crate reads the project configuration and its include files into a
//! [`ConfigData`] carrying the merged global variables, the cache settings,
//! and the set of files the configuration was assembled from.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
