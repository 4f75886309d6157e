//! The recipe parser interface.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_config::ConfigData;

use crate::metadata::MetadataStore;

/// A recipe the parser could not interpret.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ParseError {
    /// Description of the failure.
    pub reason: String,
}

impl ParseError {
    /// Creates a parse error with the given description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Interprets one recipe file into a metadata store per variant.
pub trait Parser {
    /// The store type produced for each variant.
    type Store: MetadataStore;

    /// Parses `real_path` with its append overlays under `config`.
    ///
    /// Returns one store per variant tag, keyed by tag; the base variant is
    /// keyed by `""`. Each store records the files read while producing it.
    fn parse(
        &self,
        real_path: &Path,
        appends: &[PathBuf],
        config: &ConfigData,
    ) -> Result<BTreeMap<String, Self::Store>, ParseError>;
}
