//! Persistent metadata cache for parsed build recipes.
//!
//! Parsing a recipe runs the full recipe-language interpreter, so this crate
//! keeps, per recipe file and variant, the facts needed to reach dependency
//! resolution: a [`RecipeSnapshot`]. The [`ValidityStore`] decides from file
//! modification times whether a snapshot is still trustworthy and persists
//! the snapshot table between runs. The [`IndexBuilder`] aggregates snapshots
//! into the provider and runtime-dependency tables the resolver consumes, and
//! [`RecipeLoader`] ties the two together with an external [`Parser`].

#![warn(missing_docs)]

pub mod error;
pub mod index;
pub mod loader;
pub mod metadata;
pub mod parser;
pub mod persist;
pub mod snapshot;
pub mod store;

pub use error::CacheError;
pub use index::{IndexBuilder, RecipeVersion};
pub use loader::{LoadOutcome, RecipeLoader};
pub use metadata::{MapStore, MetadataStore, TaskDeps};
pub use parser::{ParseError, Parser};
pub use persist::{CacheTarget, FileTarget, VersionTag, CACHE_FILE, CACHE_FORMAT_VERSION};
pub use snapshot::{Field, RecipeSnapshot};
pub use store::ValidityStore;
