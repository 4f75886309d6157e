//! Shared foundational types used across the kiln recipe cache.
//!
//! This crate provides the virtual filename identity key, dependency-expression
//! splitting, modification-time lookups, and content hashing.

#![warn(missing_docs)]

pub mod deps;
pub mod hash;
pub mod mtime;
pub mod virtual_name;

pub use deps::{explode_dep_versions, explode_deps, DepSpec};
pub use hash::ContentHash;
pub use mtime::{file_mtime, newest_mtime, FileDepend, FsMtimes, Mtime, MtimeSource};
pub use virtual_name::{InvalidName, VirtualName};
