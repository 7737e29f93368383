//! Shared types for lam, the Source-engine addon manager.
//!
//! This crate holds the identifiers and records that every other crate in the
//! workspace speaks: Workshop references, registry keys, addon records and the
//! descriptors produced by collection resolution.

pub mod reference;
pub mod types;
pub mod version;

// Re-exports
pub use reference::{ReferenceError, WorkshopId};
pub use types::*;

/// Marker comment that tags every manifest line owned by lam.
pub const MANAGED_MARKER: &str = "// lam:managed";

/// File extension of packed content archives.
pub const ARCHIVE_EXTENSION: &str = "vpk";
