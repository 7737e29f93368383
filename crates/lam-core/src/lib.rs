//! Addon state and configuration engine for Left 4 Dead 2.
//!
//! The [`registry`] is the source of truth for installed addons. The
//! [`patcher`] projects its enabled set into the engine's `gameinfo.txt`.

pub mod io;
pub mod manifest;
pub mod patcher;
pub mod paths;
pub mod registry;
pub mod root;
pub mod store;
pub mod transport;
pub mod updater;
pub mod workshop;

#[cfg(feature = "network")]
pub mod steam;

pub mod reporter;

pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("lam-core/", env!("CARGO_PKG_VERSION"));
