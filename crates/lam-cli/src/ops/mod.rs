//! Addon operations shared by the commands.

pub mod context;
pub mod error;
pub mod install;
pub mod manage;

pub use context::Context;
pub use error::InstallError;
pub use install::{InstallReport, install_references};
pub use manage::{adopt_orphans, sync_manifest, uninstall};
