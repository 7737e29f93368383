//! Domain-specific errors for addon operations

use crate::store::ActorError;
use lam_core::patcher::PatchError;
use lam_core::registry::RegistryError;
use lam_core::store::StoreError;
use lam_core::workshop::ResolveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] ActorError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}

impl From<RegistryError> for InstallError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(ActorError::Registry(err))
    }
}
