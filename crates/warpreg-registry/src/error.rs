//! Error types for registry operations.

use thiserror::Error;

use warpreg_state::StateError;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Empty ids, ids with surrounding whitespace and ids containing
    /// control characters are rejected.
    #[error("invalid worker id {0:?}")]
    InvalidIdentity(String),

    #[error("invalid worker address: {0}")]
    InvalidAddress(String),

    /// Only surfaced at startup; steady-state store failures are logged.
    #[error("store error: {0}")]
    Store(#[from] StateError),
}

impl RegistryError {
    /// True for errors caused by caller input rather than the registry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidIdentity(_) | RegistryError::InvalidAddress(_)
        )
    }
}
