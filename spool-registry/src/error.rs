//! Registration errors.

use crate::provider::ProviderRole;
use thiserror::Error;

/// Errors raised while building a registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A provider with the same name already holds this role.
    #[error("{role} provider '{name}' already registered")]
    AlreadyRegistered {
        /// Role registered under.
        role: ProviderRole,
        /// Duplicate name.
        name: String,
    },
}

impl From<RegistryError> for spool_core::Error {
    fn from(e: RegistryError) -> Self {
        spool_core::Error::InvalidParameter(e.to_string())
    }
}
