use core::any::TypeId;

use crate::key::ScopeKey;

/// Misuse of the scope lifecycle. Never retried.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    #[error("Trying to transfer request scope but original scope is still active")]
    ScopeTransfer,
    #[error("An HTTP request is already in progress, cannot scope a new request in this thread")]
    RequestInProgress,
    #[error("A request scope is already in progress, cannot scope a new request in this thread")]
    ScopeInProgress,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedErrorKind {
    #[error("Value of type {actual:?} is not compatible with {key}")]
    IncompatibleValue { key: ScopeKey, actual: TypeId },
}
