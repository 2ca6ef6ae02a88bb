//! Errors returned by [`crate::TodoClient`].

use thiserror::Error;
use todo_sync_core::{ServiceError, TodoItem, UpdateError, ValidationError};
use todo_sync_runtime::StoreError;

/// Errors surfaced by client operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The new item was refused before reaching the service
    #[error("Invalid todo: {0}")]
    Validation(#[from] ValidationError),

    /// A local update was refused
    #[error("Local update refused: {0}")]
    Update(#[from] UpdateError),

    /// The service call failed; the collection is unchanged
    #[error(transparent)]
    Remote(#[from] ServiceError),

    /// The service created the item but the listing that followed failed
    ///
    /// The collection still shows the state from before the add. Calling
    /// refresh again picks the item up.
    #[error("Todo {} was created but the refresh that followed failed: {source}", .created.id)]
    RefreshAfterCreate {
        /// Item the service created
        created: TodoItem,
        /// Why the listing failed
        source: ServiceError,
    },

    /// The store rejected the action or stopped waiting
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The flow ended with an event the operation does not expect
    #[error("Unexpected outcome: {0}")]
    UnexpectedOutcome(String),
}

impl ClientError {
    /// Whether the service was reached and did not answer as asked
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::RefreshAfterCreate { .. })
    }
}
