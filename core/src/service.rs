//! Remote collection service trait and related types.
//!
//! The service is the authoritative store for todo items. The client only
//! needs two operations from it:
//!
//! - Append a new item (the service assigns the id)
//! - Fetch the full current collection, in whatever order the service chooses
//!
//! How the service is reached (HTTP, IPC, in-process) is up to the
//! implementation. `InMemoryTodoService` in `todo-sync-testing` is the
//! deterministic implementation used by tests and the demo binary.
//!
//! # Example
//!
//! ```no_run
//! use todo_sync_core::{NewItemPayload, ServiceError, TodoService};
//!
//! async fn example<S: TodoService>(service: &S) -> Result<(), ServiceError> {
//!     let created = service.create_item(NewItemPayload::new("buy milk")).await?;
//!     let all = service.list_items().await?;
//!     assert!(all.iter().any(|item| item.id == created.id));
//!     Ok(())
//! }
//! ```

use crate::model::{NewItemPayload, TodoId, TodoItem};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed future returned by [`TodoService`] operations
pub type ServiceFuture<'a, T> = BoxFuture<'a, Result<T, ServiceError>>;

/// Errors a remote collection service can report.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
    /// The service could not be reached or did not answer.
    #[error("Todo service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request.
    #[error("Todo service rejected the request: {0}")]
    Rejected(String),

    /// A listing contained the same id twice.
    ///
    /// Ids are the reconciliation key, so such a listing cannot be adopted.
    #[error("Todo listing contains duplicate ID {0}")]
    DuplicateId(TodoId),

    /// Anything else.
    #[error("Unexpected todo service error: {0}")]
    Unexpected(String),
}

/// Remote collection of todo items.
///
/// Object safe: the reducer environment holds it as `Arc<dyn TodoService>`.
pub trait TodoService: Send + Sync {
    /// Fetch the full current collection.
    ///
    /// The returned order is authoritative; callers must not re-sort it.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the collection cannot be fetched.
    fn list_items(&self) -> ServiceFuture<'_, Vec<TodoItem>>;

    /// Append a new item and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the item was not persisted.
    fn create_item(&self, payload: NewItemPayload) -> ServiceFuture<'_, TodoItem>;
}
