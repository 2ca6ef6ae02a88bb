//! The interaction surface: one async method per user-visible operation.
//!
//! Each method tags its command with a fresh [`RequestId`], sends it to the
//! store and waits for the event that ends the flow. State is read after
//! that event has been reduced, so returned snapshots include its result.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::reducer::{TodoEnvironment, TodoReducer};
use crate::types::{FetchReason, RequestId, TodoAction, TodoState};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use todo_sync_core::{
    environment::{Clock, SystemClock},
    NewItemPayload, Snapshot, SnapshotVersion, TodoId, TodoItem, TodoPatch, TodoService,
};
use todo_sync_runtime::Store;

/// Store type driving a [`TodoClient`]
pub type TodoStore = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

/// Result of a successful add
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOutcome {
    /// Item as the service created it
    pub created: TodoItem,
    /// Collection after the refresh that followed
    pub snapshot: Snapshot,
}

/// Client for a remote todo collection
///
/// Cloning shares the store.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use todo_sync_client::{ClientConfig, TodoClient};
/// use todo_sync_core::NewItemPayload;
/// use todo_sync_testing::InMemoryTodoService;
///
/// # async fn example() -> Result<(), todo_sync_client::ClientError> {
/// let client = TodoClient::new(Arc::new(InMemoryTodoService::new()), ClientConfig::default());
///
/// let snapshot = client.mount().await?;
/// assert!(snapshot.is_empty());
///
/// let added = client.add(NewItemPayload::new("buy milk")).await?;
/// let item = added.snapshot.items[0].clone();
/// client.toggle(added.snapshot.version, &item).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TodoClient {
    store: TodoStore,
    config: ClientConfig,
}

impl TodoClient {
    /// Creates a client that stamps syncs with the system clock
    #[must_use]
    pub fn new(service: Arc<dyn TodoService>, config: ClientConfig) -> Self {
        Self::with_clock(service, Arc::new(SystemClock), config)
    }

    /// Creates a client with an explicit clock
    #[must_use]
    pub fn with_clock(
        service: Arc<dyn TodoService>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let environment =
            TodoEnvironment::new(service, clock).with_max_text_len(config.max_text_len);
        let store = Store::with_broadcast_capacity(
            TodoState::new(),
            TodoReducer::new(),
            environment,
            config.broadcast_capacity,
        );

        Self { store, config }
    }

    /// Initial load of the collection
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] if the listing fails; the collection
    /// stays empty.
    pub async fn mount(&self) -> Result<Snapshot, ClientError> {
        self.load(FetchReason::Mount).await
    }

    /// Reloads the whole collection from the service
    ///
    /// Local edits the service does not know about are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] if the listing fails; the previous
    /// collection is kept.
    pub async fn refresh(&self) -> Result<Snapshot, ClientError> {
        self.load(FetchReason::Manual).await
    }

    async fn load(&self, reason: FetchReason) -> Result<Snapshot, ClientError> {
        let request = RequestId::new();
        let outcome = self
            .dispatch(TodoAction::Refresh { request, reason })
            .await?;

        match outcome {
            TodoAction::SnapshotLoaded { .. } => Ok(self.snapshot().await),
            TodoAction::RefreshFailed { error, .. } => Err(ClientError::Remote(error)),
            other => Err(unexpected(&other)),
        }
    }

    /// Creates an item remotely, then reloads the collection
    ///
    /// Blank or over-long text is refused without calling the service.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Validation`]: nothing was sent
    /// - [`ClientError::Remote`]: creation failed, nothing changed
    /// - [`ClientError::RefreshAfterCreate`]: the item exists remotely but the
    ///   collection was not reloaded
    pub async fn add(&self, payload: NewItemPayload) -> Result<AddOutcome, ClientError> {
        let request = RequestId::new();
        let outcome = self
            .dispatch(TodoAction::AddItem { request, payload })
            .await?;

        match outcome {
            TodoAction::SnapshotLoaded {
                reason: FetchReason::AfterCreate(created),
                ..
            } => Ok(AddOutcome {
                created,
                snapshot: self.snapshot().await,
            }),
            TodoAction::RefreshFailed {
                reason: FetchReason::AfterCreate(created),
                error,
                ..
            } => Err(ClientError::RefreshAfterCreate {
                created,
                source: error,
            }),
            TodoAction::AddRejected { error, .. } => Err(ClientError::Validation(error)),
            TodoAction::CreateFailed { error, .. } => Err(ClientError::Remote(error)),
            other => Err(unexpected(&other)),
        }
    }

    /// Flips `completed` on `item`, locally only
    ///
    /// `base` is the version of the snapshot `item` was read from.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub async fn toggle(
        &self,
        base: SnapshotVersion,
        item: &TodoItem,
    ) -> Result<TodoItem, ClientError> {
        self.apply_patch(base, TodoPatch::completed(item.id, !item.completed))
            .await
    }

    /// Replaces the entry with `item`'s id by `item`, locally only
    ///
    /// # Errors
    ///
    /// See [`Self::apply_patch`].
    pub async fn update_local(
        &self,
        base: SnapshotVersion,
        item: TodoItem,
    ) -> Result<TodoItem, ClientError> {
        self.apply_patch(base, TodoPatch::from(item)).await
    }

    /// Merges `patch` into the matching entry, locally only
    ///
    /// Nothing is sent to the service; the next refresh overwrites the edit.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Update`] if no entry has the id or `base` is
    /// not the current version.
    pub async fn apply_patch(
        &self,
        base: SnapshotVersion,
        patch: TodoPatch,
    ) -> Result<TodoItem, ClientError> {
        let request = RequestId::new();
        let outcome = self
            .dispatch(TodoAction::ApplyLocalUpdate {
                request,
                base_version: base,
                patch,
            })
            .await?;

        match outcome {
            TodoAction::LocalUpdateApplied { item, .. } => Ok(item),
            TodoAction::LocalUpdateRejected { error, .. } => Err(ClientError::Update(error)),
            other => Err(unexpected(&other)),
        }
    }

    /// Current collection
    pub async fn snapshot(&self) -> Snapshot {
        self.store.state(TodoState::snapshot).await
    }

    /// Ids edited locally since the last applied listing
    pub async fn locally_modified(&self) -> Vec<TodoId> {
        self.store
            .state(|s| s.locally_modified.iter().copied().collect())
            .await
    }

    /// Message of the last failure, cleared by the next applied listing
    pub async fn last_error(&self) -> Option<String> {
        self.store.state(|s| s.last_error.clone()).await
    }

    /// When the last listing was applied
    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.store.state(|s| s.last_synced_at).await
    }

    /// Underlying store, for observers
    #[must_use]
    pub const fn store(&self) -> &TodoStore {
        &self.store
    }

    /// Configuration the client was built with
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stops accepting operations and waits for in-flight service calls
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if calls are still running at `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ClientError> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(request = %action.request_id()))]
    async fn dispatch(&self, action: TodoAction) -> Result<TodoAction, ClientError> {
        let request = action.request_id();
        let outcome = self
            .store
            .send_and_wait_for(
                action,
                move |candidate| candidate.ends(request),
                self.config.wait_timeout,
            )
            .await?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for TodoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn unexpected(action: &TodoAction) -> ClientError {
    ClientError::UnexpectedOutcome(format!("{action:?}"))
}
