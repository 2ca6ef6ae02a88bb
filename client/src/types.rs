//! Domain types for the todo client.
//!
//! `TodoState` is the client's view of the remote collection: the last
//! listing the service returned, plus any optimistic edits applied on top of
//! it since. `TodoAction` covers every input the reducer handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use todo_sync_core::{
    find_duplicate_id, NewItemPayload, ServiceError, Snapshot, SnapshotVersion, TodoId, TodoItem,
    TodoPatch, UpdateError, ValidationError,
};
use uuid::Uuid;

/// Correlates the actions of one client flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a listing was requested
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchReason {
    /// Initial load
    Mount,
    /// Explicit refresh
    Manual,
    /// Resync after the service accepted a new item
    AfterCreate(TodoItem),
}

/// State of the client's todo collection
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TodoState {
    /// Items in service order
    pub items: Vec<TodoItem>,
    /// Version of the last applied listing
    pub version: SnapshotVersion,
    /// Items edited locally since the last applied listing
    pub locally_modified: BTreeSet<TodoId>,
    /// When the last listing was applied
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Last failure (validation, remote or local update)
    pub last_error: Option<String>,
    /// Sequence number of the most recently requested listing
    pub fetch_seq: u64,
    /// Sequence number of the listing currently held
    pub applied_fetch_seq: u64,
}

impl TodoState {
    /// Creates an empty, never-loaded state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of todos
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns the number of completed todos
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|t| t.completed).count()
    }

    /// Returns a todo by ID
    #[must_use]
    pub fn get(&self, id: TodoId) -> Option<&TodoItem> {
        self.items.iter().find(|t| t.id == id)
    }

    /// Whether a listing has been applied
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.version > SnapshotVersion::INITIAL
    }

    /// Copy of the current view
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            items: self.items.clone(),
        }
    }

    /// Reserves the sequence number for a new listing request
    pub fn next_fetch_seq(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_seq
    }

    /// Whether a listing requested as `fetch_seq` is older than the one held
    #[must_use]
    pub const fn is_stale_fetch(&self, fetch_seq: u64) -> bool {
        fetch_seq <= self.applied_fetch_seq
    }

    /// Replaces the whole collection with a listing
    ///
    /// No merge with local state: edits not known to the service are lost.
    /// Returns the number of locally modified items that were discarded.
    ///
    /// # Errors
    ///
    /// Returns the offending id if the listing has duplicate ids; the state is
    /// left untouched.
    pub fn replace_snapshot(
        &mut self,
        items: Vec<TodoItem>,
        fetch_seq: u64,
        synced_at: DateTime<Utc>,
    ) -> Result<usize, TodoId> {
        if let Some(duplicate) = find_duplicate_id(&items) {
            return Err(duplicate);
        }

        let discarded = self.locally_modified.len();
        self.items = items;
        self.version = self.version.next();
        self.locally_modified.clear();
        self.last_synced_at = Some(synced_at);
        self.applied_fetch_seq = fetch_seq;
        self.last_error = None;

        Ok(discarded)
    }

    /// Applies an optimistic, local-only update to one item
    ///
    /// Fields present in `patch` override the stored entry. The collection's
    /// length and id set never change.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Stale`] if `base` is not the version currently held
    /// - [`UpdateError::NotFound`] if no item has the patch's id
    pub fn apply_local_update(
        &mut self,
        base: SnapshotVersion,
        patch: &TodoPatch,
    ) -> Result<TodoItem, UpdateError> {
        if base != self.version {
            return Err(UpdateError::Stale {
                base,
                current: self.version,
            });
        }

        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == patch.id)
            .ok_or(UpdateError::NotFound(patch.id))?;

        patch.apply_to(item);
        self.locally_modified.insert(patch.id);

        Ok(item.clone())
    }
}

/// Actions representing commands and events for the todo collection
///
/// Commands come from the interaction surface; events come back from
/// effects. Every command ends in exactly one terminal event carrying the
/// same `RequestId`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TodoAction {
    // ========== Commands ==========
    /// Command: Reload the whole collection from the service
    Refresh {
        /// Flow identifier
        request: RequestId,
        /// Why the listing is needed
        reason: FetchReason,
    },

    /// Command: Create an item remotely, then reload
    AddItem {
        /// Flow identifier
        request: RequestId,
        /// Item to create
        payload: NewItemPayload,
    },

    /// Command: Apply an optimistic local update
    ApplyLocalUpdate {
        /// Flow identifier
        request: RequestId,
        /// Version the caller computed the patch against
        base_version: SnapshotVersion,
        /// Fields to override
        patch: TodoPatch,
    },

    // ========== Events ==========
    /// Event: The service returned a listing
    SnapshotLoaded {
        /// Flow identifier
        request: RequestId,
        /// Sequence number reserved when the listing was requested
        fetch_seq: u64,
        /// Why the listing was requested
        reason: FetchReason,
        /// Listing in service order
        items: Vec<TodoItem>,
    },

    /// Event: The listing failed
    RefreshFailed {
        /// Flow identifier
        request: RequestId,
        /// Why the listing was requested
        reason: FetchReason,
        /// What went wrong
        error: ServiceError,
    },

    /// Event: The service accepted a new item
    ItemCreated {
        /// Flow identifier
        request: RequestId,
        /// Created item with its assigned id
        item: TodoItem,
    },

    /// Event: The service did not create the item
    CreateFailed {
        /// Flow identifier
        request: RequestId,
        /// What went wrong
        error: ServiceError,
    },

    /// Event: The payload failed validation; nothing was sent
    AddRejected {
        /// Flow identifier
        request: RequestId,
        /// Reason
        error: ValidationError,
    },

    /// Event: A local update was applied
    LocalUpdateApplied {
        /// Flow identifier
        request: RequestId,
        /// Item after the merge
        item: TodoItem,
    },

    /// Event: A local update was refused
    LocalUpdateRejected {
        /// Flow identifier
        request: RequestId,
        /// Reason
        error: UpdateError,
    },
}

impl TodoAction {
    /// Flow this action belongs to
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Refresh { request, .. }
            | Self::AddItem { request, .. }
            | Self::ApplyLocalUpdate { request, .. }
            | Self::SnapshotLoaded { request, .. }
            | Self::RefreshFailed { request, .. }
            | Self::ItemCreated { request, .. }
            | Self::CreateFailed { request, .. }
            | Self::AddRejected { request, .. }
            | Self::LocalUpdateApplied { request, .. }
            | Self::LocalUpdateRejected { request, .. } => *request,
        }
    }

    /// Whether this is a command (intent) rather than an event (outcome)
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::Refresh { .. } | Self::AddItem { .. } | Self::ApplyLocalUpdate { .. }
        )
    }

    /// Whether this is an event
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }

    /// Whether this event ends its flow
    ///
    /// `ItemCreated` is the only event that does not: the add flow continues
    /// with a listing.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.is_event() && !matches!(self, Self::ItemCreated { .. })
    }

    /// Whether this is the terminal event of flow `request`
    #[must_use]
    pub fn ends(&self, request: RequestId) -> bool {
        self.is_terminal() && self.request_id() == request
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: i64, text: &str, completed: bool) -> TodoItem {
        TodoItem {
            id: TodoId::new(id),
            text: text.to_string(),
            completed,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn loaded(items: Vec<TodoItem>) -> TodoState {
        let mut state = TodoState::new();
        let seq = state.next_fetch_seq();
        state.replace_snapshot(items, seq, now()).unwrap();
        state
    }

    #[test]
    fn request_id_display() {
        let id = RequestId::new();
        assert!(!format!("{id}").is_empty());
        assert_ne!(id, RequestId::new());
    }

    #[test]
    fn new_state_is_unloaded() {
        let state = TodoState::new();
        assert!(!state.is_loaded());
        assert_eq!(state.count(), 0);
        assert_eq!(state.snapshot().version, SnapshotVersion::INITIAL);
    }

    #[test]
    fn replace_snapshot_overwrites_and_bumps_version() {
        let mut state = loaded(vec![item(1, "a", false)]);
        state
            .apply_local_update(state.version, &TodoPatch::completed(TodoId::new(1), true))
            .unwrap();
        assert_eq!(state.locally_modified.len(), 1);

        let seq = state.next_fetch_seq();
        let discarded = state
            .replace_snapshot(vec![item(2, "b", false), item(1, "a", false)], seq, now())
            .unwrap();

        assert_eq!(discarded, 1);
        assert_eq!(state.version, SnapshotVersion::new(2));
        assert_eq!(state.items, vec![item(2, "b", false), item(1, "a", false)]);
        assert!(state.locally_modified.is_empty());
        assert_eq!(state.last_synced_at, Some(now()));
        assert_eq!(state.applied_fetch_seq, seq);
    }

    #[test]
    fn replace_snapshot_rejects_duplicates() {
        let mut state = loaded(vec![item(1, "a", false)]);
        let before = state.snapshot();

        let seq = state.next_fetch_seq();
        let result = state.replace_snapshot(vec![item(3, "x", false), item(3, "y", true)], seq, now());

        assert_eq!(result, Err(TodoId::new(3)));
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn stale_fetch_detection() {
        let mut state = TodoState::new();
        let first = state.next_fetch_seq();
        let second = state.next_fetch_seq();
        state.replace_snapshot(Vec::new(), second, now()).unwrap();

        assert!(state.is_stale_fetch(first));
        assert!(state.is_stale_fetch(second));
        assert!(!state.is_stale_fetch(second + 1));
    }

    #[test]
    fn apply_local_update_flips_one_item() {
        let mut state = loaded(vec![item(1, "a", false), item(2, "b", false)]);

        let merged = state
            .apply_local_update(state.version, &TodoPatch::completed(TodoId::new(2), true))
            .unwrap();

        assert_eq!(merged, item(2, "b", true));
        assert_eq!(state.items, vec![item(1, "a", false), item(2, "b", true)]);
        assert_eq!(state.version, SnapshotVersion::new(1));
        assert!(state.locally_modified.contains(&TodoId::new(2)));
        assert_eq!(state.completed_count(), 1);
    }

    #[test]
    fn apply_local_update_unknown_id() {
        let mut state = loaded(vec![item(1, "a", false)]);
        let before = state.clone();

        let result =
            state.apply_local_update(state.version, &TodoPatch::completed(TodoId::new(9), true));

        assert_eq!(result, Err(UpdateError::NotFound(TodoId::new(9))));
        assert_eq!(state.items, before.items);
        assert!(state.locally_modified.is_empty());
    }

    #[test]
    fn apply_local_update_stale_base() {
        let mut state = loaded(vec![item(1, "a", false)]);

        let result = state.apply_local_update(
            SnapshotVersion::INITIAL,
            &TodoPatch::completed(TodoId::new(1), true),
        );

        assert_eq!(
            result,
            Err(UpdateError::Stale {
                base: SnapshotVersion::INITIAL,
                current: SnapshotVersion::new(1),
            })
        );
        assert!(!state.items[0].completed);
    }

    #[test]
    fn action_classification() {
        let request = RequestId::new();
        let add = TodoAction::AddItem {
            request,
            payload: NewItemPayload::new("a"),
        };
        assert!(add.is_command());
        assert!(!add.is_terminal());

        let created = TodoAction::ItemCreated {
            request,
            item: item(1, "a", false),
        };
        assert!(created.is_event());
        assert!(!created.is_terminal());

        let loaded = TodoAction::SnapshotLoaded {
            request,
            fetch_seq: 1,
            reason: FetchReason::AfterCreate(item(1, "a", false)),
            items: Vec::new(),
        };
        assert!(loaded.ends(request));
        assert!(!loaded.ends(RequestId::new()));
    }

    #[test]
    fn failure_events_keep_service_error_variant_through_json() {
        let request = RequestId::new();
        let refresh = TodoAction::RefreshFailed {
            request,
            reason: FetchReason::Manual,
            error: ServiceError::DuplicateId(TodoId::new(7)),
        };
        let create = TodoAction::CreateFailed {
            request,
            error: ServiceError::Unavailable("connection refused".to_string()),
        };

        let refresh: TodoAction =
            serde_json::from_str(&serde_json::to_string(&refresh).unwrap()).unwrap();
        let create: TodoAction =
            serde_json::from_str(&serde_json::to_string(&create).unwrap()).unwrap();

        assert!(matches!(
            refresh,
            TodoAction::RefreshFailed {
                error: ServiceError::DuplicateId(id),
                ..
            } if id == TodoId::new(7)
        ));
        assert!(matches!(
            create,
            TodoAction::CreateFailed {
                error: ServiceError::Unavailable(ref message),
                ..
            } if message == "connection refused"
        ));
    }
}
