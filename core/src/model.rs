//! Domain types for the todo collection.
//!
//! A todo item is created remotely (the service assigns its id), read back
//! through full listings, and edited locally by flipping `completed`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-assigned identifier of a todo item.
///
/// Opaque to the client: it is only ever compared for equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(i64);

impl TodoId {
    /// Wraps a raw identifier received from the service
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single todo item, as the remote service returns it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Unique identifier, assigned by the service
    pub id: TodoId,
    /// Display text
    pub text: String,
    /// Whether the todo is completed
    pub completed: bool,
}

impl TodoItem {
    /// Creates a new, not yet completed item
    #[must_use]
    pub fn new(id: TodoId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
        }
    }

    /// Returns a copy with `completed` negated
    #[must_use]
    pub fn toggled(&self) -> Self {
        Self {
            completed: !self.completed,
            ..self.clone()
        }
    }
}

/// Reasons a new item is refused before reaching the service
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    /// Text is empty or whitespace only
    #[error("Todo text cannot be empty")]
    Empty,

    /// Text is longer than the configured maximum
    #[error("Todo text too long ({len} characters, max {max})")]
    TooLong {
        /// Length of the submitted text in characters
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Request to create a todo item. The service fills in `id` and `completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemPayload {
    /// Text of the new item
    pub text: String,
}

impl NewItemPayload {
    /// Creates a payload from any string-like value
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Checks the payload against the creation rules
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] for empty or whitespace-only text and
    /// [`ValidationError::TooLong`] when the text has more than `max_len`
    /// characters.
    pub fn validate(&self, max_len: usize) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::Empty);
        }

        let len = self.text.chars().count();
        if len > max_len {
            return Err(ValidationError::TooLong { len, max: max_len });
        }

        Ok(())
    }
}

/// Field-wise update for one item.
///
/// Present fields override the stored entry; absent fields keep their value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    /// Item to update
    pub id: TodoId,
    /// Replacement text
    pub text: Option<String>,
    /// Replacement completion flag
    pub completed: Option<bool>,
}

impl TodoPatch {
    /// A patch that only sets `completed`
    #[must_use]
    pub const fn completed(id: TodoId, completed: bool) -> Self {
        Self {
            id,
            text: None,
            completed: Some(completed),
        }
    }

    /// Merges this patch into `item`
    pub fn apply_to(&self, item: &mut TodoItem) {
        if let Some(text) = &self.text {
            item.text.clone_from(text);
        }
        if let Some(completed) = self.completed {
            item.completed = completed;
        }
    }
}

impl From<TodoItem> for TodoPatch {
    fn from(item: TodoItem) -> Self {
        Self {
            id: item.id,
            text: Some(item.text),
            completed: Some(item.completed),
        }
    }
}

/// Stamp of a loaded snapshot.
///
/// Zero means nothing has been loaded yet; every applied refresh bumps it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SnapshotVersion(u64);

impl SnapshotVersion {
    /// Version of a store that has never been refreshed
    pub const INITIAL: Self = Self(0);

    /// Wraps a raw version number
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw version number
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the version that follows this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Reasons a local update is refused
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateError {
    /// No entry with this id in the current collection
    #[error("Todo with ID {0} not found")]
    NotFound(TodoId),

    /// The update was computed against a snapshot that has been replaced
    #[error("Update based on snapshot {base} but the collection is at {current}")]
    Stale {
        /// Version the caller saw
        base: SnapshotVersion,
        /// Version currently held
        current: SnapshotVersion,
    },
}

/// An ordered view of the collection at one version
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Version of the refresh this view descends from
    pub version: SnapshotVersion,
    /// Items in service order
    pub items: Vec<TodoItem>,
}

impl Snapshot {
    /// Returns the item with the given id
    #[must_use]
    pub fn get(&self, id: TodoId) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids in collection order
    #[must_use]
    pub fn ids(&self) -> Vec<TodoId> {
        self.items.iter().map(|item| item.id).collect()
    }
}

/// Returns the first id that appears more than once, if any
#[must_use]
pub fn find_duplicate_id(items: &[TodoItem]) -> Option<TodoId> {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    items.iter().map(|item| item.id).find(|id| !seen.insert(*id))
}
