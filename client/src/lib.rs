//! Client for a remote todo collection.
//!
//! Keeps a local snapshot of the collection in sync with a [`TodoService`]:
//!
//! - `mount` / `refresh` replace the snapshot with the service's listing
//! - `add` creates an item remotely, then reloads
//! - `toggle` / `update_local` edit the snapshot optimistically, without
//!   telling the service; the next refresh overwrites those edits
//!
//! Every applied listing bumps the snapshot's [`SnapshotVersion`]. Local
//! edits name the version they were computed against and are refused once
//! that version has been replaced.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use todo_sync_client::{ClientConfig, TodoClient};
//! use todo_sync_core::NewItemPayload;
//! use todo_sync_testing::InMemoryTodoService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TodoClient::new(Arc::new(InMemoryTodoService::new()), ClientConfig::from_env());
//!
//! client.mount().await?;
//! let added = client.add(NewItemPayload::new("Buy milk")).await?;
//! println!("Created todo {}", added.created.id);
//!
//! let snapshot = client.snapshot().await;
//! for item in &snapshot.items {
//!     println!("[{}] {}", if item.completed { "x" } else { " " }, item.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`TodoService`]: todo_sync_core::TodoService
//! [`SnapshotVersion`]: todo_sync_core::SnapshotVersion

pub mod client;
pub mod config;
pub mod error;
pub mod reducer;
pub mod types;

// Re-export commonly used types
pub use client::{AddOutcome, TodoClient, TodoStore};
pub use config::ClientConfig;
pub use error::ClientError;
pub use reducer::{TodoEnvironment, TodoReducer};
pub use types::{FetchReason, RequestId, TodoAction, TodoState};
