//! # Todo Sync Testing
//!
//! Testing utilities and helpers for the todo sync client.
//!
//! This crate provides:
//! - `InMemoryTodoService`: a deterministic remote collection with call
//!   counters, failure injection and a gate for holding listings in flight
//! - `FixedClock` for reproducible timestamps
//! - `ReducerTest`, a Given-When-Then harness for reducers
//! - proptest strategies for todo collections
//!
//! ## Example
//!
//! ```ignore
//! use todo_sync_testing::{test_clock, InMemoryTodoService};
//!
//! #[tokio::test]
//! async fn add_then_list() {
//!     let service = Arc::new(InMemoryTodoService::new());
//!     let client = TodoClient::with_clock(service.clone(), Arc::new(test_clock()), config);
//!
//!     client.add(NewItemPayload::new("buy milk")).await?;
//!     assert_eq!(service.create_calls(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use todo_sync_core::environment::Clock;


/// In-memory remote collection service
pub mod service_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use todo_sync_testing::mocks::FixedClock;
    /// use todo_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Test helpers and utilities
pub mod helpers {
    use todo_sync_core::effect::Effect;

    /// Run effect futures to completion and collect the actions they produce
    ///
    /// Lets reducer tests check what an effect would feed back without a
    /// running store. Futures run one after another in the given order.
    pub async fn resolve_effects<A, I>(effects: I) -> Vec<A>
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        let mut actions = Vec::new();
        for effect in effects {
            if let Effect::Future(fut) = effect {
                if let Some(action) = fut.await {
                    actions.push(action);
                }
            }
        }
        actions
    }
}

/// Property-based testing utilities
///
/// proptest strategies for todo items and collections.
pub mod properties {
    use proptest::collection::{btree_set, vec};
    use proptest::prelude::*;
    use todo_sync_core::{TodoId, TodoItem};

    /// Strategy for non-blank todo text
    pub fn todo_text() -> impl Strategy<Value = String> {
        "[a-z][a-z ]{0,15}"
    }

    /// Strategy for a single todo item with the given id
    pub fn todo_item(id: TodoId) -> impl Strategy<Value = TodoItem> {
        (todo_text(), any::<bool>()).prop_map(move |(text, completed)| TodoItem {
            id,
            text,
            completed,
        })
    }

    /// Strategy for a collection of up to `max_len` items with unique ids,
    /// in arbitrary order
    pub fn collection(max_len: usize) -> impl Strategy<Value = Vec<TodoItem>> {
        btree_set(1_i64..10_000, 0..=max_len)
            .prop_flat_map(|ids| {
                ids.into_iter()
                    .map(|raw| todo_item(TodoId::new(raw)))
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }

    /// Strategy for a non-empty collection plus the index of one of its items
    pub fn collection_with_index(max_len: usize) -> impl Strategy<Value = (Vec<TodoItem>, usize)> {
        collection(max_len.max(1))
            .prop_filter("collection must not be empty", |items| !items.is_empty())
            .prop_flat_map(|items| {
                let len = items.len();
                (Just(items), 0..len)
            })
    }

    /// Strategy for raw texts that fail creation validation
    pub fn blank_text() -> impl Strategy<Value = String> {
        vec(prop_oneof![Just(' '), Just('\t'), Just('\n')], 0..8)
            .prop_map(|chars| chars.into_iter().collect())
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};
pub use reducer_test::{assertions, ReducerTest};
pub use service_mocks::{InMemoryTodoService, ListOrder};
