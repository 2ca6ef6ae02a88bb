//! In-memory implementation of the remote todo service.
//!
//! Behaves like the real backend (ids assigned on create, newest items listed
//! first) and adds the knobs tests need: call counters, one-shot failure
//! injection, direct edits of the remote data, and a gate that holds listings
//! in flight.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use todo_sync_core::{
    NewItemPayload, ServiceError, ServiceFuture, TodoId, TodoItem, TodoService,
};
use tokio::sync::watch;

/// Order in which [`InMemoryTodoService`] lists items
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListOrder {
    /// Highest id first, like the production backend
    #[default]
    NewestFirst,
    /// Creation order
    Insertion,
}

#[derive(Debug)]
struct Inner {
    items: Vec<TodoItem>,
    /// `None` once the id space is used up
    next_id: Option<i64>,
    order: ListOrder,
    create_calls: usize,
    list_calls: usize,
    create_failures: VecDeque<ServiceError>,
    list_failures: VecDeque<ServiceError>,
}

/// In-memory remote collection for tests and demos
///
/// Cloning shares the underlying collection.
///
/// # Example
///
/// ```
/// use todo_sync_core::{NewItemPayload, TodoService};
/// use todo_sync_testing::InMemoryTodoService;
///
/// # tokio_test::block_on(async {
/// let service = InMemoryTodoService::new();
/// let created = service.create_item(NewItemPayload::new("buy milk")).await.unwrap();
/// let all = service.list_items().await.unwrap();
/// assert_eq!(all, vec![created]);
/// assert_eq!(service.create_calls(), 1);
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryTodoService {
    inner: Arc<Mutex<Inner>>,
    list_gate: Arc<watch::Sender<bool>>,
}

impl InMemoryTodoService {
    /// Create an empty service
    #[must_use]
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Create a service that already holds `items`
    ///
    /// Newly created items get ids above the highest one given here. If that
    /// id is `i64::MAX`, every later `create_item` is rejected.
    #[must_use]
    pub fn with_items(items: Vec<TodoItem>) -> Self {
        let next_id = id_after(&items);
        let (list_gate, _) = watch::channel(false);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                items,
                next_id,
                order: ListOrder::default(),
                create_calls: 0,
                list_calls: 0,
                create_failures: VecDeque::new(),
                list_failures: VecDeque::new(),
            })),
            list_gate: Arc::new(list_gate),
        }
    }

    /// Set the listing order
    #[must_use]
    pub fn with_order(self, order: ListOrder) -> Self {
        self.lock().order = order;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of `create_item` calls so far, failed ones included
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    /// Number of `list_items` calls so far, failed ones included
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Total number of calls of either kind
    #[must_use]
    pub fn total_calls(&self) -> usize {
        let inner = self.lock();
        inner.create_calls + inner.list_calls
    }

    /// Make the next `create_item` call fail with `error`
    ///
    /// Queued failures are consumed one per call.
    pub fn fail_next_create(&self, error: ServiceError) {
        self.lock().create_failures.push_back(error);
    }

    /// Make the next `list_items` call fail with `error`
    pub fn fail_next_list(&self, error: ServiceError) {
        self.lock().list_failures.push_back(error);
    }

    /// Remote items in storage (creation) order
    #[must_use]
    pub fn items(&self) -> Vec<TodoItem> {
        self.lock().items.clone()
    }

    /// Replace the remote collection, as if another client had written it
    ///
    /// Items are stored as given, duplicates included, so tests can feed the
    /// client a listing that breaks the id-uniqueness contract.
    pub fn set_items(&self, items: Vec<TodoItem>) {
        let mut inner = self.lock();
        inner.next_id = match (inner.next_id, id_after(&items)) {
            (Some(current), Some(after)) => Some(current.max(after)),
            _ => None,
        };
        inner.items = items;
    }

    /// Set `completed` on a remote item, as if another client had persisted it
    ///
    /// Returns `false` if no item has the id.
    pub fn set_completed(&self, id: TodoId, completed: bool) -> bool {
        let mut inner = self.lock();
        match inner.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.completed = completed;
                true
            },
            None => false,
        }
    }

    /// Hold every `list_items` call until [`Self::release_lists`]
    ///
    /// A held call has already counted itself and captured the collection; it
    /// answers with that capture once released.
    pub fn hold_lists(&self) {
        self.list_gate.send_replace(true);
    }

    /// Let held and future `list_items` calls complete
    pub fn release_lists(&self) {
        self.list_gate.send_replace(false);
    }

    /// Wait until at least `count` listings have been requested
    pub async fn wait_for_list_calls(&self, count: usize) {
        while self.list_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    fn listing(inner: &Inner) -> Vec<TodoItem> {
        let mut items = inner.items.clone();
        if inner.order == ListOrder::NewestFirst {
            items.sort_by(|a, b| b.id.cmp(&a.id));
        }
        items
    }
}

/// First id above every id in `items`, if one exists
fn id_after(items: &[TodoItem]) -> Option<i64> {
    items
        .iter()
        .map(|item| item.id.get())
        .max()
        .unwrap_or(0)
        .checked_add(1)
}

impl Default for InMemoryTodoService {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoService for InMemoryTodoService {
    fn list_items(&self) -> ServiceFuture<'_, Vec<TodoItem>> {
        let mut gate = self.list_gate.subscribe();

        Box::pin(async move {
            let reply = {
                let mut inner = self.lock();
                inner.list_calls += 1;
                match inner.list_failures.pop_front() {
                    Some(error) => Err(error),
                    None => Ok(Self::listing(&inner)),
                }
            };

            loop {
                let held = *gate.borrow_and_update();
                if !held || gate.changed().await.is_err() {
                    break;
                }
            }

            tracing::trace!(ok = reply.is_ok(), "in-memory list_items answered");
            reply
        })
    }

    fn create_item(&self, payload: NewItemPayload) -> ServiceFuture<'_, TodoItem> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.create_calls += 1;

            if let Some(error) = inner.create_failures.pop_front() {
                return Err(error);
            }

            let Some(id) = inner.next_id else {
                return Err(ServiceError::Rejected("no todo ids left".to_string()));
            };
            let item = TodoItem::new(TodoId::new(id), payload.text);
            inner.next_id = id.checked_add(1);
            inner.items.push(item.clone());

            tracing::trace!(id = %item.id, "in-memory create_item stored item");
            Ok(item)
        })
    }
}
