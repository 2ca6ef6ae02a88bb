//! Reducer logic for the todo collection.
//!
//! Commands either change state right away (local updates) or start an effect
//! that talks to the service (refresh, add). Effects report back with events,
//! and events are where remote results land in state.

use crate::types::{FetchReason, RequestId, TodoAction, TodoState};
use std::sync::Arc;
use todo_sync_core::{
    effect::Effect, environment::Clock, find_duplicate_id, reducer::Reducer, smallvec,
    NewItemPayload, ServiceError, SmallVec, TodoItem, TodoService,
};

/// Default maximum length of a new item's text, in characters
pub const DEFAULT_MAX_TEXT_LEN: usize = 100;

/// Environment dependencies for the todo reducer
#[derive(Clone)]
pub struct TodoEnvironment {
    /// Remote collection
    pub service: Arc<dyn TodoService>,
    /// Clock for sync timestamps
    pub clock: Arc<dyn Clock>,
    /// Maximum length of a new item's text
    pub max_text_len: usize,
}

impl TodoEnvironment {
    /// Creates a new `TodoEnvironment`
    #[must_use]
    pub fn new(service: Arc<dyn TodoService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            clock,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }

    /// Overrides the maximum text length
    #[must_use]
    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }
}

impl std::fmt::Debug for TodoEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoEnvironment")
            .field("max_text_len", &self.max_text_len)
            .finish_non_exhaustive()
    }
}

/// Reducer for the todo collection
#[derive(Clone, Debug)]
pub struct TodoReducer;

impl TodoReducer {
    /// Creates a new `TodoReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reserves a fetch sequence number and lists the remote collection
    fn begin_fetch(
        state: &mut TodoState,
        env: &TodoEnvironment,
        request: RequestId,
        reason: FetchReason,
    ) -> Effect<TodoAction> {
        let fetch_seq = state.next_fetch_seq();
        let service = Arc::clone(&env.service);

        tracing::debug!(%request, fetch_seq, ?reason, "Requesting todo listing");

        Effect::future(async move {
            let event = match service.list_items().await {
                Ok(items) => match find_duplicate_id(&items) {
                    Some(duplicate) => TodoAction::RefreshFailed {
                        request,
                        reason,
                        error: ServiceError::DuplicateId(duplicate),
                    },
                    None => TodoAction::SnapshotLoaded {
                        request,
                        fetch_seq,
                        reason,
                        items,
                    },
                },
                Err(error) => TodoAction::RefreshFailed {
                    request,
                    reason,
                    error,
                },
            };
            Some(event)
        })
    }

    /// Creates an item remotely
    fn begin_create(
        env: &TodoEnvironment,
        request: RequestId,
        payload: NewItemPayload,
    ) -> Effect<TodoAction> {
        let service = Arc::clone(&env.service);

        Effect::future(async move {
            let event = match service.create_item(payload).await {
                Ok(item) => TodoAction::ItemCreated { request, item },
                Err(error) => TodoAction::CreateFailed { request, error },
            };
            Some(event)
        })
    }

    /// Applies a listing unless a newer one is already held
    fn apply_snapshot(
        state: &mut TodoState,
        env: &TodoEnvironment,
        request: RequestId,
        fetch_seq: u64,
        items: Vec<TodoItem>,
    ) {
        if state.is_stale_fetch(fetch_seq) {
            tracing::warn!(
                %request,
                fetch_seq,
                applied = state.applied_fetch_seq,
                "Discarding listing older than the one held"
            );
            return;
        }

        let count = items.len();
        match state.replace_snapshot(items, fetch_seq, env.clock.now()) {
            Ok(discarded) => {
                if discarded > 0 {
                    tracing::warn!(
                        %request,
                        discarded,
                        "Refresh replaced local edits the service does not know about"
                    );
                }
                tracing::info!(
                    %request,
                    version = %state.version,
                    count,
                    "Applied todo listing"
                );
            },
            Err(duplicate) => {
                let error = ServiceError::DuplicateId(duplicate);
                tracing::warn!(%request, %error, "Rejected todo listing");
                state.last_error = Some(error.to_string());
            },
        }
    }
}

impl Default for TodoReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for TodoReducer {
    type State = TodoState;
    type Action = TodoAction;
    type Environment = TodoEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TodoAction::Refresh { request, reason } => {
                smallvec![Self::begin_fetch(state, env, request, reason)]
            },

            TodoAction::AddItem { request, payload } => {
                if let Err(error) = payload.validate(env.max_text_len) {
                    tracing::debug!(%request, %error, "Rejected new todo before sending");
                    return smallvec![Effect::dispatch(TodoAction::AddRejected { request, error })];
                }

                tracing::debug!(%request, "Creating todo");
                smallvec![Self::begin_create(env, request, payload)]
            },

            TodoAction::ApplyLocalUpdate {
                request,
                base_version,
                patch,
            } => {
                let event = match state.apply_local_update(base_version, &patch) {
                    Ok(item) => {
                        tracing::debug!(%request, id = %item.id, "Applied local update");
                        TodoAction::LocalUpdateApplied { request, item }
                    },
                    Err(error) => TodoAction::LocalUpdateRejected { request, error },
                };
                smallvec![Effect::dispatch(event)]
            },

            // ========== Events ==========
            TodoAction::ItemCreated { request, item } => {
                tracing::info!(%request, id = %item.id, "Todo created remotely");
                smallvec![Self::begin_fetch(
                    state,
                    env,
                    request,
                    FetchReason::AfterCreate(item)
                )]
            },

            TodoAction::SnapshotLoaded {
                request,
                fetch_seq,
                items,
                ..
            } => {
                Self::apply_snapshot(state, env, request, fetch_seq, items);
                SmallVec::new()
            },

            TodoAction::RefreshFailed {
                request,
                reason,
                error,
            } => {
                tracing::warn!(%request, ?reason, %error, "Todo listing failed");
                state.last_error = Some(error.to_string());
                SmallVec::new()
            },

            TodoAction::CreateFailed { request, error } => {
                tracing::warn!(%request, %error, "Todo creation failed");
                state.last_error = Some(error.to_string());
                SmallVec::new()
            },

            TodoAction::AddRejected { error, .. } => {
                state.last_error = Some(error.to_string());
                SmallVec::new()
            },

            TodoAction::LocalUpdateRejected { request, error } => {
                tracing::debug!(%request, %error, "Local update rejected");
                state.last_error = Some(error.to_string());
                SmallVec::new()
            },

            // Already applied when the command was reduced
            TodoAction::LocalUpdateApplied { .. } => SmallVec::new(),
        }
    }
}
