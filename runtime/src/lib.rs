//! # Todo Sync Runtime
//!
//! Runtime for the todo sync client.
//!
//! This crate provides the Store that owns the client's collection state,
//! runs the reducer and executes the effects it returns.
//!
//! ## Core Components
//!
//! - **Store**: Owns state behind an async `RwLock` and serializes reducer calls
//! - **Effect Executor**: Spawns effect futures and feeds produced actions back
//! - **Waiters**: Hand each caller the action that ends its flow
//! - **Action Broadcast**: Publishes effect actions to observers
//!
//! ## Example
//!
//! ```ignore
//! use todo_sync_runtime::Store;
//!
//! let store = Store::new(TodoState::new(), TodoReducer::new(), environment);
//!
//! // Send an action
//! store.send(TodoAction::Refresh { request, reason }).await?;
//!
//! // Read state
//! let count = store.state(|s| s.count()).await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use todo_sync_core::{effect::Effect, reducer::Reducer};
use tokio::sync::{watch, RwLock};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when a timeout was given and it
        /// expired before a matching action arrived.
        #[error("Timeout waiting for action")]
        Timeout,

        /// The store dropped a waiter before its action arrived
        #[error("Action channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Default number of actions buffered for observers
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Handle for waiting on the effects started by one `send()`
///
/// Only tracks effects returned directly for that action. Effects started by
/// actions that those effects feed back are not included; flows that span
/// several round trips should wait on their terminal action instead
/// (see [`Store::send_and_wait_for`]).
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, so the counter can no longer move
                break;
            }
        }
    }

    /// Wait for all tracked effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: counter shared between a handle and the effects it tracks
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counters on drop
///
/// Keeps the counters right even if an effect future panics.
struct DecrementGuard {
    tracking: EffectTracking,
    pending: Arc<AtomicUsize>,
}

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.tracking.decrement();
    }
}

/// Internal: a caller of `send_and_wait_for` waiting for its action
struct Waiter<A> {
    predicate: Box<dyn Fn(&A) -> bool + Send>,
    reply: tokio::sync::oneshot::Sender<A>,
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, DecrementGuard, Duration, Effect, EffectHandle,
        EffectTracking, Mutex, Ordering, PoisonError, Reducer, RwLock, StoreError, Waiter,
        DEFAULT_BROADCAST_CAPACITY,
    };
    use tokio::sync::{broadcast, oneshot};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (state transitions)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. Waiters for the action that ends a flow
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Callers of `send_and_wait_for` still waiting for their action.
        waiters: Arc<Mutex<Vec<Waiter<A>>>>,
        /// Actions produced by effects, published after they have been reduced.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Clone + Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Observers get a broadcast buffer of [`DEFAULT_BROADCAST_CAPACITY`] actions.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(
                initial_state,
                reducer,
                environment,
                DEFAULT_BROADCAST_CAPACITY,
            )
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// Increase the capacity if observers frequently lag. The capacity
        /// only bounds [`Store::subscribe_actions`]; callers of
        /// [`Store::send_and_wait_for`] never miss their action.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                waiters: Arc::new(Mutex::new(Vec::new())),
                action_broadcast,
            }
        }

        /// Number of effects currently running across all sends
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, then waits for running effects to finish.
        /// Actions those effects produce are still reduced, so flows that
        /// were already running complete normally.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Spawns the returned effects
        ///
        /// Returns once the reducer has run, not when the effects finish.
        /// Concurrent sends serialize at the reducer.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            Ok(self.apply(action).await)
        }

        /// Reduce an action and spawn its effects, ignoring the shutdown flag
        async fn apply(&self, action: A) -> EffectHandle {
            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }

            handle
        }

        /// Send an action and wait for a matching result action
        ///
        /// The waiter is registered before sending and is handed the first
        /// matching action directly, so the result cannot be missed however
        /// many flows run at once. Only actions produced by effects are
        /// matched, and each one after the reducer has applied it.
        ///
        /// `timeout` of `None` waits for as long as the flow takes.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: The store dropped the waiter
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Option<Duration>,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool + Send + 'static,
        {
            let (reply, rx) = oneshot::channel();
            self.lock_waiters().push(Waiter {
                predicate: Box::new(predicate),
                reply,
            });

            // A rejected send drops `rx`; the waiter is pruned on the next completion
            self.send(action).await?;

            let outcome = match timeout {
                Some(limit) => tokio::time::timeout(limit, rx)
                    .await
                    .map_err(|_| StoreError::Timeout)?,
                None => rx.await,
            };
            outcome.map_err(|_| StoreError::ChannelClosed)
        }

        /// Number of callers still waiting in `send_and_wait_for`
        #[must_use]
        pub fn waiting(&self) -> usize {
            self.lock_waiters()
                .iter()
                .filter(|waiter| !waiter.reply.is_closed())
                .count()
        }

        fn lock_waiters(&self) -> std::sync::MutexGuard<'_, Vec<Waiter<A>>> {
            self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Hand `action` to every waiter it matches and prune abandoned ones
        fn complete_waiters(&self, action: &A) {
            let mut waiters = self.lock_waiters();
            let mut index = 0;
            while index < waiters.len() {
                let waiter = &waiters[index];
                if waiter.reply.is_closed() {
                    waiters.swap_remove(index);
                } else if (waiter.predicate)(action) {
                    let waiter = waiters.swap_remove(index);
                    let _ = waiter.reply.send(action.clone());
                } else {
                    index += 1;
                }
            }
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s.count()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Execute one effect
        ///
        /// Effect futures run on spawned tasks. A produced action is reduced
        /// first, even during shutdown, and only then handed to waiters and
        /// broadcast, so whoever receives it sees its result in state.
        /// Effects spawned by that action are counted before this one
        /// finishes, which keeps shutdown waiting for the whole chain.
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();
                    self.pending_effects.fetch_add(1, Ordering::SeqCst);

                    let guard = DecrementGuard {
                        tracking,
                        pending: Arc::clone(&self.pending_effects),
                    };
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect produced an action, sending to store");
                            metrics::counter!("store.feedback.total").increment(1);
                            let _ = store.apply(action.clone()).await;
                            store.complete_waiters(&action);
                            let _ = store.action_broadcast.send(action);
                        } else {
                            tracing::trace!("Effect completed with no action");
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                waiters: Arc::clone(&self.waiters),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use todo_sync_core::{smallvec, SmallVec};

    // A miniature sync loop: `Fetch` asks a fake remote for a value,
    // `Fetched` stores it.
    #[derive(Debug, Clone, Default)]
    struct TestState {
        value: u32,
        fetches: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        SetLocal(u32),
        Fetch { delay_ms: u64 },
        Fetched(u32),
        Echo(u32),
        Echoed(u32),
        Ignore,
        Panic,
    }

    #[derive(Debug, Clone)]
    struct TestEnv {
        remote_value: u32,
    }

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::SetLocal(value) => {
                    state.value = value;
                    smallvec![Effect::None]
                },
                TestAction::Fetch { delay_ms } => {
                    state.fetches += 1;
                    let remote = env.remote_value;
                    smallvec![Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        Some(TestAction::Fetched(remote))
                    })]
                },
                TestAction::Fetched(value) => {
                    state.value = value;
                    SmallVec::new()
                },
                TestAction::Echo(tag) => smallvec![Effect::future(async move {
                    tokio::task::yield_now().await;
                    Some(TestAction::Echoed(tag))
                })],
                TestAction::Echoed(_) => SmallVec::new(),
                TestAction::Ignore => smallvec![Effect::future(async { None })],
                TestAction::Panic => {
                    #[allow(clippy::panic)] // Intentional panic for testing error handling
                    {
                        smallvec![Effect::future(async {
                            panic!("Intentional panic in effect for testing");
                        })]
                    }
                },
            }
        }
    }

    fn store(remote_value: u32) -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState::default(), TestReducer, TestEnv { remote_value })
    }

    #[tokio::test]
    async fn test_send_applies_synchronously() {
        let store = store(0);
        let _ = store.send(TestAction::SetLocal(5)).await;
        assert_eq!(store.state(|s| s.value).await, 5);
    }

    #[tokio::test]
    async fn test_effect_feedback() {
        let store = store(42);
        let mut handle = store.send(TestAction::Fetch { delay_ms: 0 }).await.unwrap();
        handle.wait().await;

        // The feedback action is reduced before the effect task finishes
        assert_eq!(store.state(|s| s.value).await, 42);
        assert_eq!(store.pending_effects(), 0);
    }

    #[tokio::test]
    async fn test_send_and_wait_for_sees_reduced_state() {
        let store = store(7);

        let result = store
            .send_and_wait_for(
                TestAction::Fetch { delay_ms: 5 },
                |a| matches!(a, TestAction::Fetched(_)),
                None,
            )
            .await
            .unwrap();

        assert_eq!(result, TestAction::Fetched(7));
        assert_eq!(store.state(|s| s.value).await, 7);
    }

    #[tokio::test]
    async fn test_send_and_wait_for_timeout() {
        let store = store(1);

        let result = store
            .send_and_wait_for(
                TestAction::Ignore,
                |a| matches!(a, TestAction::Fetched(_)),
                Some(Duration::from_millis(20)),
            )
            .await;

        assert_eq!(result, Err(StoreError::Timeout));
    }

    #[tokio::test]
    async fn test_local_write_overwritten_by_later_fetch() {
        let store = store(9);
        let mut handle = store.send(TestAction::Fetch { delay_ms: 20 }).await.unwrap();

        // Local write lands while the fetch is in flight
        let _ = store.send(TestAction::SetLocal(1)).await;
        assert_eq!(store.state(|s| s.value).await, 1);

        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 9);
    }

    #[tokio::test]
    async fn test_subscribe_actions_only_sees_effect_actions() {
        let store = store(3);
        let mut rx = store.subscribe_actions();

        let _ = store.send(TestAction::SetLocal(1)).await;
        let mut handle = store.send(TestAction::Fetch { delay_ms: 0 }).await.unwrap();
        handle.wait().await;

        assert_eq!(rx.recv().await.unwrap(), TestAction::Fetched(3));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_sends_serialize() {
        let store = store(0);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store.send(TestAction::Fetch { delay_ms: 0 }).await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.state(|s| s.fetches).await, 10);
    }

    #[tokio::test]
    async fn test_effect_panic_isolation() {
        let store = store(4);

        let mut handle = store.send(TestAction::Panic).await.unwrap();
        handle.wait().await;
        assert_eq!(store.pending_effects(), 0);

        // Store keeps working after a panicking effect
        let mut handle = store.send(TestAction::Fetch { delay_ms: 0 }).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 4);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() {
        let store = store(0);
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(TestAction::SetLocal(1)).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_effects() {
        let store = store(8);
        let _ = store.send(TestAction::Fetch { delay_ms: 20 }).await;

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.pending_effects(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_timeout() {
        let store = store(8);
        let _ = store.send(TestAction::Fetch { delay_ms: 500 }).await;

        let result = store.shutdown(Duration::from_millis(20)).await;
        assert_eq!(result, Err(StoreError::ShutdownTimeout(1)));
    }

    #[tokio::test]
    async fn test_shutdown_still_reduces_effect_feedback() {
        let store = store(8);
        let _ = store.send(TestAction::Fetch { delay_ms: 20 }).await;

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 8);
    }

    #[tokio::test]
    async fn test_waiter_completes_when_shutdown_starts_mid_flow() {
        let store = store(6);
        let waiting = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .send_and_wait_for(
                        TestAction::Fetch { delay_ms: 30 },
                        |a| matches!(a, TestAction::Fetched(_)),
                        Some(Duration::from_secs(1)),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(waiting.await.unwrap(), Ok(TestAction::Fetched(6)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_outnumbering_broadcast_capacity_all_complete() {
        let store = Store::with_broadcast_capacity(
            TestState::default(),
            TestReducer,
            TestEnv { remote_value: 0 },
            1,
        );

        let flows: Vec<_> = (0..200_u32)
            .map(|tag| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .send_and_wait_for(
                            TestAction::Echo(tag),
                            move |a| *a == TestAction::Echoed(tag),
                            Some(Duration::from_secs(5)),
                        )
                        .await
                })
            })
            .collect();

        for (tag, flow) in (0..200_u32).zip(flows) {
            assert_eq!(flow.await.unwrap(), Ok(TestAction::Echoed(tag)));
        }
        assert_eq!(store.waiting(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_waiter_is_pruned() {
        let store = store(1);

        let result = store
            .send_and_wait_for(
                TestAction::Ignore,
                |a| matches!(a, TestAction::Fetched(_)),
                Some(Duration::from_millis(10)),
            )
            .await;
        assert_eq!(result, Err(StoreError::Timeout));
        assert_eq!(store.waiting(), 0);

        // A later flow is unaffected by the abandoned waiter
        let echoed = store
            .send_and_wait_for(TestAction::Echo(1), |a| *a == TestAction::Echoed(1), None)
            .await;
        assert_eq!(echoed, Ok(TestAction::Echoed(1)));
    }

    #[test]
    fn test_completed_handle() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        tokio_test::block_on(handle.wait());
    }
}
