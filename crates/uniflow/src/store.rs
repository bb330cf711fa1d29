//! Store - the single source of truth
//!
//! ```text
//! caller ─► [ActionCreator] ─► dispatch ─► middleware chain ─► reducer ─► state ─► StateStream
//!                                   ▲            │
//!                                   └─ dispatch ─┘ (middleware re-entering the pipeline)
//! ```
//!
//! All state lives on the store's serial context (see `executor`). Callers on
//! other threads either schedule work onto it (`dispatch`) or block until a
//! read there completes (`state`).
//!
//! # Example
//!
//! ```
//! use uniflow::{Reducer, Store};
//!
//! enum Action {
//!     Push(&'static str),
//! }
//!
//! let reducer = Reducer::new(|state: &mut Vec<&'static str>, action: &Action| match action {
//!     Action::Push(item) => state.push(item),
//! });
//!
//! let store = Store::new(reducer, Vec::new(), None)?;
//! store.dispatch(Action::Push("a"));
//! store.dispatch(Action::Push("b"));
//! assert_eq!(store.state(), vec!["a", "b"]);
//! # Ok::<(), uniflow::StoreError>(())
//! ```

use crate::action_creator::{ActionCreator, AsyncActionCreator};
use crate::completion::{Completion, InFlight, InFlightGuard};
use crate::config::StoreConfig;
use crate::dispatcher::{Dispatch, GetState};
use crate::error::{OpError, StoreError};
use crate::executor::SerialContext;
use crate::middleware::{Interceptor, Middleware, Teardown};
use crate::queue::{QueueId, QueueState};
use crate::reducer::Reducer;
use crate::state_stream::{StatePublisher, StateStream};
use std::cell::{OnceCell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tokio::runtime::{Handle, Runtime};

/// Everything the serial context owns for one store
pub(crate) struct Core<S, A> {
    pub(crate) context: SerialContext<Core<S, A>>,
    pub(crate) runtime: Handle,
    state: RefCell<S>,
    reducer: Reducer<S, A>,
    /// Write-once: set when the middleware chain has been built
    pipeline: OnceCell<Interceptor<A>>,
    /// Actions dispatched by middleware factories before the pipeline existed
    pre_init: RefCell<VecDeque<A>>,
    publisher: StatePublisher<S>,
    pub(crate) queues: RefCell<HashMap<QueueId, QueueState<S, A>>>,
    teardown: Teardown,
}

impl<S, A> Core<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn new(context: SerialContext<Self>, runtime: Handle, reducer: Reducer<S, A>, initial_state: S) -> Self {
        Self {
            context,
            runtime,
            state: RefCell::new(initial_state),
            reducer,
            pipeline: OnceCell::new(),
            pre_init: RefCell::new(VecDeque::new()),
            publisher: StatePublisher::new(),
            queues: RefCell::new(HashMap::new()),
            teardown: Teardown::new(),
        }
    }

    /// Current state
    ///
    /// Panics if called while the reducer is mutating the state, i.e. from
    /// inside a reducer.
    pub(crate) fn snapshot(&self) -> S {
        match self.state.try_borrow() {
            Ok(state) => state.clone(),
            Err(_) => panic!("state read from inside the reducer"),
        }
    }

    /// Dispatch/getState pair for an action creator, bound to this store
    pub(crate) fn handles(&self) -> (Dispatch<A>, GetState<S>) {
        (
            scheduled_dispatch(&self.context),
            state_reader(&self.context, self.snapshot()),
        )
    }

    /// Build the pipeline once, then flush whatever was dispatched while building it
    fn install_pipeline(&self, middleware: Option<Middleware<S, A>>, dispatch: Dispatch<A>, get_state: GetState<S>) {
        let pipeline: Interceptor<A> = match middleware {
            Some(middleware) => middleware.instantiate(dispatch, get_state, &self.teardown),
            None => Box::new(|action: A, next: &dyn Fn(A)| next(action)),
        };
        if self.pipeline.set(pipeline).is_err() {
            panic!("dispatch pipeline installed twice");
        }
        if !self.teardown.is_empty() {
            log::debug!("Middleware parked {} resource(s) until the store is released", self.teardown.len());
        }

        let buffered = self.pre_init.borrow().len();
        if buffered > 0 {
            log::debug!("Flushing {} action(s) dispatched during store construction", buffered);
        }
        loop {
            let next = self.pre_init.borrow_mut().pop_front();
            match next {
                Some(action) => self.dispatch_through_pipeline(action),
                None => break,
            }
        }
        log::debug!("Dispatch pipeline wired");
    }

    /// Run one action through the middleware chain into the reducer
    pub(crate) fn dispatch_through_pipeline(&self, action: A) {
        match self.pipeline.get() {
            Some(pipeline) => pipeline(action, &|action| self.apply(action)),
            None => self.pre_init.borrow_mut().push_back(action),
        }
    }

    /// Terminal stage: reduce, then publish
    fn apply(&self, action: A) {
        {
            let mut state = self.state.borrow_mut();
            self.reducer.reduce(&mut state, &action);
        }
        self.publisher.publish(&self.state.borrow());
    }
}

/// Dispatch that schedules onto the serial context, never running inline
pub(crate) fn scheduled_dispatch<S, A>(context: &SerialContext<Core<S, A>>) -> Dispatch<A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let context = context.clone();
    Dispatch::new(move |action: A| {
        if !context.schedule(move |core| core.dispatch_through_pipeline(action)) {
            log::debug!("Dropping action dispatched after store shutdown");
        }
    })
}

/// Dispatch handed to middleware: re-enters the pipeline inline when already on
/// the serial context (recursive dispatch), schedules otherwise
fn pipeline_dispatch<S, A>(context: &SerialContext<Core<S, A>>) -> Dispatch<A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let context = context.clone();
    Dispatch::new(move |action: A| {
        if !context.execute(move |core| core.dispatch_through_pipeline(action)) {
            log::debug!("Dropping action dispatched after store shutdown");
        }
    })
}

/// Blocking reader; falls back to `snapshot` once the store is gone
pub(crate) fn state_reader<S, A>(context: &SerialContext<Core<S, A>>, snapshot: S) -> GetState<S>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let context = context.clone();
    GetState::new(move || {
        context
            .run_sync(|core| core.snapshot())
            .unwrap_or_else(|_| snapshot.clone())
    })
}

/// Stops the serial context and the async runtime when dropped
struct Shutdown<C> {
    context: SerialContext<C>,
    runtime: Option<Runtime>,
    serial_thread: Option<JoinHandle<()>>,
}

impl<C> Drop for Shutdown<C> {
    fn drop(&mut self) {
        self.context.shutdown();

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }

        if let Some(handle) = self.serial_thread.take() {
            // Dropped from a task on the serial thread: it stops once that task returns
            if self.context.is_current() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Serial context terminated with a panic");
            }
        }
    }
}

struct StoreInner<S: 'static, A: 'static> {
    context: SerialContext<Core<S, A>>,
    runtime_handle: Handle,
    in_flight: Arc<InFlight>,
    next_queue_id: AtomicU64,
    shutdown: Option<Shutdown<Core<S, A>>>,
}

impl<S: 'static, A: 'static> Drop for StoreInner<S, A> {
    fn drop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };

        let pending = self.in_flight.count();
        if pending == 0 {
            drop(shutdown);
            return;
        }

        // Async work is never cancelled: let it finish, then stop
        log::debug!("Store released with {} async operation(s) in flight, draining", pending);
        let in_flight = self.in_flight.clone();
        let drained = thread::Builder::new()
            .name("uniflow-drain".to_string())
            .spawn(move || {
                futures::executor::block_on(in_flight.wait_idle());
                drop(shutdown);
            });
        if let Err(e) = drained {
            log::error!("Failed to spawn drain thread, abandoning in-flight operations: {}", e);
        }
    }
}

/// Unidirectional state container
///
/// Cloning is cheap; all clones share one state. The store is destroyed,
/// releasing everything middleware parked on its `Teardown`, when the last
/// clone (including the ones held by queues) is dropped. Async actions and
/// queue items still in flight at that point run to completion first.
pub struct Store<S: 'static, A: 'static> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S: 'static, A: 'static> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Create a store with the default configuration
    pub fn new(
        reducer: Reducer<S, A>,
        initial_state: S,
        middleware: Option<Middleware<S, A>>,
    ) -> Result<Self, StoreError> {
        Self::with_config(StoreConfig::default(), reducer, initial_state, middleware)
    }

    /// Create a store
    ///
    /// Middleware factories run before this returns. Actions they dispatch while
    /// the pipeline is still being built are buffered and applied, in order,
    /// right after it is complete.
    pub fn with_config(
        config: StoreConfig,
        reducer: Reducer<S, A>,
        initial_state: S,
        middleware: Option<Middleware<S, A>>,
    ) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.async_worker_threads.max(1))
            .thread_name(config.async_thread_name.clone())
            .enable_all()
            .build()
            .map_err(StoreError::AsyncRuntime)?;
        let runtime_handle = runtime.handle().clone();

        let fallback = initial_state.clone();
        let core_runtime = runtime_handle.clone();
        let spawned = SerialContext::spawn(config.executor_thread_name.clone(), move |context| {
            Core::new(context, core_runtime, reducer, initial_state)
        });
        let (context, serial_thread) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                // Dropping a runtime inside an async context panics
                runtime.shutdown_background();
                return Err(e);
            }
        };

        let store = Store {
            inner: Arc::new(StoreInner {
                context: context.clone(),
                runtime_handle,
                in_flight: Arc::new(InFlight::default()),
                next_queue_id: AtomicU64::new(0),
                shutdown: Some(Shutdown {
                    context: context.clone(),
                    runtime: Some(runtime),
                    serial_thread: Some(serial_thread),
                }),
            }),
        };

        let dispatch = pipeline_dispatch(&context);
        let get_state = state_reader(&context, fallback);
        context.run_sync(move |core| core.install_pipeline(middleware, dispatch, get_state))?;

        Ok(store)
    }

    pub(crate) fn context(&self) -> &SerialContext<Core<S, A>> {
        &self.inner.context
    }

    pub(crate) fn allocate_queue_id(&self) -> QueueId {
        self.inner.next_queue_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Keep the store running until the returned guard is dropped
    pub(crate) fn track_work(&self) -> InFlightGuard {
        self.inner.in_flight.track()
    }

    /// Current state
    ///
    /// Blocks until every action scheduled before this call has been applied.
    ///
    /// # Panics
    ///
    /// If the serial context has terminated, which only happens when a reducer
    /// or middleware panicked.
    pub fn state(&self) -> S {
        match self.try_state() {
            Ok(state) => state,
            Err(e) => panic!("{}", e),
        }
    }

    /// Current state, or an error if the serial context has terminated
    pub fn try_state(&self) -> Result<S, StoreError> {
        self.inner.context.run_sync(|core| core.snapshot())
    }

    /// Stream of states: the current one first, then every change in order
    pub fn state_stream(&self) -> StateStream<S> {
        self.inner
            .context
            .run_sync(|core| {
                let stream = core.publisher.subscribe(&core.snapshot());
                log::debug!("State subscriber added ({} active)", core.publisher.subscriber_count());
                stream
            })
            .unwrap_or_else(|_| StateStream::closed())
    }

    /// Schedule an action; returns immediately
    ///
    /// Actions are applied in the order they were scheduled, across all threads.
    pub fn dispatch(&self, action: A) {
        if !self
            .inner
            .context
            .schedule(move |core| core.dispatch_through_pipeline(action))
        {
            log::error!("Dispatch on a store whose serial context has terminated");
        }
    }

    /// Run an action creator on the calling thread
    ///
    /// On a store whose serial context has terminated the creator is not run.
    pub fn dispatch_creator(&self, creator: &ActionCreator<S, A>) {
        match self.handles() {
            Ok((dispatch, get_state)) => creator.run(dispatch, get_state),
            Err(e) => log::error!("Action creator not run: {}", e),
        }
    }

    /// Start an async action creator
    ///
    /// The creator is invoked on the calling thread and its operation starts
    /// right away, whether or not anyone awaits the returned handle. Awaiting
    /// the handle any number of times never runs the operation again.
    ///
    /// On a store whose serial context has terminated nothing runs and the
    /// handle resolves to `OpError::Dropped`.
    pub fn dispatch_async(&self, creator: &AsyncActionCreator<S, A>) -> Completion {
        let (dispatch, get_state) = match self.handles() {
            Ok(handles) => handles,
            Err(e) => {
                log::error!("Async action creator not run: {}", e);
                return Completion::ready(Err(OpError::Dropped));
            }
        };
        let work = self.track_work();
        let op = creator.start(dispatch, get_state);
        Completion::spawn(&self.inner.runtime_handle, op, work)
    }

    fn handles(&self) -> Result<(Dispatch<A>, GetState<S>), StoreError> {
        let context = &self.inner.context;
        let snapshot = self.try_state()?;
        Ok((scheduled_dispatch(context), state_reader(context, snapshot)))
    }
}
