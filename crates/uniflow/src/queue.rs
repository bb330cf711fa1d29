//! StoreQueue - serial scheduler for async action creators
//!
//! Items run strictly one at a time in enqueue order: an item's creator is
//! only invoked after the previous item's operation has completed, so it sees
//! the state that operation left behind. Items from different queues on the
//! same store run independently of each other.
//!
//! ```text
//! enqueue(c1) ─┐
//! enqueue(c2) ─┼─► [ pending ] ─► running ─► outcome ─► next item ... ─► drained: handlers
//! enqueue(c3) ─┘
//! ```
//!
//! All bookkeeping lives on the store's serial context; the operations
//! themselves run on the store's async runtime.

use crate::action_creator::AsyncActionCreator;
use crate::completion::{Completer, Completion, InFlightGuard, Outcome};
use crate::dispatcher::{Dispatch, GetState};
use crate::error::OpError;
use crate::store::{Core, Store};
use std::collections::VecDeque;

pub(crate) type QueueId = u64;

type DrainHandler = Box<dyn FnOnce() + Send>;

struct QueueItem<S, A> {
    creator: AsyncActionCreator<S, A>,
    dispatch: Dispatch<A>,
    get_state: GetState<S>,
    completer: Completer,
    /// Keeps the store running until the item has finished
    work: InFlightGuard,
}

/// Per-queue bookkeeping, owned by the serial context
pub(crate) struct QueueState<S, A> {
    pending: VecDeque<QueueItem<S, A>>,
    running: Option<u64>,
    next_item: u64,
    drain_handlers: Vec<DrainHandler>,
    /// The `StoreQueue` handle is gone; forget the queue once it is idle
    released: bool,
}

impl<S, A> QueueState<S, A> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            running: None,
            next_item: 0,
            drain_handlers: Vec::new(),
            released: false,
        }
    }

    fn is_idle(&self) -> bool {
        self.running.is_none() && self.pending.is_empty()
    }
}

impl<S, A> Core<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn enqueue_item(
        &self,
        queue: QueueId,
        creator: AsyncActionCreator<S, A>,
        completer: Completer,
        work: InFlightGuard,
    ) {
        let (dispatch, get_state) = self.handles();
        let item = QueueItem {
            creator,
            dispatch,
            get_state,
            completer,
            work,
        };

        let was_idle = {
            let mut queues = self.queues.borrow_mut();
            let state = queues.entry(queue).or_insert_with(QueueState::new);
            let was_idle = state.is_idle();
            state.pending.push_back(item);
            was_idle
        };

        if was_idle {
            self.run_to_idle(queue);
        }
    }

    /// Start the next pending item, or notify drain handlers if there is none
    fn run_to_idle(&self, queue: QueueId) {
        let next = {
            let mut queues = self.queues.borrow_mut();
            let Some(state) = queues.get_mut(&queue) else {
                return;
            };
            if state.running.is_some() {
                return;
            }
            state.pending.pop_front().map(|item| {
                let item_id = state.next_item;
                state.next_item += 1;
                state.running = Some(item_id);
                (item_id, item)
            })
        };

        match next {
            Some((item_id, item)) => self.start_item(queue, item_id, item),
            None => self.drained(queue),
        }
    }

    fn start_item(&self, queue: QueueId, item_id: u64, item: QueueItem<S, A>) {
        log::debug!("Queue {} starting item {}", queue, item_id);

        // The creator may re-enter the store, including this queue
        let op = item.creator.start(item.dispatch, item.get_state);

        let context = self.context.clone();
        let completer = item.completer;
        let work = item.work;
        self.runtime.spawn(async move {
            let outcome = op.await.map_err(OpError::from);
            let delivered = context.schedule(move |core: &Core<S, A>| {
                core.finish_item(queue, item_id, outcome, completer, work)
            });
            if !delivered {
                log::debug!("Queue {} item {} finished after store shutdown", queue, item_id);
            }
        });
    }

    fn finish_item(&self, queue: QueueId, item_id: u64, outcome: Outcome, completer: Completer, work: InFlightGuard) {
        {
            let mut queues = self.queues.borrow_mut();
            let running = queues.get_mut(&queue).and_then(|state| state.running.take());
            assert_eq!(
                running,
                Some(item_id),
                "queue {} finished item {} which was not running",
                queue,
                item_id
            );
        }

        match &outcome {
            Ok(()) => log::debug!("Queue {} item {} finished", queue, item_id),
            Err(e) => log::warn!("Queue {} item {}: {}", queue, item_id, e),
        }
        completer.complete(outcome);

        self.run_to_idle(queue);
        drop(work);
    }

    /// The queue ran out of work: run the handlers registered so far
    fn drained(&self, queue: QueueId) {
        let handlers = {
            let mut queues = self.queues.borrow_mut();
            match queues.get_mut(&queue) {
                Some(state) => std::mem::take(&mut state.drain_handlers),
                None => return,
            }
        };

        if !handlers.is_empty() {
            log::debug!("Queue {} drained, notifying {} handler(s)", queue, handlers.len());
        }
        // Handlers registered while these run belong to the next drain
        for handler in handlers {
            handler();
        }

        let mut queues = self.queues.borrow_mut();
        if queues.get(&queue).is_some_and(|state| state.released && state.is_idle()) {
            queues.remove(&queue);
            log::debug!("Queue {} released", queue);
        }
    }

    fn add_drain_handler(&self, queue: QueueId, handler: DrainHandler) {
        let deferred = {
            let mut queues = self.queues.borrow_mut();
            match queues.get_mut(&queue) {
                Some(state) if !state.is_idle() => {
                    state.drain_handlers.push(handler);
                    None
                }
                _ => Some(handler),
            }
        };

        if let Some(handler) = deferred {
            handler();
        }
    }

    fn queue_is_idle(&self, queue: QueueId) -> bool {
        self.queues
            .borrow()
            .get(&queue)
            .is_none_or(|state| state.is_idle())
    }

    fn release_queue(&self, queue: QueueId) {
        let mut queues = self.queues.borrow_mut();
        let Some(state) = queues.get_mut(&queue) else {
            return;
        };
        if state.is_idle() {
            queues.remove(&queue);
        } else {
            // Pending items still run; the last drain removes the queue
            state.released = true;
        }
    }
}

/// Serial queue of async action creators bound to one store
///
/// The queue keeps its store alive. Dropping the queue does not cancel
/// anything: already enqueued items still run in order, even if every
/// store handle is dropped too.
pub struct StoreQueue<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    store: Store<S, A>,
    id: QueueId,
}

impl<S, A> StoreQueue<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn new(store: &Store<S, A>) -> Self {
        Self {
            store: store.clone(),
            id: store.allocate_queue_id(),
        }
    }

    /// Append a creator; it starts right away if the queue is idle
    ///
    /// The returned handle resolves once the item's operation has completed.
    /// Items run whether or not the handle is awaited.
    pub fn enqueue(&self, creator: &AsyncActionCreator<S, A>) -> Completion {
        let (completer, completion) = Completion::pending();
        let creator = creator.clone();
        let work = self.store.track_work();
        let id = self.id;

        let accepted = self
            .store
            .context()
            .execute(move |core| core.enqueue_item(id, creator, completer, work));
        if !accepted {
            log::error!("Enqueue on a store whose serial context has terminated");
        }
        completion
    }

    /// Run `handler` the next time the queue becomes idle
    ///
    /// If the queue is idle right now, the handler runs before this returns.
    /// Each handler runs exactly once.
    pub fn add_completion(&self, handler: impl FnOnce() + Send + 'static) {
        let id = self.id;
        let registered = self
            .store
            .context()
            .run_sync(move |core| core.add_drain_handler(id, Box::new(handler)));
        if let Err(e) = registered {
            log::error!("Completion handler not registered: {}", e);
        }
    }

    /// No item running and none pending
    ///
    /// A queue whose store has terminated reports empty: nothing will run on it again.
    pub fn is_empty(&self) -> bool {
        let id = self.id;
        self.store
            .context()
            .run_sync(move |core| core.queue_is_idle(id))
            .unwrap_or(true)
    }
}

impl<S, A> Drop for StoreQueue<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn drop(&mut self) {
        let id = self.id;
        self.store.context().execute(move |core| core.release_queue(id));
    }
}
