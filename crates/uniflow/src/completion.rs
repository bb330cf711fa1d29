//! Shared, hot handle to the outcome of an async operation
//!
//! The operation behind a `Completion` is started by whoever created the
//! handle, independent of anyone awaiting it. The single outcome is cached
//! and replayed to every clone, including clones that start awaiting after
//! the operation has finished. Awaiting never re-runs the operation.

use crate::action_creator::AsyncOp;
use crate::error::OpError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};

/// Terminal outcome of an async operation
pub type Outcome = Result<(), OpError>;

#[derive(Clone)]
pub struct Completion {
    outcome: Shared<BoxFuture<'static, Outcome>>,
}

/// Write side of a pending `Completion`; resolving it consumes it
pub(crate) struct Completer {
    tx: oneshot::Sender<Outcome>,
}

impl Completer {
    pub(crate) fn complete(self, outcome: Outcome) {
        // Every handle may already be gone; the outcome is simply unobserved then
        let _ = self.tx.send(outcome);
    }
}

impl Completion {
    /// A handle resolved later through the returned `Completer`
    ///
    /// Dropping the completer unresolved yields `OpError::Dropped`.
    pub(crate) fn pending() -> (Completer, Completion) {
        let (tx, rx) = oneshot::channel();
        let outcome = async move { rx.await.unwrap_or(Err(OpError::Dropped)) }
            .boxed()
            .shared();
        (Completer { tx }, Completion { outcome })
    }

    /// Start `op` on `runtime` right away and return a handle to its outcome
    ///
    /// `work` is released only once the outcome has been recorded.
    pub(crate) fn spawn(runtime: &Handle, op: AsyncOp, work: InFlightGuard) -> Completion {
        let (completer, completion) = Completion::pending();
        runtime.spawn(async move {
            let outcome = op.await.map_err(OpError::from);
            if let Err(e) = &outcome {
                log::warn!("{}", e);
            }
            completer.complete(outcome);
            drop(work);
        });
        completion
    }

    /// An already finished handle
    pub fn ready(outcome: Outcome) -> Self {
        Completion {
            outcome: futures::future::ready(outcome).boxed().shared(),
        }
    }

    /// The outcome, if the operation has finished
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.outcome.clone().now_or_never()
    }

    pub fn is_finished(&self) -> bool {
        self.try_outcome().is_some()
    }

    /// Block the calling thread until the outcome is available
    ///
    /// Must not be called from the store's serial context: the outcome of a
    /// queued item is recorded there, so waiting on it would never finish.
    pub fn wait_blocking(&self) -> Outcome {
        futures::executor::block_on(self.outcome.clone())
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        self.outcome.poll_unpin(cx)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.try_outcome())
            .finish()
    }
}

/// Count of async operations a store has started and not yet seen finish
///
/// A store whose last handle is dropped keeps its runtime and serial context
/// alive until this drops to zero.
#[derive(Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn track(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: self.clone(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resolves once nothing is in flight
    pub(crate) async fn wait_idle(&self) {
        loop {
            // Registered before the check so a release in between is not missed
            let idle = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// One tracked operation; releases its slot when dropped
pub(crate) struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
