//! Serial execution context
//!
//! A single dedicated thread drains a FIFO task channel. Every state
//! mutation, every middleware invocation and all queue bookkeeping of a store
//! is funneled through it, so the data it owns needs no lock:
//!
//! - The context value `C` is created *on* the serial thread and never leaves it.
//! - Tasks receive `&C`; interior mutability inside `C` is plain `Cell`/`RefCell`.
//! - A task already running on the serial thread may re-enter the context
//!   synchronously (middleware dispatching from inside the pipeline).
//!
//! ```text
//! any thread ──schedule()──► [ task | task | task ] ──► serial thread ──► &C
//!            ──run_sync()──►          ...          ──► reply channel ──► caller
//! ```

use crate::error::StoreError;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Task<C> = Box<dyn FnOnce(&C) + Send>;

enum Message<C> {
    Run(Task<C>),
    Shutdown,
}

thread_local! {
    /// The context owned by this thread, if it is a serial thread
    static CURRENT: RefCell<Option<Rc<dyn Any>>> = const { RefCell::new(None) };
}

/// Handle to a serial execution context, cheap to clone and usable from any thread
pub(crate) struct SerialContext<C> {
    tx: Sender<Message<C>>,
    thread_id: ThreadId,
}

impl<C> Clone for SerialContext<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            thread_id: self.thread_id,
        }
    }
}

impl<C> SerialContext<C> {
    /// True when called from the serial thread itself
    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Ask the serial thread to stop after the task it is currently running
    ///
    /// Tasks still queued behind the shutdown are dropped without running.
    pub(crate) fn shutdown(&self) {
        if self.tx.send(Message::Shutdown).is_err() {
            log::debug!("Serial context already stopped");
        }
    }
}

impl<C: 'static> SerialContext<C> {
    /// Spawn the serial thread
    ///
    /// `init` runs on the new thread and builds the context value; it receives
    /// a handle to the context so the value can schedule work on itself.
    pub(crate) fn spawn<F>(name: String, init: F) -> Result<(Self, JoinHandle<()>), StoreError>
    where
        F: FnOnce(SerialContext<C>) -> C + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let inner_tx = tx.clone();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let handle = SerialContext {
                    tx: inner_tx,
                    thread_id: thread::current().id(),
                };
                run_loop(rx, init(handle));
            })
            .map_err(StoreError::SpawnSerialContext)?;

        let thread_id = handle.thread().id();
        Ok((SerialContext { tx, thread_id }, handle))
    }

    /// Append a task to the tail of the FIFO
    ///
    /// Never blocks. Returns `false` if the context has terminated.
    pub(crate) fn schedule<F>(&self, task: F) -> bool
    where
        F: FnOnce(&C) + Send + 'static,
    {
        self.tx.send(Message::Run(Box::new(task))).is_ok()
    }

    /// Run the task inline when already on the serial thread, otherwise schedule it
    pub(crate) fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce(&C) + Send + 'static,
    {
        if self.is_current() {
            with_current(task).is_some()
        } else {
            self.schedule(task)
        }
    }

    /// Run the task on the serial context and block until it returns
    ///
    /// Re-entrant: on the serial thread the task runs inline instead of
    /// deadlocking on its own queue.
    pub(crate) fn run_sync<R, F>(&self, task: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&C) -> R + Send + 'static,
    {
        if self.is_current() {
            return with_current(task).ok_or(StoreError::Terminated);
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let scheduled = self.schedule(move |context| {
            // The caller may have given up waiting; nothing to report then
            let _ = reply_tx.send(task(context));
        });
        if !scheduled {
            return Err(StoreError::Terminated);
        }

        reply_rx.recv().map_err(|_| StoreError::Terminated)
    }
}

fn run_loop<C: 'static>(rx: Receiver<Message<C>>, context: C) {
    let context = Rc::new(context);
    CURRENT.with(|current| *current.borrow_mut() = Some(context.clone() as Rc<dyn Any>));

    log::info!("Serial context started");

    while let Ok(message) = rx.recv() {
        match message {
            Message::Run(task) => task(&context),
            Message::Shutdown => break,
        }
    }

    // Detach first: anything running during the context's drop sees a
    // terminated context instead of re-entering a half-dropped one
    CURRENT.with(|current| current.borrow_mut().take());
    drop(context);

    log::info!("Serial context stopped");
}

fn with_current<C: 'static, R>(task: impl FnOnce(&C) -> R) -> Option<R> {
    let context = CURRENT.with(|current| current.borrow().clone())?;
    match context.downcast::<C>() {
        Ok(context) => Some(task(&context)),
        Err(_) => panic!("serial thread is bound to a different context type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Counter {
        log: RefCell<Vec<u32>>,
        depth: Cell<u32>,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn spawn_counter() -> (SerialContext<Counter>, JoinHandle<()>, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let (context, handle) = SerialContext::spawn("test-serial".to_string(), move |_| Counter {
            log: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            dropped: flag,
        })
        .unwrap();
        (context, handle, dropped)
    }

    #[test]
    fn test_tasks_run_in_schedule_order() {
        let (context, handle, _) = spawn_counter();

        for i in 0..100 {
            assert!(context.schedule(move |c: &Counter| c.log.borrow_mut().push(i)));
        }

        let log = context.run_sync(|c: &Counter| c.log.borrow().clone()).unwrap();
        assert_eq!(log, (0..100).collect::<Vec<_>>());

        context.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_run_sync_reenters_inline() {
        let (context, handle, _) = spawn_counter();
        let inner = context.clone();

        let depth = context
            .run_sync(move |c: &Counter| {
                c.depth.set(1);
                assert!(inner.is_current());
                // Would deadlock if it went through the channel
                inner.run_sync(|c: &Counter| c.depth.get() + 1).unwrap()
            })
            .unwrap();
        assert_eq!(depth, 2);

        context.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_execute_runs_inline_on_serial_thread() {
        let (context, handle, _) = spawn_counter();
        let inner = context.clone();

        let log = context
            .run_sync(move |c: &Counter| {
                c.log.borrow_mut().push(1);
                inner.execute(|c: &Counter| c.log.borrow_mut().push(2));
                c.log.borrow_mut().push(3);
                c.log.borrow().clone()
            })
            .unwrap();
        assert_eq!(log, vec![1, 2, 3]);

        context.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_drops_context_and_terminates() {
        let (context, handle, dropped) = spawn_counter();
        assert!(!context.is_current());

        context.shutdown();
        handle.join().unwrap();

        assert!(dropped.load(Ordering::SeqCst));
        assert!(!context.schedule(|_: &Counter| {}));
        assert!(matches!(
            context.run_sync(|c: &Counter| c.depth.get()),
            Err(StoreError::Terminated)
        ));
    }
}
