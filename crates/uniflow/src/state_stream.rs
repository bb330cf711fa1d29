//! Live stream of store states
//!
//! A subscriber first receives the state current at subscription time, then
//! every state produced by a reducer application, in mutation order. Each
//! subscriber has its own unbounded channel so a slow reader never makes the
//! store skip or coalesce states for it.

use futures::Stream;
use std::cell::RefCell;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Stream of states; ends when the store is destroyed
pub struct StateStream<S> {
    rx: mpsc::UnboundedReceiver<S>,
}

impl<S> StateStream<S> {
    /// A stream that has already ended
    pub(crate) fn closed() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { rx }
    }

    /// Next state if one is already buffered
    pub fn try_next(&mut self) -> Option<S> {
        self.rx.try_recv().ok()
    }

    /// Block the calling thread until the next state arrives
    ///
    /// Panics when called from within an async runtime; use the `Stream` impl there.
    pub fn blocking_next(&mut self) -> Option<S> {
        self.rx.blocking_recv()
    }

    /// Drain every state buffered so far
    pub fn drain(&mut self) -> Vec<S> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl<S> Stream for StateStream<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.rx.poll_recv(cx)
    }
}

/// Fan-out side, owned by the store's serial context
pub(crate) struct StatePublisher<S> {
    subscribers: RefCell<Vec<mpsc::UnboundedSender<S>>>,
}

impl<S: Clone> StatePublisher<S> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Register a subscriber, replaying `current` to it first
    pub(crate) fn subscribe(&self, current: &S) -> StateStream<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail, the receiver is right here
        let _ = tx.send(current.clone());
        self.subscribers.borrow_mut().push(tx);
        StateStream { rx }
    }

    /// Send `state` to every live subscriber, forgetting the ones that went away
    pub(crate) fn publish(&self, state: &S) {
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(state.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_replays_current_then_every_change() {
        let publisher = StatePublisher::new();
        publisher.publish(&0); // nobody listening yet

        let mut stream = publisher.subscribe(&1);
        publisher.publish(&2);
        publisher.publish(&3);

        assert_eq!(stream.drain(), vec![1, 2, 3]);
        assert_eq!(stream.try_next(), None);
    }

    #[test]
    fn test_dropped_subscribers_are_forgotten() {
        let publisher = StatePublisher::new();
        let stream = publisher.subscribe(&"a");
        let mut kept = publisher.subscribe(&"a");
        assert_eq!(publisher.subscriber_count(), 2);

        drop(stream);
        publisher.publish(&"b");

        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(kept.drain(), vec!["a", "b"]);
    }

    #[test]
    fn test_stream_ends_with_publisher() {
        let publisher = StatePublisher::new();
        let mut stream = publisher.subscribe(&5);
        drop(publisher);

        assert_eq!(stream.blocking_next(), Some(5));
        assert_eq!(stream.blocking_next(), None);
    }
}
