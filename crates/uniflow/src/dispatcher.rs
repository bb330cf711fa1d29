//! Handles that let middleware and action creators talk back to the store
//!
//! Both handles are cheap to clone and can be moved to any thread. Where an
//! action ends up (scheduled onto the serial context, or run inline through
//! the pipeline) is decided by whoever created the handle, usually the store.

use std::fmt;
use std::sync::Arc;

/// Sends actions into a store
pub struct Dispatch<A> {
    send: Arc<dyn Fn(A) + Send + Sync>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            send: self.send.clone(),
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}

impl<A: 'static> Dispatch<A> {
    /// Create a dispatcher from a sink function
    pub fn new(send: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            send: Arc::new(send),
        }
    }

    /// Dispatch an action
    pub fn dispatch(&self, action: A) {
        (self.send)(action)
    }

    /// A dispatcher for a smaller action type that injects into this one
    pub fn contramap<B: 'static>(
        &self,
        inject: impl Fn(B) -> A + Send + Sync + 'static,
    ) -> Dispatch<B> {
        let outer = self.clone();
        Dispatch::new(move |action| outer.dispatch(inject(action)))
    }
}

/// Reads the current state of a store
pub struct GetState<S> {
    read: Arc<dyn Fn() -> S + Send + Sync>,
}

impl<S> Clone for GetState<S> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
        }
    }
}

impl<S> fmt::Debug for GetState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetState").finish_non_exhaustive()
    }
}

impl<S: 'static> GetState<S> {
    pub fn new(read: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            read: Arc::new(read),
        }
    }

    /// Current state snapshot
    ///
    /// Blocks until the read completes on the store's serial context.
    pub fn get(&self) -> S {
        (self.read)()
    }

    /// A reader for a part of the state
    pub fn map<T: 'static>(&self, project: impl Fn(S) -> T + Send + Sync + 'static) -> GetState<T> {
        let outer = self.clone();
        GetState::new(move || project(outer.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_dispatcher() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let target = sink.clone();
        let dispatch = Dispatch::new(move |action: u32| target.lock().unwrap().push(action));

        dispatch.dispatch(1);
        dispatch.clone().dispatch(2);

        assert_eq!(*sink.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_contramap_injects() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let target = sink.clone();
        let dispatch = Dispatch::new(move |action: String| target.lock().unwrap().push(action));

        let numbers = dispatch.contramap(|n: u32| format!("#{}", n));
        numbers.dispatch(7);

        assert_eq!(*sink.lock().unwrap(), vec!["#7".to_string()]);
    }

    #[test]
    fn test_get_state_map_projects() {
        let get_state = GetState::new(|| (1, "one"));
        let first = get_state.map(|(n, _)| n);
        assert_eq!(first.get(), 1);
    }
}
