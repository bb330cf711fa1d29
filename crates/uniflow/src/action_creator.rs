//! Action creators - factories that produce actions with access to dispatch and state
//!
//! - `ActionCreator` runs once per dispatch and may dispatch zero, one or many
//!   actions, right away or later from any thread.
//! - `AsyncActionCreator` additionally returns an `AsyncOp`, the awaitable unit
//!   of work that completes with success or a single error.
//!
//! Async action creators concatenate: `a.then(b)` runs `a` to completion and
//! only then *builds* and runs `b`; a failure of `a` skips `b` entirely.

use crate::compose::{Lens, Monoid, Prism};
use crate::dispatcher::{Dispatch, GetState};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Side-effecting async unit of work without a result value
pub type AsyncOp = BoxFuture<'static, anyhow::Result<()>>;

pub struct ActionCreator<S, A> {
    exec: Arc<dyn Fn(Dispatch<A>, GetState<S>) + Send + Sync>,
}

impl<S, A> Clone for ActionCreator<S, A> {
    fn clone(&self) -> Self {
        Self {
            exec: self.exec.clone(),
        }
    }
}

impl<S: 'static, A: 'static> ActionCreator<S, A> {
    pub fn new(exec: impl Fn(Dispatch<A>, GetState<S>) + Send + Sync + 'static) -> Self {
        Self {
            exec: Arc::new(exec),
        }
    }

    pub fn run(&self, dispatch: Dispatch<A>, get_state: GetState<S>) {
        (self.exec)(dispatch, get_state)
    }

    /// Run against a larger action type; dispatched actions are injected through `prism`
    pub fn lift_action<B: 'static>(self, prism: Prism<B, A>) -> ActionCreator<S, B> {
        ActionCreator::new(move |dispatch: Dispatch<B>, get_state: GetState<S>| {
            self.run(dispatch.contramap(move |action| prism.review(action)), get_state)
        })
    }

    /// Run against a larger state and action type
    pub fn lift<T: 'static, B: 'static>(self, lens: Lens<T, S>, prism: Prism<B, A>) -> ActionCreator<T, B>
    where
        S: Clone,
    {
        ActionCreator::new(move |dispatch: Dispatch<B>, get_state: GetState<T>| {
            self.run(
                dispatch.contramap(move |action| prism.review(action)),
                get_state.map(move |whole| lens.get(&whole).clone()),
            )
        })
    }
}

pub struct AsyncActionCreator<S, A> {
    exec: Arc<dyn Fn(Dispatch<A>, GetState<S>) -> AsyncOp + Send + Sync>,
}

impl<S, A> Clone for AsyncActionCreator<S, A> {
    fn clone(&self) -> Self {
        Self {
            exec: self.exec.clone(),
        }
    }
}

impl<S: 'static, A: 'static> AsyncActionCreator<S, A> {
    pub fn new(exec: impl Fn(Dispatch<A>, GetState<S>) -> AsyncOp + Send + Sync + 'static) -> Self {
        Self {
            exec: Arc::new(exec),
        }
    }

    /// Invoke the creator, producing its (not yet polled) operation
    pub fn start(&self, dispatch: Dispatch<A>, get_state: GetState<S>) -> AsyncOp {
        (self.exec)(dispatch, get_state)
    }

    /// Run `next` after this one succeeds
    ///
    /// `next` is only invoked once this operation has completed, so it sees
    /// the state this one left behind.
    pub fn then(self, next: Self) -> Self {
        AsyncActionCreator::new(move |dispatch: Dispatch<A>, get_state: GetState<S>| {
            let first = self.start(dispatch.clone(), get_state.clone());
            let next = next.clone();
            async move {
                first.await?;
                next.start(dispatch, get_state).await
            }
            .boxed()
        })
    }

    pub fn lift_action<B: 'static>(self, prism: Prism<B, A>) -> AsyncActionCreator<S, B> {
        AsyncActionCreator::new(move |dispatch: Dispatch<B>, get_state: GetState<S>| {
            self.start(dispatch.contramap(move |action| prism.review(action)), get_state)
        })
    }

    pub fn lift<T: 'static, B: 'static>(
        self,
        lens: Lens<T, S>,
        prism: Prism<B, A>,
    ) -> AsyncActionCreator<T, B>
    where
        S: Clone,
    {
        AsyncActionCreator::new(move |dispatch: Dispatch<B>, get_state: GetState<T>| {
            self.start(
                dispatch.contramap(move |action| prism.review(action)),
                get_state.map(move |whole| lens.get(&whole).clone()),
            )
        })
    }
}

impl<S: 'static, A: 'static> Monoid for AsyncActionCreator<S, A> {
    /// Completes immediately without side effects
    fn empty() -> Self {
        AsyncActionCreator::new(|_, _| futures::future::ok(()).boxed())
    }

    fn combine(self, other: Self) -> Self {
        self.then(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn handles(log: &Log) -> (Dispatch<String>, GetState<Vec<String>>) {
        let sink = log.clone();
        let source = log.clone();
        (
            Dispatch::new(move |action| sink.lock().unwrap().push(action)),
            GetState::new(move || source.lock().unwrap().clone()),
        )
    }

    fn push(tag: &'static str) -> AsyncActionCreator<Vec<String>, String> {
        AsyncActionCreator::new(move |dispatch: Dispatch<String>, _: GetState<Vec<String>>| {
            async move {
                dispatch.dispatch(tag.to_string());
                Ok(())
            }
            .boxed()
        })
    }

    fn fail(tag: &'static str) -> AsyncActionCreator<Vec<String>, String> {
        AsyncActionCreator::new(move |_: Dispatch<String>, _: GetState<Vec<String>>| {
            async move { Err(anyhow::anyhow!(tag)) }.boxed()
        })
    }

    /// Run the creator to completion, returning what it dispatched and the error, if any
    fn run(creator: &AsyncActionCreator<Vec<String>, String>) -> (Vec<String>, Option<String>) {
        let log: Log = Arc::default();
        let (dispatch, get_state) = handles(&log);
        let result = futures::executor::block_on(creator.start(dispatch, get_state));
        let dispatched = log.lock().unwrap().clone();
        (dispatched, result.err().map(|e| e.to_string()))
    }

    #[test]
    fn test_then_runs_sequentially() {
        let (dispatched, error) = run(&push("a").then(push("b")));
        assert_eq!(dispatched, vec!["a", "b"]);
        assert_eq!(error, None);
    }

    #[test]
    fn test_then_builds_next_lazily() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let observing = AsyncActionCreator::new(move |dispatch: Dispatch<String>, get_state: GetState<Vec<String>>| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Built after the first op completed, so its dispatch is visible
            let seen = get_state.get().join(",");
            async move {
                dispatch.dispatch(format!("saw[{}]", seen));
                Ok(())
            }
            .boxed()
        });

        let (dispatched, _) = run(&push("a").then(observing.clone()));
        assert_eq!(dispatched, vec!["a", "saw[a]"]);

        let (dispatched, error) = run(&fail("first").then(observing));
        assert!(dispatched.is_empty());
        assert_eq!(error.as_deref(), Some("first"));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identity_laws() {
        for creator in [push("x"), fail("x")] {
            let plain = run(&creator);
            assert_eq!(run(&AsyncActionCreator::empty().combine(creator.clone())), plain);
            assert_eq!(run(&creator.clone().combine(AsyncActionCreator::empty())), plain);
        }
        assert_eq!(run(&AsyncActionCreator::empty()), (Vec::new(), None));
    }

    #[test]
    fn test_associativity_with_failures() {
        let cases = [
            (push("a"), push("b"), push("c")),
            (push("a"), fail("b"), push("c")),
            (fail("a"), push("b"), push("c")),
            (push("a"), push("b"), fail("c")),
        ];
        for (a, b, c) in cases {
            let left = a.clone().then(b.clone()).then(c.clone());
            let right = a.then(b.then(c));
            assert_eq!(run(&left), run(&right));
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Outer {
        inner: Vec<String>,
    }

    #[derive(Debug, PartialEq)]
    enum OuterAction {
        Inner(String),
    }

    fn inner(state: &Outer) -> &Vec<String> {
        &state.inner
    }
    fn inner_mut(state: &mut Outer) -> &mut Vec<String> {
        &mut state.inner
    }
    fn inner_action(action: &OuterAction) -> Option<&String> {
        match action {
            OuterAction::Inner(inner) => Some(inner),
        }
    }

    #[test]
    fn test_lifted_creators_project_and_inject() {
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let sink = dispatched.clone();
        let dispatch = Dispatch::new(move |action: OuterAction| sink.lock().unwrap().push(action));
        let get_state = GetState::new(|| Outer {
            inner: vec!["A".to_string()],
        });

        let appending = ActionCreator::new(|dispatch: Dispatch<String>, get_state: GetState<Vec<String>>| {
            dispatch.dispatch(get_state.get().concat() + "B")
        });
        appending
            .lift(Lens::new(inner, inner_mut), Prism::new(inner_action, OuterAction::Inner))
            .run(dispatch.clone(), get_state.clone());

        let counting = push("C").lift(Lens::new(inner, inner_mut), Prism::new(inner_action, OuterAction::Inner));
        futures::executor::block_on(counting.start(dispatch, get_state)).unwrap();

        assert_eq!(
            *dispatched.lock().unwrap(),
            vec![OuterAction::Inner("AB".to_string()), OuterAction::Inner("C".to_string())]
        );
    }
}
