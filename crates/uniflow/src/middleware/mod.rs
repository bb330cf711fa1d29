//! Middleware - interceptors between dispatch and the reducer
//!
//! ```text
//! dispatch(action) → m1 → m2 → ... → reducer → state
//!                     │    │
//!                     └────┴── each stage calls `next` to continue
//! ```
//!
//! A `Middleware` is a factory. The store instantiates it exactly once, handing
//! it a `Dispatch` that re-enters the full pipeline, a `GetState` and the
//! store's `Teardown`. The factory returns an interceptor `(action, next)`
//! which can:
//! - pass the action on unchanged: `next(action)`
//! - transform it: `next(other)`
//! - drop it: return without calling `next`
//! - dispatch further actions through the whole chain: `dispatch.dispatch(..)`
//!
//! Interceptors only ever run on the store's serial context, so they may keep
//! private state in a `Cell`/`RefCell` without any locking.
//!
//! ## Example
//!
//! ```
//! use uniflow::{Dispatch, GetState, Middleware, Teardown};
//!
//! #[derive(Debug)]
//! enum Action {
//!     Add(i64),
//! }
//!
//! let doubling: Middleware<i64, Action> =
//!     Middleware::new(|_dispatch: Dispatch<Action>, _get_state: GetState<i64>, _teardown: &Teardown| {
//!         |action: Action, next: &dyn Fn(Action)| match action {
//!             Action::Add(n) => next(Action::Add(n * 2)),
//!         }
//!     });
//! ```

pub mod logging;

use crate::compose::{Lens, Monoid, Prism};
use crate::dispatcher::{Dispatch, GetState};
use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

/// An instantiated middleware stage
pub type Interceptor<A> = Box<dyn Fn(A, &dyn Fn(A))>;

type Factory<S, A> = dyn Fn(Dispatch<A>, GetState<S>, &Teardown) -> Interceptor<A> + Send + Sync;

pub struct Middleware<S, A> {
    factory: Arc<Factory<S, A>>,
}

impl<S, A> Clone for Middleware<S, A> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

impl<S: 'static, A: 'static> Middleware<S, A> {
    pub fn new<F, I>(factory: F) -> Self
    where
        F: Fn(Dispatch<A>, GetState<S>, &Teardown) -> I + Send + Sync + 'static,
        I: Fn(A, &dyn Fn(A)) + 'static,
    {
        Self {
            factory: Arc::new(
                move |dispatch: Dispatch<A>, get_state: GetState<S>, teardown: &Teardown| {
                    Box::new(factory(dispatch, get_state, teardown)) as Interceptor<A>
                },
            ),
        }
    }

    /// Run the factory once, producing the interceptor for one store
    pub fn instantiate(
        &self,
        dispatch: Dispatch<A>,
        get_state: GetState<S>,
        teardown: &Teardown,
    ) -> Interceptor<A> {
        (self.factory)(dispatch, get_state, teardown)
    }

    /// Run this middleware against the part of a larger state picked by `lens`
    pub fn lift_state<T: 'static>(self, lens: Lens<T, S>) -> Middleware<T, A>
    where
        S: Clone,
    {
        Middleware::new(
            move |dispatch: Dispatch<A>, get_state: GetState<T>, teardown: &Teardown| {
                let get_part = get_state.map(move |whole| lens.get(&whole).clone());
                self.instantiate(dispatch, get_part, teardown)
            },
        )
    }

    /// Run this middleware for the actions `prism` can extract
    ///
    /// Other actions are handed to `next` untouched. Whatever the inner stage
    /// passes to its `next` or dispatches is injected back through the prism.
    pub fn lift_action<B: 'static>(self, prism: Prism<B, A>) -> Middleware<S, B>
    where
        A: Clone,
    {
        Middleware::new(
            move |dispatch: Dispatch<B>, get_state: GetState<S>, teardown: &Teardown| {
                let inner_dispatch = dispatch.contramap(move |action| prism.review(action));
                let inner = self.instantiate(inner_dispatch, get_state, teardown);

                move |action: B, next: &dyn Fn(B)| {
                    let Some(extracted) = prism.preview(&action).cloned() else {
                        return next(action);
                    };
                    inner(extracted, &|action| next(prism.review(action)))
                }
            },
        )
    }

    /// Lift both the state and the action type
    pub fn lift<T: 'static, B: 'static>(self, lens: Lens<T, S>, prism: Prism<B, A>) -> Middleware<T, B>
    where
        S: Clone,
        A: Clone,
    {
        self.lift_state(lens).lift_action(prism)
    }
}

impl<S: 'static, A: 'static> Monoid for Middleware<S, A> {
    /// A stage that passes every action through
    fn empty() -> Self {
        Middleware::new(|_: Dispatch<A>, _: GetState<S>, _: &Teardown| {
            |action: A, next: &dyn Fn(A)| next(action)
        })
    }

    /// `self` runs first; its `next` leads into `other`, whose `next` is the caller's
    fn combine(self, other: Self) -> Self {
        Middleware::new(
            move |dispatch: Dispatch<A>, get_state: GetState<S>, teardown: &Teardown| {
                let first = self.instantiate(dispatch.clone(), get_state.clone(), teardown);
                let second = other.instantiate(dispatch, get_state, teardown);

                move |action: A, next: &dyn Fn(A)| first(action, &|action| second(action, next))
            },
        )
    }
}

/// Resources owned by a store's middleware for the store's lifetime
///
/// Everything parked here is released exactly once, in registration order,
/// when the store is destroyed and never earlier.
#[derive(Default)]
pub struct Teardown {
    resources: RefCell<Vec<Box<dyn Any>>>,
}

struct OnRelease(Option<Box<dyn FnOnce()>>);

impl Drop for OnRelease {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `resource` alive until the store is destroyed, then drop it
    pub fn hold<R: 'static>(&self, resource: R) {
        self.resources.borrow_mut().push(Box::new(resource));
    }

    /// Run `release` when the store is destroyed
    pub fn on_release(&self, release: impl FnOnce() + 'static) {
        self.hold(OnRelease(Some(Box::new(release))));
    }

    pub fn len(&self) -> usize {
        self.resources.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        let resources = std::mem::take(self.resources.get_mut());
        if !resources.is_empty() {
            log::debug!("Releasing {} middleware resource(s)", resources.len());
        }
        for resource in resources {
            drop(resource);
        }
    }
}
