//! Unidirectional state container
//!
//! One mutable state value per `Store`, changed only by dispatching actions
//! through a middleware chain into a reducer. Async work is expressed as
//! action creators; `StoreQueue` runs them strictly one after another.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  dispatch   ┌─────────────────────────── serial context ──┐
//! │ any thread   │ ──────────► │ middleware ─► middleware ─► reducer ─► state │──► StateStream
//! └──────────────┘             │     ▲  │                                      │
//!        │                     │     └──┘ dispatch from middleware (inline)    │
//!        │ enqueue             │ StoreQueue bookkeeping                        │
//!        ▼                     └───────────────────────────────────────────────┘
//! ┌──────────────┐                  ▲
//! │ StoreQueue   │ ─── AsyncOp ───► async runtime ── outcome ─┘
//! └──────────────┘
//! ```
//!
//! Reducers, middleware and action creators all form monoids (`Monoid`) and
//! can be lifted onto larger states and action types with a `Lens` or `Prism`.
//!
//! # Example
//!
//! ```
//! use futures::FutureExt;
//! use uniflow::{AsyncActionCreator, Dispatch, GetState, Reducer, Store, StoreQueue};
//!
//! let reducer = Reducer::new(|total: &mut u64, amount: &u64| *total += amount);
//! let store = Store::new(reducer, 0, None)?;
//! let queue = StoreQueue::new(&store);
//!
//! let add_later = |amount: u64| {
//!     AsyncActionCreator::new(move |dispatch: Dispatch<u64>, _: GetState<u64>| {
//!         async move {
//!             dispatch.dispatch(amount);
//!             Ok(())
//!         }
//!         .boxed()
//!     })
//! };
//!
//! queue.enqueue(&add_later(1));
//! queue.enqueue(&add_later(2)).wait_blocking()?;
//! assert_eq!(store.state(), 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod action_creator;
mod completion;
mod compose;
mod config;
mod dispatcher;
mod error;
mod executor;
pub mod middleware;
mod queue;
mod reducer;
mod state_stream;
mod store;

pub use action_creator::{ActionCreator, AsyncActionCreator, AsyncOp};
pub use completion::{Completion, Outcome};
pub use compose::{Lens, Monoid, Prism};
pub use config::StoreConfig;
pub use dispatcher::{Dispatch, GetState};
pub use error::{ConfigError, OpError, StoreError};
pub use middleware::{Interceptor, Middleware, Teardown};
pub use queue::StoreQueue;
pub use reducer::Reducer;
pub use state_stream::StateStream;
pub use store::Store;
