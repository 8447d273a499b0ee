//! Predictable state-container primitives: slice reducers, composable
//! middleware, and a single-writer dispatch loop.

mod action;
pub use action::{Action, ActionCreator, action_creator, action_creators, is_action_of};
mod draft;
pub use draft::{apply_draft, try_apply_draft};
mod error;
pub use error::{DispatchError, StateError};
mod middleware;
pub use middleware::{ActionLogger, ChainLink, DispatchFn, Middleware, compose, middleware_fn};
mod reducer;
pub use reducer::{RootReducer, combine_reducers};
mod slice;
pub use slice::{Slice, SliceBuilder, SliceReducer};
mod state;
pub use state::{SliceValue, StateTree};
mod store;
pub use store::{Store, StoreApi, StoreBuilder, Subscription};
