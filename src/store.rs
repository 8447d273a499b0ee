//! The store: owns the state tree, the root reducer, the composed dispatch
//! pipeline, and the listener registry.
//!
//! The store is a passive object -- it runs no background work and every
//! dispatch executes entirely on the caller's stack. A single reentrancy
//! flag enforces the single-writer discipline: only base-dispatch replaces
//! the state, and only one base-dispatch frame can be live at a time.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::action::Action;
use crate::error::{DispatchError, StateError};
use crate::middleware::{ChainLink, DispatchFn, Middleware, compose};
use crate::reducer::{RootReducer, combine_reducers};
use crate::slice::{Slice, SliceReducer};
use crate::state::StateTree;

/// A predictable state container.
///
/// Holds one immutable state tree, replaced wholesale on every committed
/// dispatch. `Clone` is cheap -- clones share the same underlying store.
/// The store is deliberately thread-pinned (`!Send`); state snapshots are
/// `Arc`-shared and may cross threads freely.
///
/// # Examples
///
/// ```
/// use statefold::{Slice, Store};
///
/// #[derive(Debug, Clone, Default, PartialEq)]
/// struct Counter {
///     value: i64,
/// }
///
/// let counter = Slice::builder("counter", Counter::default())
///     .case("increment", |state: &mut Counter, _: ()| state.value += 1)
///     .build();
/// let increment = counter.action("increment").unwrap().clone();
///
/// let store = Store::builder().slice(counter).build();
/// store.dispatch(increment.action())?;
///
/// assert_eq!(store.state()?.get::<Counter>("counter").unwrap().value, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Start configuring a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// A frozen snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DispatchInProgress`] while a dispatch is
    /// committing -- reducers must not observe a half-committed tree.
    pub fn state(&self) -> Result<Arc<StateTree>, StateError> {
        self.inner.state_snapshot()
    }

    /// Dispatch an action through the pipeline to the reducers.
    ///
    /// Routes through the composed middleware pipeline when one was
    /// configured, otherwise straight to base-dispatch. Listeners are
    /// notified after every completed commit, even when the resulting tree
    /// is referentially unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Reentrancy`] when invoked from within a
    /// reducer, and propagates handler faults unchanged.
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        self.inner.dispatch(action)
    }

    /// Register a listener invoked after every committed dispatch.
    ///
    /// Listeners run in registration order, exactly once per completed
    /// dispatch, with no arguments. The returned [`Subscription`] is the
    /// only way to unregister: dropping it without calling
    /// [`cancel`](Subscription::cancel) leaves the listener active for the
    /// life of the store.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        let listener: Rc<dyn Fn()> = Rc::new(listener);
        self.inner.listeners.borrow_mut().push((id, listener));

        Subscription {
            id,
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("slices", &self.inner.reducer.len())
            .finish()
    }
}

/// The restricted store view handed to middleware.
///
/// Exposes only the guarded state accessor and the store's public
/// dispatch. Holds a weak reference, so a stage that stashes its view
/// never keeps the store alive; once the store is dropped, both operations
/// report it gone.
#[derive(Clone)]
pub struct StoreApi {
    inner: Weak<StoreInner>,
}

impl StoreApi {
    /// A frozen snapshot of the current state.
    ///
    /// The same guarded accessor as [`Store::state`]: it fails while a
    /// base-dispatch frame is committing, and only then -- a stage reading
    /// state before forwarding an action, or after its forwarded dispatch
    /// has unwound, succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DispatchInProgress`] mid-commit and
    /// [`StateError::StoreGone`] if the store has been dropped.
    pub fn state(&self) -> Result<Arc<StateTree>, StateError> {
        match self.inner.upgrade() {
            Some(inner) => inner.state_snapshot(),
            None => Err(StateError::StoreGone),
        }
    }

    /// Dispatch an action, re-entering the full pipeline from the top.
    ///
    /// This is the store's public dispatch, not the next downstream stage:
    /// a stage may use it to dispatch a different action in place of the
    /// one it intercepted. The nested dispatch runs to completion,
    /// listener notifications included, before this call returns.
    ///
    /// # Errors
    ///
    /// Same as [`Store::dispatch`], plus [`DispatchError::StoreGone`] if
    /// the store has been dropped.
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        match self.inner.upgrade() {
            Some(inner) => inner.dispatch(action),
            None => Err(DispatchError::StoreGone),
        }
    }
}

impl std::fmt::Debug for StoreApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreApi").finish_non_exhaustive()
    }
}

/// Capability to unregister a listener.
///
/// Cancellation is explicit: the listener stays registered until
/// [`cancel`](Subscription::cancel) is invoked, regardless of whether this
/// handle is still around.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<StoreInner>,
}

impl Subscription {
    /// Remove the listener from the store's registry.
    ///
    /// A no-op if the store has already been dropped. Removal during a
    /// notification pass takes effect on the next dispatch.
    pub fn cancel(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .listeners
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

struct StoreInner {
    state: RefCell<Arc<StateTree>>,
    reducer: RootReducer,
    /// Composed middleware pipeline; `None` when no middleware was
    /// configured and dispatch goes straight to base-dispatch.
    pipeline: RefCell<Option<DispatchFn>>,
    listeners: RefCell<Vec<(u64, Rc<dyn Fn()>)>>,
    next_listener: Cell<u64>,
    /// The reentrancy flag: set for exactly the base-dispatch frame.
    dispatching: Cell<bool>,
}

impl StoreInner {
    fn state_snapshot(&self) -> Result<Arc<StateTree>, StateError> {
        if self.dispatching.get() {
            return Err(StateError::DispatchInProgress);
        }
        Ok(Arc::clone(&self.state.borrow()))
    }

    fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        // Shared borrow held across the call; nested dispatches issued by
        // middleware re-borrow shared, which is fine.
        let pipeline = self.pipeline.borrow();
        match pipeline.as_ref() {
            Some(run) => run(action),
            None => self.base_dispatch(action),
        }
    }

    /// The innermost, unconditional commit routine.
    ///
    /// Rejects overlap, runs the root reducer, swaps the tree, clears the
    /// flag (on error paths too, via the drop guard), then notifies.
    fn base_dispatch(&self, action: Action) -> Result<(), DispatchError> {
        if self.dispatching.get() {
            return Err(DispatchError::Reentrancy);
        }

        tracing::debug!(action = %action.kind(), "dispatching");

        {
            self.dispatching.set(true);
            let _guard = ClearOnDrop(&self.dispatching);

            let current = Arc::clone(&self.state.borrow());
            let next = self.reducer.reduce(&current, &action)?;
            *self.state.borrow_mut() = next;
        }

        self.notify();
        Ok(())
    }

    fn notify(&self) {
        // Snapshot the registry first so listeners can subscribe or cancel
        // without invalidating the iteration; such changes take effect on
        // the next dispatch.
        let listeners: Vec<Rc<dyn Fn()>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        for listener in listeners {
            listener();
        }
    }
}

/// Clears the reentrancy flag when the base-dispatch frame exits,
/// including via an error return from the reducer.
struct ClearOnDrop<'a>(&'a Cell<bool>);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Builder for configuring and creating a [`Store`].
///
/// Collects named slice reducers and an ordered middleware list, then
/// wires everything in one construction step: the root reducer is
/// composed, the initial tree derived from the slice configurations, and
/// the middleware chain bound to base-dispatch.
///
/// # Examples
///
/// ```
/// use statefold::{ActionLogger, Slice, Store};
///
/// let store = Store::builder()
///     .slice(Slice::builder("counter", 0i64).build())
///     .middleware(ActionLogger)
///     .build();
/// # let _ = store;
/// ```
#[derive(Default)]
pub struct StoreBuilder {
    reducers: BTreeMap<String, SliceReducer>,
    middleware: Vec<Box<dyn Middleware>>,
}

impl StoreBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            reducers: BTreeMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Register a slice under its own name.
    ///
    /// The slice's creators should be cloned out beforehand if they are
    /// still needed; the builder keeps only the reducer.
    pub fn slice(mut self, slice: Slice) -> Self {
        let (name, _actions, reducer) = slice.into_parts();
        self.reducers.insert(name, reducer);
        self
    }

    /// Register a bare slice reducer under an explicit key.
    ///
    /// Registering the same key again overwrites the earlier entry.
    pub fn reducer(mut self, key: impl Into<String>, reducer: SliceReducer) -> Self {
        self.reducers.insert(key.into(), reducer);
        self
    }

    /// Append a middleware stage.
    ///
    /// Stages compose in the order they are added: the first added stage
    /// is the outermost wrapper and sees every action first.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Create the store.
    pub fn build(self) -> Store {
        let reducer = combine_reducers(self.reducers);
        let initial = Arc::new(reducer.initial_state());
        let slices = reducer.len();
        let stages = self.middleware.len();

        let inner = Rc::new(StoreInner {
            state: RefCell::new(initial),
            reducer,
            pipeline: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            dispatching: Cell::new(false),
        });

        if !self.middleware.is_empty() {
            let api = StoreApi {
                inner: Rc::downgrade(&inner),
            };
            let links: Vec<ChainLink> = self
                .middleware
                .into_iter()
                .map(|stage| stage.connect(api.clone()))
                .collect();

            let weak = Rc::downgrade(&inner);
            let base: DispatchFn = Box::new(move |action| match weak.upgrade() {
                Some(inner) => inner.base_dispatch(action),
                None => Err(DispatchError::StoreGone),
            });

            *inner.pipeline.borrow_mut() = Some(compose(links)(base));
        }

        tracing::debug!(slices, middleware = stages, "store created");
        Store { inner }
    }
}
