//! Middleware stages and right-to-left pipeline composition.
//!
//! A middleware stage sits between `dispatch` and the reducer. It is bound
//! in three steps: [`Middleware::connect`] receives the restricted store
//! view once at construction time; the resulting [`ChainLink`] is bound
//! once to the next stage's handler; the final [`DispatchFn`] then runs per
//! action, free to inspect, transform, short-circuit, or forward.

use crate::action::Action;
use crate::error::DispatchError;
use crate::store::StoreApi;

/// A bound action handler: one stage of the pipeline, or base-dispatch
/// itself at the innermost position.
pub type DispatchFn = Box<dyn Fn(Action) -> Result<(), DispatchError>>;

/// A stage bound to the store view, awaiting its `next` handler.
pub type ChainLink = Box<dyn FnOnce(DispatchFn) -> DispatchFn>;

/// An interceptor stage inserted between dispatch invocation and the
/// reducer.
///
/// `connect` is called exactly once, when the store is built. The `api` it
/// receives exposes only the guarded state accessor and the store's public
/// dispatch -- a dispatch issued through it re-enters the whole pipeline,
/// not just the downstream stages, so a stage may substitute a different
/// action for the one it intercepted.
///
/// Closures of the matching shape are wrapped via [`middleware_fn`]:
///
/// ```
/// use statefold::{ChainLink, DispatchFn, Slice, Store, StoreApi, middleware_fn};
///
/// let noisy = middleware_fn(|_api: StoreApi| -> ChainLink {
///     Box::new(|next: DispatchFn| {
///         Box::new(move |action| {
///             println!("saw {}", action.kind());
///             next(action)
///         })
///     })
/// });
///
/// let store = Store::builder()
///     .slice(Slice::builder("counter", 0i64).build())
///     .middleware(noisy)
///     .build();
/// # let _ = store;
/// ```
pub trait Middleware {
    /// Bind this stage to the store view, yielding the link to compose.
    fn connect(self: Box<Self>, api: StoreApi) -> ChainLink;
}

/// Wrap a `connect`-shaped closure as a [`Middleware`].
pub fn middleware_fn<F>(connect: F) -> impl Middleware + 'static
where
    F: FnOnce(StoreApi) -> ChainLink + 'static,
{
    FnStage(connect)
}

struct FnStage<F>(F);

impl<F> Middleware for FnStage<F>
where
    F: FnOnce(StoreApi) -> ChainLink,
{
    fn connect(self: Box<Self>, api: StoreApi) -> ChainLink {
        (self.0)(api)
    }
}

/// Compose links right-to-left into a single link.
///
/// Zero links yield the identity; one link is returned unchanged in
/// effect; with several, the *first* element becomes the outermost wrapper,
/// so it runs first on the way in and last on the way out. Applying the
/// result to base-dispatch hands each stage the next stage closer to
/// base-dispatch as its `next`, in one reduction pass.
pub fn compose(links: Vec<ChainLink>) -> ChainLink {
    Box::new(move |innermost| {
        links
            .into_iter()
            .rev()
            .fold(innermost, |next, link| link(next))
    })
}

/// Middleware that logs every action crossing the pipeline.
///
/// Emits a `tracing` debug event on entry and another after the downstream
/// stages return, carrying the action kind and the outcome.
pub struct ActionLogger;

impl Middleware for ActionLogger {
    fn connect(self: Box<Self>, _api: StoreApi) -> ChainLink {
        Box::new(|next| {
            Box::new(move |action| {
                let kind = action.kind().to_owned();
                tracing::debug!(action = %kind, "dispatch enter");
                let result = next(action);
                tracing::debug!(action = %kind, ok = result.is_ok(), "dispatch exit");
                result
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// A link that records entry and exit around its `next` call.
    fn tagged(log: Log, tag: &'static str) -> ChainLink {
        Box::new(move |next: DispatchFn| {
            Box::new(move |action| {
                log.borrow_mut().push(format!("{tag}-enter"));
                let result = next(action);
                log.borrow_mut().push(format!("{tag}-exit"));
                result
            })
        })
    }

    fn recording_base(log: Log) -> DispatchFn {
        Box::new(move |_action| {
            log.borrow_mut().push("base".to_string());
            Ok(())
        })
    }

    #[test]
    fn zero_links_compose_to_the_identity() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let pipeline = compose(Vec::new())(recording_base(Rc::clone(&log)));

        pipeline(Action::new("x/y")).unwrap();
        assert_eq!(*log.borrow(), ["base"]);
    }

    #[test]
    fn single_link_wraps_the_base() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let links = vec![tagged(Rc::clone(&log), "m1")];
        let pipeline = compose(links)(recording_base(Rc::clone(&log)));

        pipeline(Action::new("x/y")).unwrap();
        assert_eq!(*log.borrow(), ["m1-enter", "base", "m1-exit"]);
    }

    #[test]
    fn first_link_is_the_outermost_wrapper() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let links = vec![
            tagged(Rc::clone(&log), "m1"),
            tagged(Rc::clone(&log), "m2"),
        ];
        let pipeline = compose(links)(recording_base(Rc::clone(&log)));

        pipeline(Action::new("x/y")).unwrap();
        assert_eq!(
            *log.borrow(),
            ["m1-enter", "m2-enter", "base", "m2-exit", "m1-exit"]
        );
    }

    #[test]
    fn short_circuiting_link_never_reaches_the_base() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let swallow: ChainLink = Box::new(|_next: DispatchFn| Box::new(move |_action| Ok(())));
        let links = vec![tagged(Rc::clone(&log), "m1"), swallow];
        let pipeline = compose(links)(recording_base(Rc::clone(&log)));

        pipeline(Action::new("x/y")).unwrap();
        assert_eq!(*log.borrow(), ["m1-enter", "m1-exit"]);
    }

    #[test]
    fn errors_flow_back_through_outer_links() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let failing_base: DispatchFn =
            Box::new(move |_action| Err(DispatchError::Reentrancy));
        let links = vec![tagged(Rc::clone(&log), "m1")];
        let pipeline = compose(links)(failing_base);

        let result = pipeline(Action::new("x/y"));
        assert!(matches!(result, Err(DispatchError::Reentrancy)));
        assert_eq!(*log.borrow(), ["m1-enter", "m1-exit"]);
    }
}
