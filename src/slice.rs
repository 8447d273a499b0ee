//! Slice builder and the per-slice action-routing table.
//!
//! A slice is a named, independently defined unit of state together with
//! the handlers that update it and the action creators that address those
//! handlers. Handlers are written against a mutable draft; the commit
//! through [`try_apply_draft`](crate::try_apply_draft) guarantees the
//! previous state value is never touched.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::action::{Action, ActionCreator};
use crate::draft::try_apply_draft;
use crate::error::DispatchError;
use crate::state::SliceValue;

/// A case handler bound to one action kind, operating on the typed draft.
type CaseHandler<S> = Box<dyn Fn(&mut S, &Action) -> Result<Option<S>, DispatchError>>;

/// Type-erased reduce function stored inside a [`SliceReducer`].
type ReduceFn = Box<dyn Fn(Option<&SliceValue>, &Action) -> Result<SliceValue, DispatchError>>;

/// One slice's reducer configuration: its initial value plus the reduce
/// function the composer invokes.
///
/// Produced by [`SliceBuilder::build`] or, for hand-rolled reducers, by
/// [`SliceReducer::from_fn`]. Consumed by
/// [`combine_reducers`](crate::combine_reducers) or
/// [`StoreBuilder::reducer`](crate::StoreBuilder::reducer).
pub struct SliceReducer {
    initial: SliceValue,
    run: ReduceFn,
}

impl SliceReducer {
    /// Build a reducer from a plain `(state, action) -> state` function.
    ///
    /// Returning `None` means "unchanged": the incoming value is handed
    /// back as-is, preserving its identity. Returning `Some(next)` commits
    /// `next` as a fresh value.
    pub fn from_fn<S, F>(initial: S, reduce: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&S, &Action) -> Option<S> + 'static,
    {
        let initial: Arc<S> = Arc::new(initial);
        let seed = Arc::clone(&initial);
        let run: ReduceFn = Box::new(move |state, action| {
            let current = downcast_state::<S>(state, &seed)?;
            match reduce(&current, action) {
                Some(next) => {
                    let next: SliceValue = Arc::new(next);
                    Ok(next)
                }
                None => Ok(pass_through(state, &current)),
            }
        });

        Self {
            initial: initial as SliceValue,
            run,
        }
    }

    /// The slice's initial value.
    pub fn initial(&self) -> SliceValue {
        Arc::clone(&self.initial)
    }

    /// Reduce one action against this slice's state.
    ///
    /// `None` state means "not yet initialized" and resolves to the initial
    /// value, mirroring a defaulted reducer argument. Unmatched actions
    /// return the incoming value unchanged -- never an error.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Handler`] for a failing handler,
    /// [`DispatchError::Payload`] for an undecodable payload, and
    /// [`DispatchError::StateMismatch`] if the value is not this reducer's
    /// state type.
    pub fn reduce(
        &self,
        state: Option<&SliceValue>,
        action: &Action,
    ) -> Result<SliceValue, DispatchError> {
        (self.run)(state, action)
    }
}

impl std::fmt::Debug for SliceReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceReducer").finish_non_exhaustive()
    }
}

/// A named unit of state: its reducer plus the generated action creators.
///
/// # Examples
///
/// ```
/// use statefold::Slice;
///
/// #[derive(Debug, Clone, Default, PartialEq)]
/// struct Counter {
///     value: i64,
/// }
///
/// let counter = Slice::builder("counter", Counter::default())
///     .case("increment", |state: &mut Counter, _: ()| state.value += 1)
///     .case("increment_by_amount", |state: &mut Counter, amount: i64| {
///         state.value += amount;
///     })
///     .build();
///
/// let increment = counter.action("increment").unwrap();
/// assert_eq!(increment.action().kind(), "counter/increment");
/// ```
pub struct Slice {
    name: String,
    actions: BTreeMap<String, ActionCreator>,
    reducer: SliceReducer,
}

impl Slice {
    /// Start building a slice with the given name and initial state.
    pub fn builder<S>(name: impl Into<String>, initial: S) -> SliceBuilder<S>
    where
        S: Clone + PartialEq + Send + Sync + 'static,
    {
        SliceBuilder {
            name: name.into(),
            initial,
            routes: HashMap::new(),
            fallback: None,
            actions: BTreeMap::new(),
        }
    }

    /// The slice name, used as the key in the root state tree.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The creator for one of this slice's cases, by short name.
    pub fn action(&self, case: &str) -> Option<&ActionCreator> {
        self.actions.get(case)
    }

    /// All generated creators, keyed by short case name.
    pub fn actions(&self) -> &BTreeMap<String, ActionCreator> {
        &self.actions
    }

    /// Split the slice into its name, creators, and reducer.
    pub fn into_parts(self) -> (String, BTreeMap<String, ActionCreator>, SliceReducer) {
        (self.name, self.actions, self.reducer)
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("name", &self.name)
            .field("cases", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects case handlers for a slice and produces the [`Slice`].
///
/// Each registration keys the routing table by the full action kind.
/// Registering the same case (or the same external kind) twice overwrites
/// the earlier handler -- collisions are deliberate replacement, not an
/// error.
pub struct SliceBuilder<S> {
    name: String,
    initial: S,
    routes: HashMap<String, CaseHandler<S>>,
    fallback: Option<CaseHandler<S>>,
    actions: BTreeMap<String, ActionCreator>,
}

impl<S> SliceBuilder<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    /// Register a mutating handler for the case `"<slice>/<case>"`.
    ///
    /// The handler receives a draft of the current state and the decoded
    /// payload; handlers that ignore the payload take `()`. A matching
    /// [`ActionCreator`] is added under the short case name.
    pub fn case<P, F>(self, case: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(&mut S, P) + 'static,
    {
        self.try_case(case, move |state, payload| {
            handler(state, payload);
            Ok::<(), Infallible>(())
        })
    }

    /// Register a fallible mutating handler for `"<slice>/<case>"`.
    ///
    /// An `Err` from the handler is a handler fault: it aborts the commit,
    /// leaves the state untouched, and propagates out of `dispatch` boxed
    /// inside [`DispatchError::Handler`].
    pub fn try_case<P, F, E>(mut self, case: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(&mut S, P) -> Result<(), E> + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let case = case.into();
        debug_assert!(!case.is_empty(), "case name must be non-empty");
        let kind = format!("{}/{case}", self.name);

        let route: CaseHandler<S> = Box::new(move |state, action| {
            let payload = decode_payload::<P>(action)?;
            handler(state, payload).map_err(DispatchError::handler)?;
            Ok(None)
        });

        self.actions.insert(case, ActionCreator::new(kind.clone()));
        self.routes.insert(kind, route);
        self
    }

    /// Register a replacing handler for `"<slice>/<case>"`.
    ///
    /// Instead of mutating a draft, the handler computes the next state
    /// from the current one; the returned value is committed verbatim.
    pub fn case_replace<P, F>(mut self, case: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(&S, P) -> S + 'static,
    {
        let case = case.into();
        debug_assert!(!case.is_empty(), "case name must be non-empty");
        let kind = format!("{}/{case}", self.name);

        let route: CaseHandler<S> = Box::new(move |state, action| {
            let payload = decode_payload::<P>(action)?;
            Ok(Some(handler(state, payload)))
        });

        self.actions.insert(case, ActionCreator::new(kind.clone()));
        self.routes.insert(kind, route);
        self
    }

    /// Register a handler for an action kind defined outside this slice.
    ///
    /// The kind is used verbatim -- no `"<slice>/"` prefix -- and no
    /// creator is generated; the originating slice owns the creator.
    pub fn extra_case<P, F>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(&mut S, P) + 'static,
    {
        let route: CaseHandler<S> = Box::new(move |state, action| {
            let payload = decode_payload::<P>(action)?;
            handler(state, payload);
            Ok(None)
        });

        self.routes.insert(kind.into(), route);
        self
    }

    /// Register the default case, run when no specific route matches.
    ///
    /// The handler sees the raw action. Its draft is committed only if it
    /// actually changed the state -- a no-op default produces no new value,
    /// so unmatched actions still leave the slice referentially unchanged.
    /// At most one default case exists; a second registration replaces the
    /// first.
    pub fn default_case<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut S, &Action) + 'static,
    {
        self.fallback = Some(Box::new(move |state, action| {
            handler(state, action);
            Ok(None)
        }));
        self
    }

    /// Finish the slice: freeze the routing table and produce the reducer.
    pub fn build(self) -> Slice {
        let SliceBuilder {
            name,
            initial,
            routes,
            fallback,
            actions,
        } = self;

        let initial: Arc<S> = Arc::new(initial);
        let seed = Arc::clone(&initial);
        let run: ReduceFn = Box::new(move |state, action| {
            let base = downcast_state::<S>(state, &seed)?;

            let Some(handler) = routes.get(action.kind()).or(fallback.as_ref()) else {
                // Unmatched action: pass through whatever we were given.
                return Ok(pass_through(state, &base));
            };

            let next = try_apply_draft(&base, |draft| handler(draft, action))?;
            if Arc::ptr_eq(&next, &base) {
                Ok(pass_through(state, &base))
            } else {
                let next: SliceValue = next;
                Ok(next)
            }
        });

        Slice {
            name,
            actions,
            reducer: SliceReducer {
                initial: initial as SliceValue,
                run,
            },
        }
    }
}

/// Resolve the incoming value to the typed state, falling back to the
/// initial value when the composer has nothing for this slice yet.
fn downcast_state<S: Send + Sync + 'static>(
    state: Option<&SliceValue>,
    seed: &Arc<S>,
) -> Result<Arc<S>, DispatchError> {
    match state {
        Some(value) => {
            Arc::clone(value)
                .downcast::<S>()
                .map_err(|_| DispatchError::StateMismatch {
                    expected: std::any::type_name::<S>(),
                })
        }
        None => Ok(Arc::clone(seed)),
    }
}

/// Hand back the exact value the composer passed in (or the typed seed when
/// it passed nothing), preserving `Arc` identity for change detection.
fn pass_through<S: Send + Sync + 'static>(state: Option<&SliceValue>, base: &Arc<S>) -> SliceValue {
    match state {
        Some(value) => Arc::clone(value),
        None => {
            let value: SliceValue = base.clone();
            value
        }
    }
}

fn decode_payload<P: DeserializeOwned>(action: &Action) -> Result<P, DispatchError> {
    action.payload::<P>().map_err(|source| DispatchError::Payload {
        action: action.kind().to_owned(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::Slice;

    /// A simple counter slice used as a test fixture.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Counter {
        pub value: i64,
    }

    pub(crate) fn counter_slice() -> Slice {
        Slice::builder("counter", Counter::default())
            .case("increment", |state: &mut Counter, _: ()| state.value += 1)
            .case("decrement", |state: &mut Counter, _: ()| state.value -= 1)
            .case(
                "increment_by_amount",
                |state: &mut Counter, amount: i64| state.value += amount,
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::{Counter, counter_slice};
    use super::*;

    fn reduce_ok(slice: &Slice, state: Option<&SliceValue>, action: &Action) -> SliceValue {
        slice.reducer.reduce(state, action).expect("reduce should succeed")
    }

    #[test]
    fn creators_carry_the_qualified_kind() {
        let slice = counter_slice();
        assert_eq!(
            slice.action("increment").unwrap().kind(),
            "counter/increment"
        );
        assert_eq!(
            slice.actions().keys().collect::<Vec<_>>(),
            ["decrement", "increment", "increment_by_amount"]
        );
    }

    #[test]
    fn matched_case_updates_the_draft() {
        let slice = counter_slice();
        let next = reduce_ok(&slice, None, &Action::new("counter/increment"));
        assert_eq!(next.downcast_ref::<Counter>().unwrap().value, 1);
    }

    #[test]
    fn payload_case_decodes_the_amount() {
        let slice = counter_slice();
        let action = slice
            .action("increment_by_amount")
            .unwrap()
            .action_with(5i64)
            .unwrap();
        let next = reduce_ok(&slice, None, &action);
        assert_eq!(next.downcast_ref::<Counter>().unwrap().value, 5);
    }

    #[test]
    fn unmatched_action_passes_state_through() {
        let slice = counter_slice();
        let state = slice.reducer.initial();
        let next = reduce_ok(&slice, Some(&state), &Action::new("other/thing"));
        assert!(Arc::ptr_eq(&state, &next));
    }

    #[test]
    fn missing_state_resolves_to_the_initial_value() {
        let slice = counter_slice();
        let next = reduce_ok(&slice, None, &Action::new("other/thing"));
        assert_eq!(next.downcast_ref::<Counter>().unwrap().value, 0);
    }

    #[test]
    fn undecodable_payload_is_a_payload_error() {
        let slice = counter_slice();
        let action = Action::with_payload("counter/increment_by_amount", "five").unwrap();
        let err = slice.reducer.reduce(None, &action).unwrap_err();
        assert!(matches!(err, DispatchError::Payload { .. }));
    }

    #[test]
    fn colliding_registration_overwrites() {
        let slice = Slice::builder("counter", Counter::default())
            .case("set", |state: &mut Counter, _: ()| state.value = 1)
            .case("set", |state: &mut Counter, _: ()| state.value = 2)
            .build();

        let next = reduce_ok(&slice, None, &Action::new("counter/set"));
        assert_eq!(next.downcast_ref::<Counter>().unwrap().value, 2);
    }

    #[test]
    fn replacing_case_commits_the_returned_value() {
        let slice = Slice::builder("counter", Counter::default())
            .case_replace("reset", |_state: &Counter, _: ()| Counter::default())
            .build();

        let state = slice.reducer.initial();
        let next = reduce_ok(&slice, Some(&state), &Action::new("counter/reset"));

        // The replacement is used verbatim, even though it equals the base.
        assert!(!Arc::ptr_eq(&state, &next));
        assert_eq!(next.downcast_ref::<Counter>().unwrap().value, 0);
    }

    #[test]
    fn failing_handler_propagates_unmodified() {
        #[derive(Debug, thiserror::Error)]
        #[error("cannot decrement: counter is already zero")]
        struct AlreadyZero;

        let slice = Slice::builder("counter", Counter::default())
            .try_case("decrement", |state: &mut Counter, _: ()| {
                if state.value == 0 {
                    return Err(AlreadyZero);
                }
                state.value -= 1;
                Ok(())
            })
            .build();

        let err = slice
            .reducer
            .reduce(None, &Action::new("counter/decrement"))
            .unwrap_err();

        assert!(matches!(err, DispatchError::Handler(_)));
        assert_eq!(err.to_string(), "cannot decrement: counter is already zero");
    }

    #[test]
    fn extra_case_routes_a_foreign_kind() {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Tally {
            increments_seen: u64,
        }

        let slice = Slice::builder("tally", Tally::default())
            .extra_case("counter/increment", |state: &mut Tally, _: ()| {
                state.increments_seen += 1;
            })
            .build();

        // No creator is generated for an external kind.
        assert!(slice.actions().is_empty());

        let next = reduce_ok(&slice, None, &Action::new("counter/increment"));
        assert_eq!(next.downcast_ref::<Tally>().unwrap().increments_seen, 1);
    }

    #[test]
    fn default_case_commits_only_on_actual_change() {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Audit {
            unmatched: u64,
        }

        let slice = Slice::builder("audit", Audit::default())
            .default_case(|state: &mut Audit, action: &Action| {
                if action.kind().starts_with("tracked/") {
                    state.unmatched += 1;
                }
            })
            .build();

        let state = slice.reducer.initial();

        // Default case runs but changes nothing: identity is preserved.
        let unchanged = reduce_ok(&slice, Some(&state), &Action::new("other/thing"));
        assert!(Arc::ptr_eq(&state, &unchanged));

        // Default case mutates: a fresh value is committed.
        let changed = reduce_ok(&slice, Some(&state), &Action::new("tracked/thing"));
        assert!(!Arc::ptr_eq(&state, &changed));
        assert_eq!(changed.downcast_ref::<Audit>().unwrap().unmatched, 1);
    }

    #[test]
    fn from_fn_reducer_preserves_identity_on_none() {
        let reducer = SliceReducer::from_fn(0i64, |state, action| match action.kind() {
            "n/bump" => Some(state + 1),
            _ => None,
        });

        let state = reducer.initial();
        let bumped = reducer.reduce(Some(&state), &Action::new("n/bump")).unwrap();
        assert_eq!(*bumped.downcast_ref::<i64>().unwrap(), 1);

        let unchanged = reducer.reduce(Some(&state), &Action::new("n/other")).unwrap();
        assert!(Arc::ptr_eq(&state, &unchanged));
    }
}
