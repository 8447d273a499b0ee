//! Copy-on-write draft commits for slice state.
//!
//! The dispatch engine never mutates a committed state value. Handlers are
//! written against a mutable draft; this module turns the draft run into a
//! new shared value, handing the original back untouched when nothing
//! actually changed.
//!
//! # Contract
//!
//! - The base value is never mutated.
//! - If the mutation script leaves the draft value-equal to the base, the
//!   base `Arc` itself is returned, so `Arc::ptr_eq` change detection sees
//!   "unchanged".
//! - If the script returns `Some(replacement)`, the replacement is used
//!   verbatim as the new value, even if it equals the base.

use std::convert::Infallible;
use std::sync::Arc;

/// Run a mutation script against a draft of `base` and commit the result.
///
/// The script receives a mutable draft cloned from `base`. Returning `None`
/// commits the (possibly mutated) draft; returning `Some(value)` discards
/// the draft and commits `value` verbatim.
pub fn apply_draft<S, F>(base: &Arc<S>, mutate: F) -> Arc<S>
where
    S: Clone + PartialEq,
    F: FnOnce(&mut S) -> Option<S>,
{
    match try_apply_draft::<S, _, Infallible>(base, |draft| Ok(mutate(draft))) {
        Ok(next) => next,
        Err(infallible) => match infallible {},
    }
}

/// Fallible form of [`apply_draft`].
///
/// An `Err` from the mutation script aborts the commit; the base value is
/// left untouched and the error is returned to the caller.
///
/// # Errors
///
/// Returns whatever error the mutation script produced.
pub fn try_apply_draft<S, F, E>(base: &Arc<S>, mutate: F) -> Result<Arc<S>, E>
where
    S: Clone + PartialEq,
    F: FnOnce(&mut S) -> Result<Option<S>, E>,
{
    let mut draft = S::clone(base);
    match mutate(&mut draft)? {
        Some(replacement) => Ok(Arc::new(replacement)),
        None if draft == **base => Ok(Arc::clone(base)),
        None => Ok(Arc::new(draft)),
    }
}
