//! Composition of named slice reducers into one root reducer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::Action;
use crate::error::DispatchError;
use crate::slice::SliceReducer;
use crate::state::StateTree;

/// Merge named slice reducers into a single reducer over the keyed tree.
///
/// Key order is the map order, so reduction is deterministic. Duplicate
/// keys overwrite -- the last registration wins, matching the overwrite
/// policy of the slice routing table.
pub fn combine_reducers<I, K>(reducers: I) -> RootReducer
where
    I: IntoIterator<Item = (K, SliceReducer)>,
    K: Into<String>,
{
    RootReducer {
        slices: reducers
            .into_iter()
            .map(|(key, reducer)| (key.into(), reducer))
            .collect(),
    }
}

/// The composed reducer over the whole state tree.
///
/// Produced by [`combine_reducers`]; the store drives it once per dispatch.
pub struct RootReducer {
    slices: BTreeMap<String, SliceReducer>,
}

impl RootReducer {
    /// Assemble the initial root state from each slice's initial value.
    ///
    /// The composer never invents defaults -- every entry comes straight
    /// from the slice configuration it was built with.
    pub fn initial_state(&self) -> StateTree {
        StateTree::new(
            self.slices
                .iter()
                .map(|(key, reducer)| (key.clone(), reducer.initial()))
                .collect(),
        )
    }

    /// Reduce one action against every slice, in stable key order.
    ///
    /// Returns the *same* `Arc` when no slice changed its sub-state, so
    /// consumers can detect a no-op dispatch by pointer identity. When any
    /// slice changed, the fresh tree still shares every unchanged
    /// [`SliceValue`](crate::SliceValue) with its predecessor.
    ///
    /// # Errors
    ///
    /// The first slice reducer error aborts composition; no replacement
    /// tree is produced.
    pub fn reduce(
        &self,
        state: &Arc<StateTree>,
        action: &Action,
    ) -> Result<Arc<StateTree>, DispatchError> {
        let mut next = BTreeMap::new();
        let mut changed = false;

        for (key, reducer) in &self.slices {
            let prev = state.raw(key);
            let next_sub = reducer.reduce(prev, action)?;
            changed |= match prev {
                Some(prev) => !Arc::ptr_eq(prev, &next_sub),
                None => true,
            };
            next.insert(key.clone(), next_sub);
        }

        if changed {
            Ok(Arc::new(StateTree::new(next)))
        } else {
            Ok(Arc::clone(state))
        }
    }

    /// Number of composed slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether any slices are composed at all.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl std::fmt::Debug for RootReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootReducer")
            .field("slices", &self.slices.keys().collect::<Vec<_>>())
            .finish()
    }
}
