//! The keyed root state tree and its type-erased slice values.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One slice's state, type-erased behind a shared pointer.
///
/// `Arc` identity (`Arc::ptr_eq`) is the change-detection primitive: a
/// reducer that leaves a slice untouched hands the same `Arc` back, so
/// consumers can detect "unchanged" without comparing values. Downcasting
/// recovers the typed state.
pub type SliceValue = Arc<dyn Any + Send + Sync>;

/// The root state: an immutable, keyed tree of slice values.
///
/// Keys are slice names; iteration order is the `BTreeMap` key order, which
/// keeps reduction deterministic. Trees are snapshots -- the store replaces
/// the whole tree on commit and never mutates one in place, so a tree handed
/// out by [`Store::state`](crate::Store::state) is frozen and may be shared
/// freely across threads.
#[derive(Clone, Default)]
pub struct StateTree {
    slices: BTreeMap<String, SliceValue>,
}

impl StateTree {
    pub(crate) fn new(slices: BTreeMap<String, SliceValue>) -> Self {
        Self { slices }
    }

    /// Typed read access to one slice's state.
    ///
    /// Returns `None` if the slice is absent or holds a different type.
    pub fn get<S: 'static>(&self, slice: &str) -> Option<&S> {
        self.slices.get(slice).and_then(|v| v.downcast_ref::<S>())
    }

    /// Raw access to one slice's value, for identity comparisons.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// # use statefold::{Slice, Store};
    /// # let store = Store::builder()
    /// #     .slice(Slice::builder("counter", 0i64).build())
    /// #     .build();
    /// let before = store.state()?;
    /// let after = store.state()?;
    /// assert!(Arc::ptr_eq(
    ///     before.raw("counter").unwrap(),
    ///     after.raw("counter").unwrap(),
    /// ));
    /// # Ok::<(), statefold::StateError>(())
    /// ```
    pub fn raw(&self, slice: &str) -> Option<&SliceValue> {
        self.slices.get(slice)
    }

    /// Number of slices in the tree.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether the tree holds no slices.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Slice names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }
}

// Manual `Debug` because `dyn Any` is not `Debug`; the keys are the useful
// part when a tree shows up in logs.
impl std::fmt::Debug for StateTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTree")
            .field("slices", &self.slices.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(entries: Vec<(&str, SliceValue)>) -> StateTree {
        StateTree::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn typed_get_recovers_the_value() {
        let tree = tree_of(vec![("counter", Arc::new(7i64) as SliceValue)]);
        assert_eq!(tree.get::<i64>("counter"), Some(&7));
    }

    #[test]
    fn typed_get_with_wrong_type_is_none() {
        let tree = tree_of(vec![("counter", Arc::new(7i64) as SliceValue)]);
        assert_eq!(tree.get::<String>("counter"), None);
    }

    #[test]
    fn missing_slice_is_none() {
        let tree = StateTree::default();
        assert_eq!(tree.get::<i64>("counter"), None);
        assert!(tree.raw("counter").is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn keys_iterate_in_stable_order() {
        let tree = tree_of(vec![
            ("todos", Arc::new(0i64) as SliceValue),
            ("counter", Arc::new(0i64) as SliceValue),
            ("filters", Arc::new(0i64) as SliceValue),
        ]);
        let keys: Vec<_> = tree.keys().collect();
        assert_eq!(keys, ["counter", "filters", "todos"]);
    }

    #[test]
    fn clone_shares_slice_values() {
        let tree = tree_of(vec![("counter", Arc::new(7i64) as SliceValue)]);
        let copy = tree.clone();
        assert!(Arc::ptr_eq(
            tree.raw("counter").unwrap(),
            copy.raw("counter").unwrap()
        ));
    }

    #[test]
    fn debug_lists_slice_names() {
        let tree = tree_of(vec![("counter", Arc::new(0i64) as SliceValue)]);
        assert!(format!("{tree:?}").contains("counter"));
    }
}
