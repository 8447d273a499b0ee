//! Action values, action creators, and matching predicates.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable event record submitted to the store.
///
/// Actions are routed by their `kind` string and carry an opaque JSON
/// payload. The payload is decoded into a typed value by whichever handler
/// the routing table selects; handlers that ignore their payload use `()`.
///
/// # Examples
///
/// ```
/// use statefold::Action;
///
/// let plain = Action::new("counter/increment");
/// assert_eq!(plain.kind(), "counter/increment");
/// assert!(plain.payload_value().is_null());
///
/// let with_amount = Action::with_payload("counter/increment_by_amount", 5)?;
/// assert_eq!(with_amount.payload::<i64>()?, 5);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Qualified action identifier, conventionally `"<slice>/<case>"`.
    kind: String,
    /// Opaque payload; `Value::Null` for payloadless actions.
    #[serde(default)]
    payload: Value,
}

impl Action {
    /// Create a payloadless action of the given kind.
    ///
    /// The kind must be non-empty; slice builders enforce this for the
    /// creators they generate.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    /// Create an action carrying a serialized payload.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload cannot be serialized.
    pub fn with_payload<P: Serialize>(
        kind: impl Into<String>,
        payload: P,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// The qualified action identifier.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Decode the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload does not match `P`.
    pub fn payload<P: DeserializeOwned>(&self) -> serde_json::Result<P> {
        serde_json::from_value(self.payload.clone())
    }

    /// The raw payload value.
    pub fn payload_value(&self) -> &Value {
        &self.payload
    }
}

/// A factory for actions of one fixed kind.
///
/// Creators are cheap to clone and carry no payload type of their own:
/// [`action`](ActionCreator::action) emits a payloadless action and
/// [`action_with`](ActionCreator::action_with) serializes whatever payload
/// the matching handler expects.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCreator {
    kind: String,
}

impl ActionCreator {
    /// Create a creator for the given action kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// The kind of action this creator produces.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Emit a payloadless action.
    pub fn action(&self) -> Action {
        Action::new(self.kind.clone())
    }

    /// Emit an action carrying a serialized payload.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload cannot be serialized.
    pub fn action_with<P: Serialize>(&self, payload: P) -> serde_json::Result<Action> {
        Action::with_payload(self.kind.clone(), payload)
    }

    /// Whether the given action is one this creator produces.
    pub fn matches(&self, action: &Action) -> bool {
        action.kind == self.kind
    }
}

/// Build a creator for a bare action-type string.
pub fn action_creator(kind: impl Into<String>) -> ActionCreator {
    ActionCreator::new(kind)
}

/// Build a map of creators from `(name, kind)` pairs.
///
/// The batch form of [`action_creator`]: the returned map is keyed by the
/// short names, each mapped to a creator for the paired kind.
pub fn action_creators<I, N, K>(pairs: I) -> BTreeMap<String, ActionCreator>
where
    I: IntoIterator<Item = (N, K)>,
    N: Into<String>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(name, kind)| (name.into(), ActionCreator::new(kind)))
        .collect()
}

/// Build a predicate that tests whether an action came from `creator`.
pub fn is_action_of(creator: &ActionCreator) -> impl Fn(&Action) -> bool + use<> {
    let kind = creator.kind.clone();
    move |action: &Action| action.kind == kind
}
