//! Crate-level error types for dispatch and state access.

/// Error returned when dispatching an action fails.
///
/// The engine performs no local recovery: a failing dispatch restores the
/// store's internal invariants (the reentrancy flag, the last committed
/// state) and surfaces the error to the original caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A second dispatch was attempted while one is in progress.
    ///
    /// Dispatch is strictly single-writer and non-reentrant: a reducer that
    /// dispatches, directly or indirectly, during its own execution is
    /// rejected. The outer dispatch is unaffected and commits normally.
    #[error("a dispatch is already in progress; reducers may not dispatch")]
    Reentrancy,

    /// An action handler failed during state commitment.
    ///
    /// Wraps the domain-specific error returned from a fallible handler,
    /// forwarding its `Display` output verbatim. The state remains the last
    /// successfully committed value.
    #[error("{0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// The action payload could not be decoded into the handler's payload
    /// type.
    #[error("payload for action `{action}` could not be decoded")]
    Payload {
        /// Identifier of the action whose payload failed to decode.
        action: String,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// A slice's stored value was not the type its reducer expects.
    ///
    /// Unreachable through public construction -- the state tree is only
    /// ever written by the reducers that read it.
    #[error("slice state does not match the reducer's expected type `{expected}`")]
    StateMismatch {
        /// Name of the state type the reducer was built for.
        expected: &'static str,
    },

    /// The store behind a [`StoreApi`](crate::StoreApi) has been dropped.
    #[error("store is no longer alive")]
    StoreGone,
}

impl DispatchError {
    /// Box a domain error into a [`DispatchError::Handler`] fault.
    pub fn handler(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DispatchError::Handler(Box::new(err))
    }
}

/// Error returned when reading the current state of a store fails.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The guarded state accessor was invoked while a dispatch is in
    /// progress.
    ///
    /// Reducers must not observe a half-committed tree; the guard covers
    /// exactly the base-dispatch frame, so middleware reading state before
    /// forwarding an action (or after the forwarded dispatch has unwound)
    /// is unaffected.
    #[error("state is unavailable while a dispatch is in progress")]
    DispatchInProgress,

    /// The store behind a [`StoreApi`](crate::StoreApi) has been dropped.
    #[error("store is no longer alive")]
    StoreGone,
}
