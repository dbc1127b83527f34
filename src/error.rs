//! Crate-level error types for dispatch, history synchronization and route
//! resolution.

use std::time::Duration;

/// Error returned by store operations and the dispatch pipeline.
///
/// Reducer panics are not represented here: reducers are contractually pure
/// and infallible, so a panicking reducer unwinds straight to the caller of
/// [`Store::dispatch`](crate::Store::dispatch).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A thunk reached the core dispatch.
    ///
    /// The store only reduces plain actions; thunks need a
    /// [`ThunkMiddleware`](crate::ThunkMiddleware) somewhere in the chain.
    #[error("thunk reached the reducer: no thunk middleware in the chain")]
    UnhandledThunk,

    /// A thunk was dispatched outside of a tokio runtime.
    #[error("no async runtime available to run the thunk")]
    NoRuntime,

    /// The store behind a weak handle has been dropped.
    #[error("store is no longer alive")]
    StoreGone,

    /// A middleware refused to forward an effect.
    ///
    /// The chain is aborted before the reducer runs, so the state is
    /// unchanged.
    #[error("middleware '{middleware}' rejected '{action}': {reason}")]
    Rejected {
        middleware: String,
        action: String,
        reason: String,
    },

    /// Time travel on a store built without
    /// [`StoreBuilder::instrument`](crate::StoreBuilder::instrument).
    #[error("store is not instrumented")]
    NotInstrumented,

    /// Time travel to a state that was never recorded (or already evicted).
    #[error("no recorded state at index {index} ({len} recorded)")]
    NoSuchState { index: usize, len: usize },

    /// A slice or preloaded state does not have the expected shape.
    #[error("state shape error in '{slice}': {source}")]
    Shape {
        slice: String,
        #[source]
        source: serde_json::Error,
    },

    /// A preloaded state or action payload that is not a JSON object.
    #[error("{what} must be a JSON object, got {found}")]
    NotAnObject {
        what: &'static str,
        found: &'static str,
    },

    /// Application configuration could not be read.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// The task running a thunk was cancelled or panicked.
    #[error("thunk task did not complete: {0}")]
    ThunkAborted(String),

    /// Route table construction failed.
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Error produced while matching or loading a route's view module.
///
/// Delivered to resolution callbacks, so it is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RouteError {
    /// No registered pattern matches the path.
    #[error("no route matches '{0}'")]
    NoMatch(String),

    /// The loader did not complete within the configured timeout.
    #[error("loading view for '{route}' timed out after {timeout:?}")]
    Timeout { route: String, timeout: Duration },

    /// The loader reported a failure.
    #[error("loading view for '{route}' failed: {reason}")]
    Load { route: String, reason: String },

    /// A pending load was polled outside of a tokio runtime, so no timeout
    /// could be armed.
    #[error("no async runtime available to wait for '{0}'")]
    NoRuntime(String),

    /// A route pattern could not be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

/// Convenience alias for results carrying [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
