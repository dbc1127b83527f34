use crate::error::{Error, Result};
use crate::history::Location;
use crate::state::json_kind;
use crate::store::Store;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;

/// An immutable description of an intended state change.
///
/// Serialized with its tag under `"type"`, so actions read the same in logs
/// as they would on the wire:
///
/// ```
/// use cartfold::Action;
/// use serde_json::json;
///
/// let action = Action::set_cart_entries(json!({"sku1": {"qty": 2}})).unwrap();
/// assert_eq!(action.kind(), "SET_CART_ENTRIES");
/// assert_eq!(
///     serde_json::to_value(&action).unwrap(),
///     json!({"type": "SET_CART_ENTRIES", "entries": {"sku1": {"qty": 2}}})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Action {
    /// Dispatched once by the store when it is created so every slice
    /// reducer can populate its default shape.
    Init,

    /// Merge `{ entries }` into the cart slice.
    SetCartEntries { entries: Map<String, Value> },

    /// The navigation engine moved to a new location.
    LocationChange { payload: Location },

    /// Application-defined action. The shipped reducers ignore it.
    Custom {
        kind: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Action {
    /// Build a `SET_CART_ENTRIES` action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnObject`] unless `entries` is a JSON object, so a
    /// malformed payload never reaches the cart reducer.
    pub fn set_cart_entries(entries: Value) -> Result<Self> {
        match entries {
            Value::Object(entries) => Ok(Action::SetCartEntries { entries }),
            other => Err(Error::NotAnObject {
                what: "SET_CART_ENTRIES entries",
                found: json_kind(&other),
            }),
        }
    }

    /// Build an application-defined action.
    pub fn custom(kind: impl Into<String>, payload: Value) -> Self {
        Action::Custom {
            kind: kind.into(),
            payload,
        }
    }

    /// The action's tag as it appears in the serialized `"type"` field.
    ///
    /// Custom actions report their own kind.
    pub fn kind(&self) -> &str {
        match self {
            Action::Init => "INIT",
            Action::SetCartEntries { .. } => "SET_CART_ENTRIES",
            Action::LocationChange { .. } => "LOCATION_CHANGE",
            Action::Custom { kind, .. } => kind,
        }
    }
}

/// Future returned by a running thunk.
pub type ThunkFuture = BoxFuture<'static, Result<()>>;

/// A deferred function dispatched in place of a plain action.
///
/// The closure runs synchronously inside [`Store::dispatch`] with a handle
/// to the store; the future it returns is spawned on the ambient tokio
/// runtime. Every action the thunk dispatches enters the middleware chain
/// from the outermost layer.
///
/// ```no_run
/// use cartfold::{Action, Thunk};
/// use serde_json::json;
///
/// let load = Thunk::new(|store| async move {
///     store.dispatch(Action::set_cart_entries(json!({"sku1": {"qty": 1}}))?)?;
///     Ok(())
/// });
/// # let _ = load;
/// ```
pub struct Thunk {
    run: Box<dyn FnOnce(Store) -> ThunkFuture + Send>,
}

impl Thunk {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Store) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Thunk {
            run: Box::new(move |store| f(store).boxed()),
        }
    }

    pub(crate) fn run(self, store: Store) -> ThunkFuture {
        (self.run)(store)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Thunk(..)")
    }
}

/// Anything that can be handed to [`Store::dispatch`].
#[derive(Debug)]
pub enum Dispatchable {
    Action(Action),
    Thunk(Thunk),
}

impl Dispatchable {
    /// Short label used in logs and errors.
    pub fn label(&self) -> &str {
        match self {
            Dispatchable::Action(action) => action.kind(),
            Dispatchable::Thunk(_) => "<thunk>",
        }
    }
}

impl From<Action> for Dispatchable {
    fn from(action: Action) -> Self {
        Dispatchable::Action(action)
    }
}

impl From<Thunk> for Dispatchable {
    fn from(thunk: Thunk) -> Self {
        Dispatchable::Thunk(thunk)
    }
}

/// What the middleware chain returned for a dispatch.
#[derive(Debug)]
pub enum Dispatched {
    /// The action that reached the reducer (normally the one dispatched).
    Action(Action),
    /// A thunk was started; its completion is observable through the handle.
    Pending(ThunkHandle),
    /// A middleware swallowed the effect without forwarding it.
    Suppressed,
}

impl Dispatched {
    pub fn action(&self) -> Option<&Action> {
        match self {
            Dispatched::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn into_pending(self) -> Option<ThunkHandle> {
        match self {
            Dispatched::Pending(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Handle to a running thunk.
///
/// Dropping the handle does not stop the thunk; errors it produces are then
/// lost. Use [`ThunkHandle::join`] to observe them.
#[derive(Debug)]
pub struct ThunkHandle {
    task: JoinHandle<Result<()>>,
}

impl ThunkHandle {
    pub(crate) fn new(task: JoinHandle<Result<()>>) -> Self {
        ThunkHandle { task }
    }

    /// Wait for the thunk and return its result.
    ///
    /// # Errors
    ///
    /// Returns the thunk's own error, or [`Error::ThunkAborted`] if the task
    /// panicked or was aborted.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::ThunkAborted(e.to_string())),
        }
    }

    /// Abort the thunk at its next suspension point.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn custom_action_reports_its_kind() {
        let action = Action::custom("cart/opened", json!({}));
        assert_eq!(action.kind(), "cart/opened");
    }

    #[test]
    fn non_object_entries_are_rejected() {
        let err = Action::set_cart_entries(json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::NotAnObject { found: "an array", .. }));
        assert_eq!(
            err.to_string(),
            "SET_CART_ENTRIES entries must be a JSON object, got an array"
        );
        assert!(Action::set_cart_entries(Value::Null).is_err());
    }

    #[test]
    fn empty_object_is_a_valid_payload() {
        assert_eq!(
            Action::set_cart_entries(json!({})).unwrap(),
            Action::SetCartEntries {
                entries: Map::new()
            }
        );
    }

    #[test]
    fn deserializes_tagged_form() {
        let action: Action = serde_json::from_value(json!({
            "type": "SET_CART_ENTRIES",
            "entries": {"a": 1}
        }))
        .unwrap();
        assert_eq!(action, Action::set_cart_entries(json!({"a": 1})).unwrap());
    }

    #[test]
    fn dispatchable_labels() {
        let thunk = Thunk::new(|_store| async { Ok(()) });
        assert_eq!(Dispatchable::from(thunk).label(), "<thunk>");
        assert_eq!(Dispatchable::from(Action::Init).label(), "INIT");
    }
}
