//! The cart slice: reducer, typed view and action creators.

use crate::action::{Action, Thunk};
use crate::error::Result;
use crate::state::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::Future;
use std::sync::Arc;

/// Key of the cart slice in the shipped state tree.
pub const CART_SLICE: &str = "cart";

/// Typed view of the cart slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartState {
    pub entries: Map<String, Value>,
    pub write: Map<String, Value>,
}

impl CartState {
    /// Read the cart slice out of `state`. A missing slice reads as empty.
    ///
    /// # Errors
    ///
    /// [`Error::Shape`](crate::Error::Shape) if the slice is not cart-shaped.
    pub fn of(state: &State) -> Result<Self> {
        match state.slice(CART_SLICE) {
            Some(_) => state.slice_as(CART_SLICE),
            None => Ok(CartState::default()),
        }
    }
}

/// Slice reducer for the cart.
///
/// `SET_CART_ENTRIES` replaces `entries` and keeps every other field of the
/// slice. Any other action returns the slice unchanged.
pub fn cart_reducer(state: &Arc<Value>, action: &Action) -> Arc<Value> {
    match action {
        Action::SetCartEntries { entries } => {
            if state.get("entries").and_then(Value::as_object) == Some(entries) {
                return Arc::clone(state);
            }
            let mut next = match state.as_ref() {
                Value::Object(map) => map.clone(),
                _ => empty_cart(),
            };
            next.insert("entries".to_string(), Value::Object(entries.clone()));
            Arc::new(Value::Object(next))
        }
        _ if state.is_null() => Arc::new(Value::Object(empty_cart())),
        _ => Arc::clone(state),
    }
}

fn empty_cart() -> Map<String, Value> {
    match json!({ "entries": {}, "write": {} }) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Action creator for `SET_CART_ENTRIES`.
///
/// # Errors
///
/// [`Error::NotAnObject`](crate::Error::NotAnObject) unless `entries` is a
/// JSON object.
pub fn set_cart_entries(entries: Value) -> Result<Action> {
    Action::set_cart_entries(entries)
}

/// Thunk that awaits `fetch` and stores what it yields as the cart entries.
///
/// A failed fetch, or one that yields anything but a JSON object, leaves the
/// cart untouched; the error is reported through the thunk's handle.
///
/// ```no_run
/// use cartfold::fetch_cart_entries;
/// use serde_json::json;
///
/// let thunk = fetch_cart_entries(|| async { Ok(json!({"sku1": {"qty": 1}})) });
/// # let _ = thunk;
/// ```
pub fn fetch_cart_entries<F, Fut>(fetch: F) -> Thunk
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Thunk::new(move |store| async move {
        let entries = fetch().await?;
        log::debug!("cartfold: fetched cart entries");
        store.dispatch(set_cart_entries(entries)?)?;
        Ok(())
    })
}
