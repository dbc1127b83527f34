use crate::action::Action;
use crate::state::State;
use serde_json::Value;
use std::sync::Arc;

/// A pure function that folds an action into one slice of state.
///
/// Reducers receive the current slice and return the next one. They must be
/// pure (no I/O, no side effects) and must return the *same* `Arc` for any
/// action they do not handle, so downstream change detection stays a pointer
/// comparison. A slice that does not exist yet is passed in as `null`; map it
/// to the slice's default shape.
///
/// # Examples
///
/// ```
/// use cartfold::{Action, ReduceFn};
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// fn ticks(state: &Arc<Value>, action: &Action) -> Arc<Value> {
///     match action {
///         Action::Custom { kind, .. } if kind == "tick" => {
///             Arc::new(json!(state.as_u64().unwrap_or(0) + 1))
///         }
///         _ if state.is_null() => Arc::new(json!(0)),
///         _ => Arc::clone(state),
///     }
/// }
///
/// let reducer: ReduceFn = ticks;
/// ```
pub type ReduceFn = fn(&Arc<Value>, &Action) -> Arc<Value>;

/// A root reducer over the whole state tree.
pub trait Reducer: Send + Sync {
    /// Fold `action` into `state`.
    ///
    /// Return `Arc::clone(state)` when nothing changed.
    fn reduce(&self, state: &Arc<State>, action: &Action) -> Arc<State>;
}

impl<F> Reducer for F
where
    F: Fn(&Arc<State>, &Action) -> Arc<State> + Send + Sync,
{
    fn reduce(&self, state: &Arc<State>, action: &Action) -> Arc<State> {
        self(state, action)
    }
}

/// Root reducer assembled from independent slice reducers.
///
/// Each registered key owns the slice of the same name. Slices present in the
/// state without a reducer are carried over untouched.
#[derive(Debug, Clone, Default)]
pub struct CombinedReducer {
    slices: Vec<(String, ReduceFn)>,
}

impl CombinedReducer {
    pub fn new() -> Self {
        CombinedReducer::default()
    }

    /// Register a slice reducer under `key`.
    ///
    /// Registering the same key twice keeps the later reducer.
    pub fn slice(mut self, key: &str, reducer: ReduceFn) -> Self {
        if let Some(existing) = self.slices.iter_mut().find(|(k, _)| k == key) {
            log::warn!("cartfold: slice '{key}' registered twice, keeping the later reducer");
            existing.1 = reducer;
        } else {
            self.slices.push((key.to_string(), reducer));
        }
        self
    }

    /// Registered slice keys, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Keys of `state` that no registered reducer owns.
    pub fn unexpected_keys<'a>(&self, state: &'a State) -> Vec<&'a str> {
        state
            .keys()
            .filter(|key| !self.slices.iter().any(|(k, _)| k == key))
            .collect()
    }
}

impl Reducer for CombinedReducer {
    fn reduce(&self, state: &Arc<State>, action: &Action) -> Arc<State> {
        let mut next: Option<State> = None;

        for (key, reducer) in &self.slices {
            let previous = state.slice(key);
            let input = previous
                .cloned()
                .unwrap_or_else(|| Arc::new(Value::Null));
            let output = reducer(&input, action);

            let unchanged = previous.is_some_and(|old| Arc::ptr_eq(old, &output));
            if !unchanged {
                next.get_or_insert_with(|| State::clone(state))
                    .insert(key, output);
            }
        }

        match next {
            Some(next) => Arc::new(next),
            None => Arc::clone(state),
        }
    }
}

/// Merge slice reducers into one [`CombinedReducer`].
///
/// ```
/// use cartfold::{cart_reducer, combine, routing_reducer, ReduceFn};
///
/// let slices: [(&str, ReduceFn); 2] = [("cart", cart_reducer), ("routing", routing_reducer)];
/// let root = combine(slices);
/// assert_eq!(root.keys().collect::<Vec<_>>(), ["cart", "routing"]);
/// ```
pub fn combine<I, K>(slices: I) -> CombinedReducer
where
    I: IntoIterator<Item = (K, ReduceFn)>,
    K: AsRef<str>,
{
    slices
        .into_iter()
        .fold(CombinedReducer::new(), |root, (key, reducer)| {
            root.slice(key.as_ref(), reducer)
        })
}
