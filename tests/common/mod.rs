#![allow(dead_code)]

use cartfold::{
    Action, DispatchFn, Dispatchable, Dispatched, Error, LogSink, Middleware, MiddlewareApi, State,
    Store, ThunkMiddleware, cart_reducer, routing_reducer,
};
use log::Level;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn counter_reducer(state: &Arc<Value>, action: &Action) -> Arc<Value> {
    match action {
        Action::Custom { kind, .. } if kind == "inc" => {
            Arc::new(json!(state.as_u64().unwrap_or(0) + 1))
        }
        _ if state.is_null() => Arc::new(json!(0)),
        _ => Arc::clone(state),
    }
}

pub fn inc() -> Action {
    Action::custom("inc", Value::Null)
}

pub fn counter(store: &Store) -> u64 {
    store
        .state()
        .slice("counter")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

pub fn empty_cart() -> State {
    State::new().with_slice("cart", json!({"entries": {}, "write": {}}))
}

/// Store with the shipped slices and the thunk middleware.
pub fn cart_store() -> Store {
    Store::builder()
        .slice("cart", cart_reducer)
        .slice("routing", routing_reducer)
        .preloaded_state(empty_cart())
        .middleware(ThunkMiddleware)
        .build()
}

/// Appends `"{name}:{label}"` for every effect it sees, then forwards.
pub struct Tap {
    pub name: &'static str,
    pub journal: Journal,
}

impl Tap {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Tap {
            name,
            journal: Arc::clone(journal),
        }
    }
}

impl Middleware for Tap {
    fn name(&self) -> &str {
        self.name
    }

    fn handle(
        &self,
        _api: &MiddlewareApi,
        effect: Dispatchable,
        next: &DispatchFn,
    ) -> cartfold::Result<Dispatched> {
        self.journal
            .lock()
            .push(format!("{}:{}", self.name, effect.label()));
        next(effect)
    }
}

/// Refuses every action of one kind.
pub struct Refuse(pub &'static str);

impl Middleware for Refuse {
    fn name(&self) -> &str {
        "refuse"
    }

    fn handle(
        &self,
        _api: &MiddlewareApi,
        effect: Dispatchable,
        next: &DispatchFn,
    ) -> cartfold::Result<Dispatched> {
        if effect.label() == self.0 {
            return Err(Error::Rejected {
                middleware: "refuse".into(),
                action: self.0.into(),
                reason: "refused".into(),
            });
        }
        next(effect)
    }
}

/// Log sink that keeps every entry in memory.
#[derive(Default)]
pub struct MemorySink {
    pub entries: Mutex<Vec<String>>,
}

impl LogSink for MemorySink {
    fn action(&self, _level: Level, action: &Action) {
        self.entries.lock().push(format!("action {}", action.kind()));
    }

    fn state(&self, _level: Level, state: &State, _elapsed: Option<Duration>) {
        self.entries
            .lock()
            .push(format!("state {}", serde_json::to_string(state).unwrap()));
    }

    fn thunk(&self, _level: Level) {
        self.entries.lock().push("thunk".to_string());
    }

    fn failed(&self, _level: Level, action: &str, _error: &Error) {
        self.entries.lock().push(format!("failed {action}"));
    }
}

/// Log sink that panics on every call.
pub struct PanickingSink;

impl LogSink for PanickingSink {
    fn action(&self, _level: Level, _action: &Action) {
        panic!("sink exploded");
    }

    fn state(&self, _level: Level, _state: &State, _elapsed: Option<Duration>) {
        panic!("sink exploded");
    }

    fn thunk(&self, _level: Level) {
        panic!("sink exploded");
    }

    fn failed(&self, _level: Level, _action: &str, _error: &Error) {
        panic!("sink exploded");
    }
}

/// Count of `kind` entries in a [`Tap`] journal.
pub fn count_of(journal: &Journal, entry: &str) -> usize {
    journal.lock().iter().filter(|e| e.as_str() == entry).count()
}
