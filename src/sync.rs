//! Two-way synchronization between a navigation engine and the store's
//! routing slice.
//!
//! ```text
//!   engine ──location──► LOCATION_CHANGE ──► store.routing
//!     ▲                                          │
//!     └──────── replay (time travel) ◄───────────┘
//! ```
//!
//! Engine events always dispatch exactly one `LOCATION_CHANGE`. Store changes
//! that move the routing slice somewhere the engine is not (time travel) are
//! replayed on the engine, and the engine's echo of that replay is swallowed,
//! so no second action is produced.
//!
//! Navigation that happens while a replay is in flight wins, whichever order
//! the engine delivers the two events in. A replay remembers the epoch it was
//! started in; every organic engine event bumps the epoch, and an echo that
//! arrives after the epoch moved is dropped without touching the store.

use crate::action::Action;
use crate::history::{History, HistoryListener, Location, NavigationAction};
use crate::state::State;
use crate::store::Store;
use crate::subscription::Subscription;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

/// Key of the routing slice in the shipped state tree.
pub const ROUTING_SLICE: &str = "routing";

/// Field of the routing slice holding the last location.
pub const LOCATION_FIELD: &str = "locationBeforeTransitions";

/// Slice reducer for the routing slice.
///
/// Stores the payload of every `LOCATION_CHANGE`; ignores everything else.
pub fn routing_reducer(state: &Arc<Value>, action: &Action) -> Arc<Value> {
    match action {
        Action::LocationChange { payload } => {
            let mut next = match state.as_ref() {
                Value::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            next.insert(LOCATION_FIELD.to_string(), json!(payload));
            Arc::new(Value::Object(next))
        }
        _ if state.is_null() => Arc::new(json!({ LOCATION_FIELD: null })),
        _ => Arc::clone(state),
    }
}

/// Read the location held by the default routing slice.
pub fn select_routing_location(state: &State) -> Option<Location> {
    let location = state.slice(ROUTING_SLICE)?.get(LOCATION_FIELD)?;
    location_from_value(location)
}

/// Options for [`sync_history_with_store`].
#[derive(Clone)]
pub struct SyncOptions {
    /// Replay store-side location changes (time travel) on the engine.
    pub adjust_url_on_replay: bool,
    /// Where the routing location lives in the state.
    pub select_location: fn(&State) -> Option<Location>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            adjust_url_on_replay: true,
            select_location: select_routing_location,
        }
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("adjust_url_on_replay", &self.adjust_url_on_replay)
            .finish_non_exhaustive()
    }
}

struct Shared {
    history: Arc<dyn History>,
    options: SyncOptions,
    state: Mutex<SyncState>,
}

#[derive(Default)]
struct SyncState {
    /// First location seen, from the store or the engine.
    initial: Option<Location>,
    /// Location the engine is known to be at.
    current: Option<Location>,
    /// The engine event a replay in flight is expected to produce.
    pending_echo: Option<PendingEcho>,
    /// Bumped by every organic engine event.
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEcho {
    path: String,
    epoch: u64,
}

impl Shared {
    fn location_in_store(&self, state: &State, use_initial_if_empty: bool) -> Option<Location> {
        (self.options.select_location)(state).or_else(|| {
            if use_initial_if_empty {
                self.state.lock().initial.clone()
            } else {
                None
            }
        })
    }

    fn handle_store_change(&self, store: &Store) {
        let Some(target) = self.location_in_store(&store.state(), true) else {
            return;
        };

        let replay = {
            let mut sync = self.state.lock();
            let settled = sync.current.as_ref() == Some(&target)
                || (sync.current.is_none() && sync.initial.as_ref() == Some(&target));
            if settled {
                return;
            }
            let replay = PendingEcho {
                path: target.path(),
                epoch: sync.epoch,
            };
            sync.pending_echo = Some(replay.clone());
            sync.current = Some(target.clone());
            replay
        };

        log::debug!("cartfold: replaying {} on the history engine", replay.path);
        self.history.transition_to(&Location {
            action: NavigationAction::Push,
            ..target
        });

        let mut sync = self.state.lock();
        if sync.pending_echo.as_ref() == Some(&replay) {
            log::debug!("cartfold: engine never reported the replay of {}", replay.path);
            sync.pending_echo = None;
        }
    }

    fn handle_location_change(&self, store: &Store, location: &Location) {
        {
            let mut sync = self.state.lock();
            let path = location.path();
            if let Some(echo) = sync.pending_echo.take_if(|echo| echo.path == path) {
                if echo.epoch != sync.epoch {
                    log::debug!("cartfold: dropping stale replay of {path}");
                }
                return;
            }
            if sync.pending_echo.is_some() {
                log::debug!("cartfold: navigation to {path} wins over in-flight replay");
            }
            sync.epoch += 1;
            sync.current = Some(location.clone());
            if sync.initial.is_none() {
                sync.initial = Some(location.clone());
                if (self.options.select_location)(&store.state()).is_some() {
                    return;
                }
            }
        }

        let action = Action::LocationChange {
            payload: location.clone(),
        };
        if let Err(e) = store.dispatch(action) {
            log::warn!("cartfold: LOCATION_CHANGE for {} failed: {e}", location.path());
        }
    }
}

/// A history engine wired to a store.
///
/// Navigation methods drive the underlying engine; [`History::listen`]
/// reports locations as the *store* sees them, so listeners follow time
/// travel too. Dropping the value (or calling
/// [`unsubscribe`](SyncedHistory::unsubscribe)) detaches both directions.
pub struct SyncedHistory {
    shared: Arc<Shared>,
    store: Store,
    links: Mutex<Vec<Subscription>>,
}

/// Wire `history` and `store` together.
///
/// The store should own a routing slice (see [`routing_reducer`]). The
/// engine's current location is dispatched right away, so the routing slice
/// reflects the engine from the start.
///
/// ```
/// use cartfold::{sync_history_with_store, routing_reducer, History, MemoryHistory, Store, SyncOptions};
/// use std::sync::Arc;
///
/// let store = Store::builder().slice("routing", routing_reducer).build();
/// let history = sync_history_with_store(Arc::new(MemoryHistory::new("/")), &store, SyncOptions::default());
///
/// history.push("/cart/42");
/// let location = cartfold::select_routing_location(&store.state()).unwrap();
/// assert_eq!(location.pathname, "/cart/42");
/// ```
pub fn sync_history_with_store(
    history: Arc<dyn History>,
    store: &Store,
    options: SyncOptions,
) -> SyncedHistory {
    let shared = Arc::new(Shared {
        history: Arc::clone(&history),
        state: Mutex::new(SyncState {
            initial: (options.select_location)(&store.state()),
            ..SyncState::default()
        }),
        options,
    });
    let mut links = Vec::new();

    if shared.options.adjust_url_on_replay {
        let on_store = Arc::clone(&shared);
        links.push(store.subscribe(move |store| on_store.handle_store_change(store)));
        shared.handle_store_change(store);
    }

    let on_location = Arc::clone(&shared);
    let weak = store.downgrade();
    links.push(history.listen(Arc::new(move |location: &Location| {
        if let Some(store) = weak.upgrade() {
            on_location.handle_location_change(&store, location);
        }
    })));
    shared.handle_location_change(store, &history.location());

    SyncedHistory {
        shared,
        store: store.clone(),
        links: Mutex::new(links),
    }
}

impl SyncedHistory {
    /// Detach from both the engine and the store.
    pub fn unsubscribe(&self) {
        self.links.lock().clear();
    }

    pub fn engine(&self) -> &Arc<dyn History> {
        &self.shared.history
    }

    /// The location currently held by the store.
    pub fn store_location(&self) -> Option<Location> {
        self.shared.location_in_store(&self.store.state(), true)
    }
}

impl History for SyncedHistory {
    fn location(&self) -> Location {
        self.shared.history.location()
    }

    fn push(&self, path: &str) {
        self.shared.history.push(path);
    }

    fn replace(&self, path: &str) {
        self.shared.history.replace(path);
    }

    fn go(&self, delta: isize) {
        self.shared.history.go(delta);
    }

    fn transition_to(&self, location: &Location) {
        self.shared.history.transition_to(location);
    }

    /// Notify `listener` whenever the store's location changes.
    fn listen(&self, listener: HistoryListener) -> Subscription {
        let shared = Arc::clone(&self.shared);
        let last = Mutex::new(shared.location_in_store(&self.store.state(), true));
        self.store.subscribe(move |store| {
            let current = shared.location_in_store(&store.state(), true);
            {
                let mut last = last.lock();
                if *last == current {
                    return;
                }
                *last = current.clone();
            }
            if let Some(location) = current {
                listener(&location);
            }
        })
    }
}

impl fmt::Debug for SyncedHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedHistory")
            .field("location", &self.location())
            .field("options", &self.shared.options)
            .field("links", &self.links.lock().len())
            .finish()
    }
}

fn location_from_value(value: &Value) -> Option<Location> {
    if value.is_null() {
        return None;
    }
    match Location::deserialize(value) {
        Ok(location) => Some(location),
        Err(e) => {
            log::warn!("cartfold: routing slice holds an unreadable location: {e}");
            None
        }
    }
}
