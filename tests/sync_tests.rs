mod common;

use cartfold::{
    History, Location, MemoryHistory, NavigationAction, Store, SyncOptions, ThunkMiddleware,
    cart_reducer, routing_reducer, select_routing_location, sync_history_with_store,
};
use common::{Tap, count_of, empty_cart, journal, Journal};
use parking_lot::Mutex;
use std::sync::Arc;

const LOCATION_CHANGE: &str = "tap:LOCATION_CHANGE";

fn synced(initial: &str) -> (Store, Arc<MemoryHistory>, cartfold::SyncedHistory, Journal) {
    let journal = journal();
    let store = Store::builder()
        .slice("cart", cart_reducer)
        .slice("routing", routing_reducer)
        .preloaded_state(empty_cart())
        .middleware(ThunkMiddleware)
        .middleware(Tap::new("tap", &journal))
        .instrument(50)
        .build();
    let engine = Arc::new(MemoryHistory::new(initial));
    let history = sync_history_with_store(engine.clone(), &store, SyncOptions::default());
    (store, engine, history, journal)
}

fn routed_path(store: &Store) -> Option<String> {
    select_routing_location(&store.state()).map(|l| l.path())
}

#[test]
fn install_dispatches_the_current_location_once() {
    let (store, _engine, _history, journal) = synced("/");
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 1);
    assert_eq!(routed_path(&store).as_deref(), Some("/"));
}

#[test]
fn push_dispatches_exactly_one_location_change() {
    let (store, _engine, history, journal) = synced("/");
    journal.lock().clear();

    history.push("/cart/42");

    assert_eq!(count_of(&journal, LOCATION_CHANGE), 1);
    let location = select_routing_location(&store.state()).unwrap();
    assert_eq!(location.pathname, "/cart/42");
    assert_eq!(location.action, NavigationAction::Push);
}

#[test]
fn engine_navigation_is_reflected_in_the_store() {
    let (store, engine, _history, journal) = synced("/");
    journal.lock().clear();

    engine.push("/a");
    engine.push("/b");
    engine.go_back();
    engine.replace("/c?x=1");

    assert_eq!(count_of(&journal, LOCATION_CHANGE), 4);
    let location = select_routing_location(&store.state()).unwrap();
    assert_eq!(location.path(), "/c?x=1");
    assert_eq!(location.action, NavigationAction::Replace);
}

#[test]
fn time_travel_replays_without_dispatching() {
    let (store, engine, _history, journal) = synced("/");
    engine.push("/cart");
    engine.push("/sku1");
    let recorded = store.recorded_states().unwrap();
    journal.lock().clear();

    // state 1 holds the location dispatched at install; state 2 is "/cart".
    store.jump_to(2).unwrap();

    assert_eq!(engine.location().pathname, "/cart");
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 0);
    assert_eq!(store.recorded_states().unwrap(), recorded);
}

#[test]
fn jumping_back_to_the_first_location_replays_it() {
    let (store, engine, _history, journal) = synced("/");
    engine.push("/cart");
    journal.lock().clear();

    store.jump_to(1).unwrap();

    assert_eq!(engine.location().pathname, "/");
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 0);
}

#[test]
fn replay_can_be_turned_off() {
    let store = Store::builder()
        .slice("routing", routing_reducer)
        .instrument(10)
        .build();
    let engine = Arc::new(MemoryHistory::new("/"));
    let options = SyncOptions {
        adjust_url_on_replay: false,
        ..SyncOptions::default()
    };
    let _history = sync_history_with_store(engine.clone(), &store, options);
    engine.push("/cart");

    store.jump_to(1).unwrap();
    assert_eq!(engine.location().pathname, "/cart");
    assert_eq!(routed_path(&store).as_deref(), Some("/"));
}

#[test]
fn navigation_during_replay_wins() {
    let (store, engine, _history, journal) = synced("/");
    engine.push("/cart");
    engine.push("/sku1");

    // A listener on the engine navigates as soon as the replay lands.
    let redirected = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&redirected);
    let redirector = engine.clone();
    let _sub = engine.listen(Arc::new(move |location: &Location| {
        let mut done = flag.lock();
        if location.pathname == "/cart" && !*done {
            *done = true;
            drop(done);
            redirector.push("/checkout");
        }
    }));
    journal.lock().clear();

    store.jump_to(2).unwrap();

    assert_eq!(engine.location().pathname, "/checkout");
    assert_eq!(routed_path(&store).as_deref(), Some("/checkout"));
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 1);
}

#[test]
fn redirect_registered_before_sync_wins_over_replay() {
    let journal = journal();
    let store = Store::builder()
        .slice("cart", cart_reducer)
        .slice("routing", routing_reducer)
        .preloaded_state(empty_cart())
        .middleware(ThunkMiddleware)
        .middleware(Tap::new("tap", &journal))
        .instrument(50)
        .build();
    let engine = Arc::new(MemoryHistory::new("/"));

    // Registered first, so the engine tells it about the replay before the
    // sync layer hears the replay's echo.
    let armed = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&armed);
    let redirector = engine.clone();
    let _sub = engine.listen(Arc::new(move |location: &Location| {
        let mut armed = flag.lock();
        if location.pathname == "/cart" && *armed {
            *armed = false;
            drop(armed);
            redirector.push("/checkout");
        }
    }));

    let _history = sync_history_with_store(engine.clone(), &store, SyncOptions::default());
    engine.push("/cart");
    engine.push("/sku1");
    journal.lock().clear();

    *armed.lock() = true;
    store.jump_to(2).unwrap();

    assert_eq!(engine.location().pathname, "/checkout");
    assert_eq!(routed_path(&store).as_deref(), Some("/checkout"));
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 1);

    // The dropped echo leaves nothing behind: later navigation syncs normally.
    engine.push("/sku2");
    assert_eq!(routed_path(&store).as_deref(), Some("/sku2"));
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 2);
}

#[test]
fn replay_to_the_current_engine_path_leaves_no_pending_echo() {
    let (store, engine, _history, journal) = synced("/");
    engine.push("/cart");
    engine.push("/sku1");
    store.jump_to(2).unwrap();
    store.jump_to(3).unwrap();
    journal.lock().clear();

    // An organic visit to the path last replayed is still dispatched.
    engine.push("/sku1");
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 1);
    assert_eq!(routed_path(&store).as_deref(), Some("/sku1"));
}

#[test]
fn synced_listen_follows_the_store() {
    let (store, engine, history, _journal) = synced("/");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = history.listen(Arc::new(move |location: &Location| {
        sink.lock().push(location.pathname.clone());
    }));

    assert!(seen.lock().is_empty());
    engine.push("/cart");
    store
        .dispatch(cartfold::set_cart_entries(serde_json::json!({})).unwrap())
        .unwrap();
    store.jump_to(1).unwrap();

    assert_eq!(*seen.lock(), ["/cart", "/"]);
}

#[test]
fn unsubscribe_detaches_both_directions() {
    let (store, engine, history, journal) = synced("/");
    engine.push("/cart");
    history.unsubscribe();
    journal.lock().clear();

    engine.push("/sku1");
    assert_eq!(count_of(&journal, LOCATION_CHANGE), 0);
    assert_eq!(routed_path(&store).as_deref(), Some("/cart"));

    store.jump_to(1).unwrap();
    assert_eq!(engine.location().pathname, "/sku1");
}

#[test]
fn preloaded_location_is_not_replayed_at_install() {
    let preloaded = Location::parse("/saved", NavigationAction::Push, "old", 3);
    let store = Store::builder()
        .slice("routing", routing_reducer)
        .preloaded_state(cartfold::State::new().with_slice(
            "routing",
            serde_json::json!({ "locationBeforeTransitions": preloaded }),
        ))
        .build();
    let engine = Arc::new(MemoryHistory::new("/"));
    let _history = sync_history_with_store(engine.clone(), &store, SyncOptions::default());

    assert_eq!(engine.len(), 1);
    assert_eq!(engine.location().pathname, "/");
}
