mod common;

use cartfold::{
    Action, History, MemoryHistory, ReduceFn, Reducer, State, Store, SyncOptions, cart_reducer,
    combine, routing_reducer, set_cart_entries, sync_history_with_store,
};
use common::{Tap, count_of, journal};
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::sync::Arc;

fn arb_entries() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map("[a-z]{1,6}", 0u32..10, 0..5).prop_map(|entries| {
        let map: Map<String, Value> = entries
            .into_iter()
            .map(|(sku, qty)| (sku, json!({ "qty": qty })))
            .collect();
        Value::Object(map)
    })
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        arb_entries().prop_map(|entries| set_cart_entries(entries).unwrap()),
        "[a-z]{1,8}".prop_map(|kind| Action::custom(kind, Value::Null)),
        Just(Action::Init),
    ]
}

fn shipped() -> impl Reducer {
    let slices: [(&str, ReduceFn); 2] = [("cart", cart_reducer), ("routing", routing_reducer)];
    combine(slices)
}

// Dispatching a sequence produces the same state as folding the root
// reducer over it by hand.
proptest! {
    #[test]
    fn prop_store_state_is_left_fold(actions in proptest::collection::vec(arb_action(), 0..30)) {
        let root = shipped();
        let mut folded = root.reduce(&Arc::new(State::new()), &Action::Init);
        for action in &actions {
            folded = root.reduce(&folded, action);
        }

        let store = Store::builder()
            .slice("cart", cart_reducer)
            .slice("routing", routing_reducer)
            .build();
        for action in actions {
            store.dispatch(action).unwrap();
        }

        prop_assert_eq!(store.state().to_json(), folded.to_json());
    }
}

// Actions no shipped reducer recognizes return the prior state itself.
proptest! {
    #[test]
    fn prop_unknown_action_is_identity(
        entries in arb_entries(),
        kind in "[a-z]{1,8}",
    ) {
        let root = shipped();
        let state = root.reduce(&Arc::new(State::new()), &set_cart_entries(entries).unwrap());
        let next = root.reduce(&state, &Action::custom(kind, Value::Null));
        prop_assert!(Arc::ptr_eq(&state, &next));
    }
}

// Applying the same SET_CART_ENTRIES twice equals applying it once.
proptest! {
    #[test]
    fn prop_set_cart_entries_is_idempotent(
        before in arb_entries(),
        entries in arb_entries(),
    ) {
        let root = shipped();
        let start = root.reduce(&Arc::new(State::new()), &set_cart_entries(before).unwrap());
        let once = root.reduce(&start, &set_cart_entries(entries.clone()).unwrap());
        let twice = root.reduce(&once, &set_cart_entries(entries.clone()).unwrap());

        prop_assert_eq!(once.to_json(), twice.to_json());
        prop_assert_eq!(&once.slice("cart").unwrap()["entries"], &entries);
        prop_assert_eq!(&once.slice("cart").unwrap()["write"], &json!({}));
    }
}

// Every navigation dispatches exactly one LOCATION_CHANGE and the routing
// slice always matches the engine.
proptest! {
    #[test]
    fn prop_each_navigation_dispatches_once(
        steps in proptest::collection::vec(
            prop_oneof![
                "[a-z]{1,5}".prop_map(|p| (0u8, format!("/{p}"))),
                "[a-z]{1,5}".prop_map(|p| (1u8, format!("/{p}"))),
                Just((2u8, String::new())),
                Just((3u8, String::new())),
            ],
            0..20,
        )
    ) {
        let journal = journal();
        let store = Store::builder()
            .slice("routing", routing_reducer)
            .middleware(Tap::new("tap", &journal))
            .build();
        let engine = Arc::new(MemoryHistory::new("/"));
        let _history = sync_history_with_store(engine.clone(), &store, SyncOptions::default());

        let mut expected = 1;
        for (op, path) in &steps {
            let before = engine.location();
            match *op {
                0 => engine.push(path),
                1 => engine.replace(path),
                2 => engine.go_back(),
                _ => engine.go_forward(),
            }
            if engine.location() != before {
                expected += 1;
            }
        }

        prop_assert_eq!(count_of(&journal, "tap:LOCATION_CHANGE"), expected);
        let routed = cartfold::select_routing_location(&store.state()).unwrap();
        prop_assert_eq!(routed.path(), engine.location().path());
    }
}
