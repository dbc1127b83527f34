mod action;
mod app;
mod cart;
mod error;
mod history;
mod logger;
mod middleware;
mod reducer;
pub mod route;
mod state;
mod store;
mod subscription;
mod sync;

pub use action::{Action, Dispatchable, Dispatched, Thunk, ThunkFuture, ThunkHandle};
pub use app::{App, AppConfig, preloaded_state};
pub use cart::{CART_SLICE, CartState, cart_reducer, fetch_cart_entries, set_cart_entries};
pub use error::{Error, Result, RouteError};
pub use history::{History, HistoryListener, Location, MemoryHistory, NavigationAction};
pub use logger::{LOG_TARGET, LogCrateSink, LogPredicate, LogSink, LoggerMiddleware, LoggerOptions};
pub use middleware::{Chain, DispatchFn, Middleware, MiddlewareApi, ThunkMiddleware};
pub use reducer::{CombinedReducer, ReduceFn, Reducer, combine};
pub use route::{
    DeferredLoader, EagerLoader, LoadFuture, ModuleLoader, Pattern, Resolution, Route, RouteMatch,
    RouteTable, RouterConfig, ViewModule,
};
pub use state::State;
pub use store::{Store, StoreBuilder, WeakStore, create_store};
pub use subscription::Subscription;
pub use sync::{
    LOCATION_FIELD, ROUTING_SLICE, SyncOptions, SyncedHistory, routing_reducer,
    select_routing_location, sync_history_with_store,
};
