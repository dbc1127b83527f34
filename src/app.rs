//! The shipped application: cart and routing slices, thunk and logger
//! middleware, a synchronized memory history and the cart route table.

use crate::cart::{CART_SLICE, CartState, cart_reducer};
use crate::error::{Error, Result, RouteError};
use crate::history::{History, Location, MemoryHistory};
use crate::logger::{LoggerMiddleware, LoggerOptions};
use crate::middleware::ThunkMiddleware;
use crate::route::{EagerLoader, ModuleLoader, Resolution, RouteTable, RouterConfig, ViewModule};
use crate::state::State;
use crate::store::Store;
use crate::sync::{ROUTING_SLICE, SyncOptions, SyncedHistory, routing_reducer, sync_history_with_store};
use log::Level;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Bootstrap settings.
///
/// Every field has a default, so `{}` is a valid JSON configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the history engine starts.
    pub initial_path: String,
    pub load_timeout_ms: u64,
    /// Level of the logger middleware's entries.
    pub log_level: Level,
    pub log_state: bool,
    /// Committed transitions kept for time travel.
    pub max_history: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            initial_path: "/".to_string(),
            load_timeout_ms: 30_000,
            log_level: Level::Info,
            log_state: true,
            max_history: 50,
        }
    }
}

impl AppConfig {
    /// Parse a JSON configuration.
    ///
    /// ```
    /// use cartfold::AppConfig;
    ///
    /// let config = AppConfig::from_json(r#"{"initial_path": "/cart", "log_level": "DEBUG"}"#).unwrap();
    /// assert_eq!(config.initial_path, "/cart");
    /// assert_eq!(config.max_history, 50);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Config)
    }

    pub fn router(&self) -> RouterConfig {
        RouterConfig {
            load_timeout: Duration::from_millis(self.load_timeout_ms),
        }
    }
}

/// State the store starts from: an empty cart.
pub fn preloaded_state() -> State {
    State::new().with_slice(CART_SLICE, json!({ "entries": {}, "write": {} }))
}

/// The assembled application core.
#[derive(Debug)]
pub struct App {
    store: Store,
    history: SyncedHistory,
    routes: RouteTable,
}

impl App {
    /// Identifier of the host element the view tree mounts into.
    pub const MOUNT_POINT: &'static str = "root";

    /// Assemble the application with in-memory view modules.
    pub fn bootstrap(config: AppConfig) -> Result<Self> {
        App::bootstrap_with_loaders(
            config,
            EagerLoader::new(ViewModule::new("CartContainer", "cartpage")),
            EagerLoader::new(ViewModule::new("CartItemContainer", "cartitempage")),
        )
    }

    /// Assemble the application with custom loaders for the cart index view
    /// (`/cart`) and the item view (`/:item`).
    pub fn bootstrap_with_loaders(
        config: AppConfig,
        index: impl ModuleLoader + 'static,
        item: impl ModuleLoader + 'static,
    ) -> Result<Self> {
        let routes = RouteTable::new(config.router())
            .route("/cart", index)?
            .route("/:item", item)?;

        let logger = LoggerMiddleware::new(LoggerOptions {
            level: config.log_level,
            log_state: config.log_state,
            ..LoggerOptions::default()
        });
        let store = Store::builder()
            .slice(CART_SLICE, cart_reducer)
            .slice(ROUTING_SLICE, routing_reducer)
            .preloaded_state(preloaded_state())
            .middleware(ThunkMiddleware)
            .middleware(logger)
            .instrument(config.max_history)
            .build();

        let engine = Arc::new(MemoryHistory::new(&config.initial_path));
        let history = sync_history_with_store(engine, &store, SyncOptions::default());
        log::info!(
            "cartfold: app mounted at '{}' on {}",
            App::MOUNT_POINT,
            history.location().path()
        );

        Ok(App {
            store,
            history,
            routes,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn history(&self) -> &SyncedHistory {
        &self.history
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Location held by the routing slice.
    pub fn location(&self) -> Option<Location> {
        self.history.store_location()
    }

    /// Typed view of the cart slice.
    pub fn cart(&self) -> Result<CartState> {
        CartState::of(&self.store.state())
    }

    /// Push `path` onto the history and start loading its view.
    ///
    /// The navigation happens even when no route matches, as it would in a
    /// browser; only the resolution fails.
    pub fn navigate(&self, path: &str) -> Result<Resolution, RouteError> {
        self.history.push(path);
        self.routes.resolve(path)
    }

    /// Start loading the view for the engine's current location.
    pub fn current_view(&self) -> Result<Resolution, RouteError> {
        self.routes.resolve(&self.history.location().path())
    }
}
