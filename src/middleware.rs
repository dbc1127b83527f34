//! The dispatch pipeline: an ordered list of interceptors folded once around
//! the store's core dispatch.

use crate::action::{Dispatchable, Dispatched, ThunkHandle};
use crate::error::{Error, Result};
use crate::state::State;
use crate::store::{Store, WeakStore};
use std::fmt;
use std::sync::Arc;

/// A dispatch function: the chain entry point, or the `next` layer handed
/// to a middleware.
pub type DispatchFn = Arc<dyn Fn(Dispatchable) -> Result<Dispatched> + Send + Sync>;

/// Store accessors handed to every middleware.
///
/// `dispatch` always enters the chain from the outermost layer. The handle is
/// weak, so a middleware never keeps its store alive.
#[derive(Clone, Debug)]
pub struct MiddlewareApi {
    store: WeakStore,
}

impl MiddlewareApi {
    pub(crate) fn new(store: WeakStore) -> Self {
        MiddlewareApi { store }
    }

    /// Dispatch through the full chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreGone`] if the store was dropped, or whatever the
    /// chain returns.
    pub fn dispatch(&self, effect: impl Into<Dispatchable>) -> Result<Dispatched> {
        self.store()?.dispatch(effect)
    }

    /// The current committed state.
    pub fn state(&self) -> Result<Arc<State>> {
        Ok(self.store()?.state())
    }

    pub fn store(&self) -> Result<Store> {
        self.store.upgrade().ok_or(Error::StoreGone)
    }
}

/// A dispatch interceptor.
///
/// A middleware may inspect the effect, forward it (possibly altered) by
/// calling `next`, dispatch other effects through `api`, or return without
/// forwarding. Returning `Err` before calling `next` aborts the dispatch and
/// leaves the state untouched.
pub trait Middleware: Send + Sync {
    /// Name shown by [`Store::middleware_names`].
    fn name(&self) -> &str;

    fn handle(
        &self,
        api: &MiddlewareApi,
        effect: Dispatchable,
        next: &DispatchFn,
    ) -> Result<Dispatched>;
}

/// Ordered middleware list. The first entry is the outermost layer.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Chain::default()
    }

    /// Append a layer. It sits inside every layer pushed before it.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    pub fn names(&self) -> Vec<String> {
        self.layers.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `core` with every layer, last-registered innermost.
    pub fn build(&self, api: &MiddlewareApi, core: DispatchFn) -> DispatchFn {
        self.layers.iter().rev().fold(core, |next, middleware| {
            let middleware = Arc::clone(middleware);
            let api = api.clone();
            let layer: DispatchFn =
                Arc::new(move |effect| middleware.handle(&api, effect, &next));
            layer
        })
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Arc<dyn Middleware>> for Chain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware>>>(iter: I) -> Self {
        Chain {
            layers: iter.into_iter().collect(),
        }
    }
}

/// Runs [`Thunk`](crate::Thunk)s instead of forwarding them.
///
/// The thunk closure is called immediately with the store; its future is
/// spawned on the current tokio runtime and [`Dispatched::Pending`] is
/// returned. Plain actions pass straight through.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThunkMiddleware;

impl Middleware for ThunkMiddleware {
    fn name(&self) -> &str {
        "thunk"
    }

    fn handle(
        &self,
        api: &MiddlewareApi,
        effect: Dispatchable,
        next: &DispatchFn,
    ) -> Result<Dispatched> {
        match effect {
            Dispatchable::Thunk(thunk) => {
                let runtime =
                    tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
                let future = thunk.run(api.store()?);
                Ok(Dispatched::Pending(ThunkHandle::new(runtime.spawn(future))))
            }
            action => next(action),
        }
    }
}
