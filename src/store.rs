use crate::action::{Action, Dispatchable, Dispatched};
use crate::error::{Error, Result};
use crate::middleware::{Chain, DispatchFn, Middleware, MiddlewareApi};
use crate::reducer::{CombinedReducer, ReduceFn, Reducer};
use crate::state::State;
use crate::subscription::Subscription;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener = Arc<dyn Fn(&Store) + Send + Sync>;

/// The single owner of application state.
///
/// A `Store` is a cheap, clonable handle: pass it to whatever needs to read
/// or change state instead of reaching for a global. State only changes
/// through [`dispatch`](Store::dispatch) (and the time-travel operations of
/// an instrumented store). Reducer runs are serialized, so readers always
/// observe a state produced by a completed dispatch.
///
/// # Examples
///
/// ```
/// use cartfold::{cart_reducer, Action, State, Store};
/// use serde_json::json;
///
/// let store = Store::builder()
///     .slice("cart", cart_reducer)
///     .preloaded_state(State::from_json(json!({"cart": {"entries": {}, "write": {}}})).unwrap())
///     .build();
///
/// store.dispatch(Action::set_cart_entries(json!({"sku1": {"qty": 2}})).unwrap()).unwrap();
/// assert_eq!(store.state().slice("cart").unwrap()["entries"], json!({"sku1": {"qty": 2}}));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// A non-owning store handle.
#[derive(Clone, Debug)]
pub struct WeakStore {
    inner: Weak<Inner>,
}

struct Inner {
    state: RwLock<Arc<State>>,
    reducer: Box<dyn Reducer>,
    dispatch_lock: Mutex<()>,
    dispatch: DispatchFn,
    middleware_names: Vec<String>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    recorder: Option<Mutex<Recorder>>,
}

impl Store {
    /// Start configuring a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Run `effect` through the middleware chain.
    ///
    /// Returns whatever the chain returns: normally the action that was
    /// reduced, a pending handle for thunks, or `Suppressed`.
    ///
    /// # Errors
    ///
    /// Propagates middleware errors, and [`Error::UnhandledThunk`] if a thunk
    /// reaches the reducer. A panicking reducer unwinds through this call;
    /// the store keeps its previous state and stays usable.
    pub fn dispatch(&self, effect: impl Into<Dispatchable>) -> Result<Dispatched> {
        (self.inner.dispatch)(effect.into())
    }

    /// The current state.
    pub fn state(&self) -> Arc<State> {
        Arc::clone(&self.inner.state.read())
    }

    /// Register a listener called after every committed transition.
    ///
    /// Listeners run in registration order, outside the reducer lock, so
    /// they may dispatch. A listener added or removed while listeners are
    /// being notified takes effect from the next transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Store) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().retain(|(other, _)| *other != id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Names of the installed middleware, outermost first.
    pub fn middleware_names(&self) -> &[String] {
        &self.inner.middleware_names
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_instrumented(&self) -> bool {
        self.inner.recorder.is_some()
    }

    /// Number of recorded states, the initial one included.
    pub fn recorded_states(&self) -> Result<usize> {
        Ok(self.recorder()?.lock().len())
    }

    /// Recorded actions, oldest first.
    pub fn recorded_actions(&self) -> Result<Vec<Action>> {
        Ok(self
            .recorder()?
            .lock()
            .entries
            .iter()
            .map(|(action, _)| action.clone())
            .collect())
    }

    /// Index of the recorded state the store currently shows.
    pub fn current_index(&self) -> Result<usize> {
        Ok(self.recorder()?.lock().cursor)
    }

    /// Replace the current state with the `index`th recorded one.
    ///
    /// Neither middleware nor reducers run; listeners are notified. The next
    /// dispatch discards the recorded states after `index`.
    ///
    /// # Errors
    ///
    /// [`Error::NotInstrumented`] or [`Error::NoSuchState`].
    pub fn jump_to(&self, index: usize) -> Result<()> {
        let recorder = self.recorder()?;
        {
            let _serial = self.inner.dispatch_lock.lock();
            let mut recorder = recorder.lock();
            let state = recorder.state_at(index).ok_or(Error::NoSuchState {
                index,
                len: recorder.len(),
            })?;
            recorder.cursor = index;
            *self.inner.state.write() = state;
        }
        log::debug!("cartfold: jumped to recorded state {index}");
        self.notify();
        Ok(())
    }

    /// Jump back to the oldest recorded state.
    pub fn reset(&self) -> Result<()> {
        self.jump_to(0)
    }

    fn recorder(&self) -> Result<&Mutex<Recorder>> {
        self.inner.recorder.as_ref().ok_or(Error::NotInstrumented)
    }

    fn commit(&self, action: Action) -> Result<Dispatched> {
        {
            let _serial = self.inner.dispatch_lock.lock();
            let current = self.state();
            let next = self.inner.reducer.reduce(&current, &action);
            if let Some(recorder) = &self.inner.recorder {
                recorder.lock().record(action.clone(), Arc::clone(&next));
            }
            *self.inner.state.write() = next;
        }
        self.notify();
        Ok(Dispatched::Action(action))
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state())
            .field("middleware", &self.inner.middleware_names)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }

    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        WeakStore { inner: Weak::new() }
    }
}

fn core_dispatch(store: WeakStore) -> DispatchFn {
    Arc::new(move |effect| match effect {
        Dispatchable::Action(action) => store.upgrade().ok_or(Error::StoreGone)?.commit(action),
        Dispatchable::Thunk(_) => Err(Error::UnhandledThunk),
    })
}

/// Committed `(action, state)` pairs kept by an instrumented store.
struct Recorder {
    max_age: usize,
    base: Arc<State>,
    entries: VecDeque<(Action, Arc<State>)>,
    cursor: usize,
}

impl Recorder {
    fn new(max_age: usize, base: Arc<State>) -> Self {
        Recorder {
            max_age: max_age.max(1),
            base,
            entries: VecDeque::new(),
            cursor: 0,
        }
    }

    fn record(&mut self, action: Action, state: Arc<State>) {
        self.entries.truncate(self.cursor);
        self.entries.push_back((action, state));
        if self.entries.len() > self.max_age {
            if let Some((_, oldest)) = self.entries.pop_front() {
                self.base = oldest;
            }
        }
        self.cursor = self.entries.len();
    }

    fn len(&self) -> usize {
        self.entries.len() + 1
    }

    fn state_at(&self, index: usize) -> Option<Arc<State>> {
        match index {
            0 => Some(Arc::clone(&self.base)),
            i => self.entries.get(i - 1).map(|(_, state)| Arc::clone(state)),
        }
    }
}

/// Builder for a [`Store`].
///
/// Slice reducers registered with [`slice`](StoreBuilder::slice) are combined
/// into the root reducer; middleware is applied in registration order, the
/// first one outermost.
#[derive(Default)]
pub struct StoreBuilder {
    slices: CombinedReducer,
    reducer: Option<Box<dyn Reducer>>,
    preloaded: State,
    chain: Chain,
    max_age: Option<usize>,
}

impl StoreBuilder {
    /// Register a slice reducer.
    pub fn slice(mut self, key: &str, reducer: ReduceFn) -> Self {
        self.slices = self.slices.slice(key, reducer);
        self
    }

    /// Use a custom root reducer instead of combined slices.
    pub fn reducer(mut self, reducer: impl Reducer + 'static) -> Self {
        self.reducer = Some(Box::new(reducer));
        self
    }

    pub fn preloaded_state(mut self, state: State) -> Self {
        self.preloaded = state;
        self
    }

    /// Append a middleware. Earlier registrations wrap later ones.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.chain.push(Arc::new(middleware));
        self
    }

    pub fn middleware_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Record up to `max_age` committed transitions for time travel.
    pub fn instrument(mut self, max_age: usize) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Create the store and reduce [`Action::Init`] into the preloaded state.
    pub fn build(self) -> Store {
        let StoreBuilder {
            slices,
            reducer,
            preloaded,
            chain,
            max_age,
        } = self;

        let reducer: Box<dyn Reducer> = match reducer {
            Some(custom) => {
                if !slices.is_empty() {
                    log::warn!("cartfold: custom root reducer set, ignoring registered slices");
                }
                custom
            }
            None => {
                let unexpected = slices.unexpected_keys(&preloaded);
                if !unexpected.is_empty() {
                    log::debug!(
                        "cartfold: preloaded keys without a reducer are kept as-is: {unexpected:?}"
                    );
                }
                Box::new(slices)
            }
        };

        let initial = reducer.reduce(&Arc::new(preloaded), &Action::Init);
        let recorder = max_age.map(|max_age| Mutex::new(Recorder::new(max_age, Arc::clone(&initial))));
        let middleware_names = chain.names();
        log::debug!(
            "cartfold: store created with slices {:?}, middleware {:?}",
            initial.keys().collect::<Vec<_>>(),
            middleware_names
        );

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let store = WeakStore {
                inner: weak.clone(),
            };
            let dispatch = chain.build(&MiddlewareApi::new(store.clone()), core_dispatch(store));
            Inner {
                state: RwLock::new(initial),
                reducer,
                dispatch_lock: Mutex::new(()),
                dispatch,
                middleware_names,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                recorder,
            }
        });

        Store { inner }
    }
}

/// Create a store from a root reducer, a preloaded state and an ordered
/// middleware list.
pub fn create_store(
    reducer: impl Reducer + 'static,
    preloaded: State,
    middleware: impl IntoIterator<Item = Arc<dyn Middleware>>,
) -> Store {
    middleware
        .into_iter()
        .fold(
            Store::builder().reducer(reducer).preloaded_state(preloaded),
            StoreBuilder::middleware_arc,
        )
        .build()
}
