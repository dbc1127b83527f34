//! Navigation-history engines.

use crate::subscription::Subscription;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// How the engine arrived at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NavigationAction {
    Push,
    Replace,
    Pop,
}

/// One entry of the navigation stack.
///
/// `key` is unique per entry; `index` is the entry's position in the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub pathname: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub hash: String,
    pub key: String,
    pub action: NavigationAction,
    pub index: usize,
}

impl Location {
    /// Split `path` into pathname, search and hash.
    ///
    /// ```
    /// use cartfold::{Location, NavigationAction};
    ///
    /// let location = Location::parse("/cart/42?tab=info#top", NavigationAction::Push, "k1", 3);
    /// assert_eq!(location.pathname, "/cart/42");
    /// assert_eq!(location.search, "?tab=info");
    /// assert_eq!(location.hash, "#top");
    /// assert_eq!(location.path(), "/cart/42?tab=info#top");
    /// ```
    pub fn parse(
        path: &str,
        action: NavigationAction,
        key: impl Into<String>,
        index: usize,
    ) -> Self {
        let (rest, hash) = match path.find('#') {
            Some(i) => (&path[..i], &path[i..]),
            None => (path, ""),
        };
        let (pathname, search) = match rest.find('?') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let pathname = if pathname.starts_with('/') {
            pathname.to_string()
        } else {
            format!("/{pathname}")
        };
        Location {
            pathname,
            search: search.to_string(),
            hash: hash.to_string(),
            key: key.into(),
            action,
            index,
        }
    }

    /// Pathname, search and hash joined back together.
    pub fn path(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

/// Callback invoked with every new location.
pub type HistoryListener = Arc<dyn Fn(&Location) + Send + Sync>;

/// A navigation-history engine.
pub trait History: Send + Sync {
    /// The current location.
    fn location(&self) -> Location;

    /// Add an entry after the current one, discarding any forward entries.
    fn push(&self, path: &str);

    /// Overwrite the current entry.
    fn replace(&self, path: &str);

    /// Move `delta` entries through the stack. Out-of-range moves are ignored.
    fn go(&self, delta: isize);

    fn go_back(&self) {
        self.go(-1);
    }

    fn go_forward(&self) {
        self.go(1);
    }

    /// Move to `location`, honoring its [`NavigationAction`].
    fn transition_to(&self, location: &Location);

    fn listen(&self, listener: HistoryListener) -> Subscription;
}

/// In-memory history engine.
///
/// Clones share the same stack.
#[derive(Clone)]
pub struct MemoryHistory {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    stack: Mutex<Stack>,
    listeners: Mutex<Vec<(u64, HistoryListener)>>,
    next_listener: AtomicU64,
    next_key: AtomicU64,
}

struct Stack {
    entries: Vec<Location>,
    index: usize,
}

impl MemoryHistory {
    /// Start with a single entry at `initial_path`.
    pub fn new(initial_path: &str) -> Self {
        let inner = MemoryInner {
            stack: Mutex::new(Stack {
                entries: Vec::new(),
                index: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            next_key: AtomicU64::new(0),
        };
        let first = Location::parse(initial_path, NavigationAction::Pop, inner.key(), 0);
        inner.stack.lock().entries.push(first);
        MemoryHistory {
            inner: Arc::new(inner),
        }
    }

    /// Number of entries in the stack.
    pub fn len(&self) -> usize {
        self.inner.stack.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of every entry, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.inner
            .stack
            .lock()
            .entries
            .iter()
            .map(Location::path)
            .collect()
    }

    fn push_location(&self, path: &str, action: NavigationAction) {
        let location = {
            let mut stack = self.inner.stack.lock();
            let index = stack.index + 1;
            stack.entries.truncate(index);
            let location = Location::parse(path, action, self.inner.key(), index);
            stack.entries.push(location.clone());
            stack.index = index;
            location
        };
        self.inner.notify(&location);
    }

    fn replace_location(&self, path: &str) {
        let location = {
            let mut stack = self.inner.stack.lock();
            let index = stack.index;
            let location = Location::parse(path, NavigationAction::Replace, self.inner.key(), index);
            stack.entries[index] = location.clone();
            location
        };
        self.inner.notify(&location);
    }

    fn pop_to(&self, target: usize) {
        let location = {
            let mut stack = self.inner.stack.lock();
            if target == stack.index || target >= stack.entries.len() {
                return;
            }
            stack.index = target;
            let entry = &mut stack.entries[target];
            entry.action = NavigationAction::Pop;
            entry.clone()
        };
        self.inner.notify(&location);
    }
}

impl MemoryInner {
    fn key(&self) -> String {
        format!("k{}", self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    fn notify(&self, location: &Location) {
        let listeners: Vec<HistoryListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(location);
        }
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let stack = self.inner.stack.lock();
        stack.entries[stack.index].clone()
    }

    fn push(&self, path: &str) {
        self.push_location(path, NavigationAction::Push);
    }

    fn replace(&self, path: &str) {
        self.replace_location(path);
    }

    fn go(&self, delta: isize) {
        let current = self.inner.stack.lock().index;
        match current.checked_add_signed(delta) {
            Some(target) => self.pop_to(target),
            None => log::debug!("cartfold: ignoring history.go({delta}) past the first entry"),
        }
    }

    fn transition_to(&self, location: &Location) {
        let path = location.path();
        match location.action {
            NavigationAction::Push => self.push_location(&path, NavigationAction::Push),
            NavigationAction::Replace => self.replace_location(&path),
            NavigationAction::Pop => {
                let target = self
                    .inner
                    .stack
                    .lock()
                    .entries
                    .iter()
                    .position(|entry| entry.key == location.key);
                match target {
                    Some(target) => self.pop_to(target),
                    None => self.push_location(&path, NavigationAction::Push),
                }
            }
        }
    }

    fn listen(&self, listener: HistoryListener) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().retain(|(other, _)| *other != id);
            }
        })
    }
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.inner.stack.lock();
        f.debug_struct("MemoryHistory")
            .field("index", &stack.index)
            .field("entries", &stack.entries.len())
            .finish()
    }
}
