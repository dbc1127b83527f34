//! Action/state logging middleware.

use crate::action::{Action, Dispatchable, Dispatched};
use crate::error::{Error, Result};
use crate::middleware::{DispatchFn, Middleware, MiddlewareApi};
use crate::state::State;
use log::Level;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// `log` target used by [`LogCrateSink`].
pub const LOG_TARGET: &str = "cartfold::logger";

/// Receives what the logger middleware observes.
///
/// A sink that panics is contained by the middleware; the dispatch carries on.
pub trait LogSink: Send + Sync {
    /// An action is about to be forwarded.
    fn action(&self, level: Level, action: &Action);

    /// The state after the forwarded action was handled.
    fn state(&self, level: Level, state: &State, elapsed: Option<Duration>);

    /// A thunk passed through without being logged as an action.
    fn thunk(&self, level: Level);

    /// The inner layers returned an error.
    fn failed(&self, level: Level, action: &str, error: &Error);
}

/// Writes through the `log` facade under [`LOG_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn action(&self, level: Level, action: &Action) {
        match serde_json::to_string(action) {
            Ok(json) => log::log!(target: LOG_TARGET, level, "action {} {json}", action.kind()),
            Err(e) => log::log!(
                target: LOG_TARGET,
                level,
                "action {} <unserializable: {e}>",
                action.kind()
            ),
        }
    }

    fn state(&self, level: Level, state: &State, elapsed: Option<Duration>) {
        let snapshot = serde_json::to_string(state)
            .unwrap_or_else(|e| format!("<unserializable state: {e}>"));
        match elapsed {
            Some(elapsed) => {
                log::log!(target: LOG_TARGET, level, "next state (took {elapsed:?}) {snapshot}")
            }
            None => log::log!(target: LOG_TARGET, level, "next state {snapshot}"),
        }
    }

    fn thunk(&self, level: Level) {
        log::log!(target: LOG_TARGET, level, "thunk passed through the logger");
    }

    fn failed(&self, _level: Level, action: &str, error: &Error) {
        log::warn!(target: LOG_TARGET, "action {action} failed: {error}");
    }
}

/// Decides whether an action is logged, given the state before it.
pub type LogPredicate = fn(&State, &Action) -> bool;

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub level: Level,
    /// Only log actions for which this returns `true`. `None` logs all.
    pub predicate: Option<LogPredicate>,
    /// Report how long the inner layers took.
    pub duration: bool,
    /// Log the state snapshot after each action.
    pub log_state: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        LoggerOptions {
            level: Level::Info,
            predicate: None,
            duration: false,
            log_state: true,
        }
    }
}

/// Logs every action before forwarding it and the resulting state after.
///
/// Neither the action nor the chain's return value is altered, and nothing
/// the sink does can fail the dispatch. Place it after
/// [`ThunkMiddleware`](crate::ThunkMiddleware) so it only ever sees plain
/// actions.
pub struct LoggerMiddleware {
    options: LoggerOptions,
    sink: Arc<dyn LogSink>,
}

impl LoggerMiddleware {
    pub fn new(options: LoggerOptions) -> Self {
        LoggerMiddleware {
            options,
            sink: Arc::new(LogCrateSink),
        }
    }

    /// Send entries to `sink` instead of the `log` facade.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> &LoggerOptions {
        &self.options
    }

    fn emit(&self, f: impl FnOnce(&dyn LogSink)) {
        let sink = self.sink.as_ref();
        if panic::catch_unwind(AssertUnwindSafe(|| f(sink))).is_err() {
            log::error!(target: LOG_TARGET, "log sink panicked; entry dropped");
        }
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        LoggerMiddleware::new(LoggerOptions::default())
    }
}

impl fmt::Debug for LoggerMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerMiddleware")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &str {
        "logger"
    }

    fn handle(
        &self,
        api: &MiddlewareApi,
        effect: Dispatchable,
        next: &DispatchFn,
    ) -> Result<Dispatched> {
        let level = self.options.level;
        let action = match effect {
            Dispatchable::Action(action) => action,
            thunk => {
                self.emit(|sink| sink.thunk(level));
                return next(thunk);
            }
        };

        if let Some(predicate) = self.options.predicate {
            let wanted = api
                .state()
                .map(|state| predicate(&state, &action))
                .unwrap_or(true);
            if !wanted {
                return next(action.into());
            }
        }

        self.emit(|sink| sink.action(level, &action));
        let kind = action.kind().to_string();
        let started = Instant::now();
        let result = next(action.into());
        let elapsed = self.options.duration.then(|| started.elapsed());

        match &result {
            Ok(_) => {
                if self.options.log_state {
                    if let Ok(state) = api.state() {
                        self.emit(|sink| sink.state(level, &state, elapsed));
                    }
                }
            }
            Err(e) => self.emit(|sink| sink.failed(level, &kind, e)),
        }
        result
    }
}
