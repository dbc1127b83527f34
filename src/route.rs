//! Route resolution: URL patterns mapped to lazily loaded view modules.
//!
//! Every loader, whether the module is fetched later or already in memory,
//! answers through the same future type. [`RouteTable::resolve_with`] keeps
//! the callback protocol on top of it: a module that is already available is
//! delivered before `resolve_with` returns, a deferred one when it arrives.
//! Every load is bounded by [`RouterConfig::load_timeout`].

use crate::error::RouteError;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;

/// Handle to a loaded view module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewModule {
    /// Component name, e.g. `CartContainer`.
    pub name: String,
    /// Chunk the module was loaded from.
    pub chunk: String,
}

impl ViewModule {
    pub fn new(name: impl Into<String>, chunk: impl Into<String>) -> Self {
        ViewModule {
            name: name.into(),
            chunk: chunk.into(),
        }
    }
}

/// A successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub pattern: String,
    pub pathname: String,
    pub params: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Future of a view module.
pub type LoadFuture = BoxFuture<'static, Result<ViewModule, RouteError>>;

/// Produces the view module for a matched route.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, route: &RouteMatch) -> LoadFuture;
}

/// Loader for a module that is already in memory.
///
/// The fallback for hosts without deferred loading: its future is ready on
/// first poll, so callbacks fire synchronously.
#[derive(Debug, Clone)]
pub struct EagerLoader {
    module: ViewModule,
}

impl EagerLoader {
    pub fn new(module: ViewModule) -> Self {
        EagerLoader { module }
    }
}

impl ModuleLoader for EagerLoader {
    fn load(&self, _route: &RouteMatch) -> LoadFuture {
        future::ready(Ok(self.module.clone())).boxed()
    }
}

type FetchFn = dyn Fn(RouteMatch) -> LoadFuture + Send + Sync;

/// Loader backed by an async function, e.g. a chunk fetch.
#[derive(Clone)]
pub struct DeferredLoader {
    fetch: Arc<FetchFn>,
}

impl DeferredLoader {
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(RouteMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ViewModule, RouteError>> + Send + 'static,
    {
        DeferredLoader {
            fetch: Arc::new(move |route| fetch(route).boxed()),
        }
    }
}

impl ModuleLoader for DeferredLoader {
    fn load(&self, route: &RouteMatch) -> LoadFuture {
        (self.fetch)(route.clone())
    }
}

impl fmt::Debug for DeferredLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredLoader(..)")
    }
}

/// Router configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Upper bound on a single module load.
    #[serde(with = "millis")]
    pub load_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            load_timeout: Duration::from_secs(30),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Param(String),
    Splat,
    Open,
    Close,
}

/// A compiled route pattern.
///
/// Supports literal text, `:name` parameters (one non-empty segment),
/// optional groups in parentheses and a `*` splat captured as `splat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
}

impl Pattern {
    /// Compile `source`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Pattern`] for unbalanced parentheses or a `:`
    /// without a name.
    pub fn parse(source: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::Pattern {
            pattern: source.to_string(),
            reason: reason.to_string(),
        };

        let mut tokens = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                ':' => {
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if n.is_alphanumeric() || n == '_' {
                            name.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(invalid("parameter without a name"));
                    }
                    flush(&mut text, &mut tokens);
                    tokens.push(Token::Param(name));
                }
                '*' => {
                    flush(&mut text, &mut tokens);
                    tokens.push(Token::Splat);
                }
                '(' => {
                    flush(&mut text, &mut tokens);
                    depth += 1;
                    tokens.push(Token::Open);
                }
                ')' => {
                    if depth == 0 {
                        return Err(invalid("unbalanced ')'"));
                    }
                    flush(&mut text, &mut tokens);
                    depth -= 1;
                    tokens.push(Token::Close);
                }
                c => text.push(c),
            }
        }
        if depth != 0 {
            return Err(invalid("unclosed '('"));
        }
        flush(&mut text, &mut tokens);

        Ok(Pattern {
            source: source.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a pathname, returning the captured parameters.
    ///
    /// ```
    /// use cartfold::Pattern;
    ///
    /// let pattern = Pattern::parse("/cart(/:item)").unwrap();
    /// assert_eq!(pattern.matches("/cart").unwrap().len(), 0);
    /// assert_eq!(pattern.matches("/cart/42").unwrap()["item"], "42");
    /// assert!(pattern.matches("/cart/42/x").is_none());
    /// ```
    pub fn matches(&self, pathname: &str) -> Option<BTreeMap<String, String>> {
        let mut params = Vec::new();
        if match_tokens(&self.tokens, pathname, &mut params) {
            Some(params.into_iter().collect())
        } else {
            None
        }
    }
}

fn flush(text: &mut String, tokens: &mut Vec<Token>) {
    if !text.is_empty() {
        tokens.push(Token::Text(std::mem::take(text)));
    }
}

fn match_tokens(tokens: &[Token], path: &str, params: &mut Vec<(String, String)>) -> bool {
    let Some((token, rest)) = tokens.split_first() else {
        return path.is_empty() || path == "/";
    };

    match token {
        Token::Text(text) => path
            .strip_prefix(text.as_str())
            .is_some_and(|remaining| match_tokens(rest, remaining, params)),
        Token::Param(name) => {
            let segment = path.find(['/', '?', '#']).unwrap_or(path.len());
            for end in (1..=segment).rev() {
                if !path.is_char_boundary(end) {
                    continue;
                }
                params.push((name.clone(), path[..end].to_string()));
                if match_tokens(rest, &path[end..], params) {
                    return true;
                }
                params.pop();
            }
            false
        }
        Token::Splat => {
            for end in 0..=path.len() {
                if !path.is_char_boundary(end) {
                    continue;
                }
                params.push(("splat".to_string(), path[..end].to_string()));
                if match_tokens(rest, &path[end..], params) {
                    return true;
                }
                params.pop();
            }
            false
        }
        Token::Open => {
            let checkpoint = params.len();
            if match_tokens(rest, path, params) {
                return true;
            }
            params.truncate(checkpoint);
            match_tokens(skip_group(rest), path, params)
        }
        Token::Close => match_tokens(rest, path, params),
    }
}

/// Tokens after the `Close` matching an already consumed `Open`.
fn skip_group(tokens: &[Token]) -> &[Token] {
    let mut depth = 1usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth -= 1;
                if depth == 0 {
                    return &tokens[i + 1..];
                }
            }
            _ => {}
        }
    }
    &[]
}

/// A pattern plus the loader of its view.
#[derive(Clone)]
pub struct Route {
    pattern: Pattern,
    loader: Arc<dyn ModuleLoader>,
}

impl Route {
    pub fn new(pattern: &str, loader: impl ModuleLoader + 'static) -> Result<Self, RouteError> {
        Ok(Route {
            pattern: Pattern::parse(pattern)?,
            loader: Arc::new(loader),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Registered routes, tried in registration order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    config: RouterConfig,
}

impl RouteTable {
    pub fn new(config: RouterConfig) -> Self {
        RouteTable {
            routes: Vec::new(),
            config,
        }
    }

    /// Register a route.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Pattern`] if the pattern does not parse.
    pub fn route(
        mut self,
        pattern: &str,
        loader: impl ModuleLoader + 'static,
    ) -> Result<Self, RouteError> {
        self.routes.push(Route::new(pattern, loader)?);
        Ok(self)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(Route::pattern)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// First route matching `path`. Search and hash are ignored.
    pub fn match_path(&self, path: &str) -> Option<(&Route, RouteMatch)> {
        let pathname = path.split(['?', '#']).next().unwrap_or(path);
        self.routes.iter().find_map(|route| {
            route.pattern.matches(pathname).map(|params| {
                let matched = RouteMatch {
                    pattern: route.pattern().to_string(),
                    pathname: pathname.to_string(),
                    params,
                };
                (route, matched)
            })
        })
    }

    /// Start loading the view for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NoMatch`] if no route matches; no loader runs.
    pub fn resolve(&self, path: &str) -> Result<Resolution, RouteError> {
        let (route, matched) = self
            .match_path(path)
            .ok_or_else(|| RouteError::NoMatch(path.to_string()))?;
        log::debug!("cartfold: {path} matched route {}", matched.pattern);
        let load = route.loader.load(&matched);
        Ok(Resolution {
            route: matched,
            load,
            timeout: self.config.load_timeout,
            deadline: None,
        })
    }

    /// Load the view for `path` and hand the result to `callback`.
    ///
    /// `callback` runs exactly once: before this call returns when the module
    /// is already available, otherwise on the tokio runtime when the load
    /// completes or times out.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NoMatch`] without invoking `callback` if no route
    /// matches.
    pub fn resolve_with<F>(&self, path: &str, callback: F) -> Result<(), RouteError>
    where
        F: FnOnce(Result<ViewModule, RouteError>) + Send + 'static,
    {
        let mut resolution = self.resolve(path)?;
        if let Some(result) = (&mut resolution).now_or_never() {
            callback(result);
            return Ok(());
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { callback(resolution.await) });
            }
            Err(_) => callback(Err(RouteError::NoRuntime(path.to_string()))),
        }
        Ok(())
    }
}

/// An in-flight view load.
///
/// Resolves to the module, [`RouteError::Load`] from the loader, or
/// [`RouteError::Timeout`]. The timeout is armed on the first poll that
/// finds the load pending, which requires a tokio runtime.
pub struct Resolution {
    route: RouteMatch,
    load: LoadFuture,
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Resolution {
    pub fn route(&self) -> &RouteMatch {
        &self.route
    }
}

impl Future for Resolution {
    type Output = Result<ViewModule, RouteError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(result) = self.load.as_mut().poll(cx) {
            return Poll::Ready(result);
        }

        if self.deadline.is_none() {
            if tokio::runtime::Handle::try_current().is_err() {
                return Poll::Ready(Err(RouteError::NoRuntime(self.route.pathname.clone())));
            }
            self.deadline = Some(Box::pin(tokio::time::sleep(self.timeout)));
        }

        let expired = self
            .deadline
            .as_mut()
            .is_some_and(|deadline| deadline.as_mut().poll(cx).is_ready());
        if expired {
            log::warn!(
                "cartfold: view for {} did not load within {:?}",
                self.route.pathname,
                self.timeout
            );
            return Poll::Ready(Err(RouteError::Timeout {
                route: self.route.pathname.clone(),
                timeout: self.timeout,
            }));
        }
        Poll::Pending
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("route", &self.route)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
