//! URL router.
//!
//! Routes are split into three partitions when registered:
//!
//! - **static**: no parameters, looked up by exact path.
//! - **dynamic**: parameters that cannot match `/`, bucketed by the number
//!   of `/` in the URI so a lookup only scans routes of the same depth.
//! - **always-check**: parameters that may match `/`, scanned in
//!   registration order on every miss.
//!
//! Successful resolutions are memoized per `(url, method)` in a bounded LRU.
//! Routes are registered before serving and never change afterwards, so
//! cache entries are only ever evicted, never invalidated.

mod params;
pub mod pattern;

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use thiserror::Error;

use crate::error::HttpError;
use crate::http::request::Method;

pub use params::{ParamValue, Params};
pub use pattern::{ParamType, Parameter};

pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Startup-time registration failures.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Route already registered: {0}")]
    RouteConflict(String),
    #[error("invalid route pattern {uri}: {reason}")]
    InvalidPattern { uri: String, reason: String },
}

#[derive(Debug)]
pub struct Route<H> {
    pub uri: String,
    pub handler: H,
    /// `None` accepts any method.
    pub methods: Option<HashSet<Method>>,
    pub pattern: regex::Regex,
    pub parameters: Vec<Parameter>,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<H> {
    pub handler: H,
    /// Positional arguments. Always empty: every capture is named.
    pub args: Vec<ParamValue>,
    pub kwargs: Params,
}

pub struct Router<H> {
    routes_all: HashMap<String, Arc<Route<H>>>,
    routes_static: HashMap<String, Arc<Route<H>>>,
    routes_dynamic: HashMap<usize, Vec<Arc<Route<H>>>>,
    routes_always_check: Vec<Arc<Route<H>>>,
    cache: Mutex<LruCache<(String, Method), RouteMatch<H>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<H: Clone> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of `/` in a path; the dynamic-partition bucket key.
fn url_hash(url: &str) -> usize {
    url.bytes().filter(|b| *b == b'/').count()
}

impl<H: Clone> Router<H> {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(capacity: usize) -> Self {
        Self {
            routes_all: HashMap::new(),
            routes_static: HashMap::new(),
            routes_dynamic: HashMap::new(),
            routes_always_check: Vec::new(),
            cache: Mutex::new(LruCache::new(cache_capacity(capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Changes the resolution cache bound, evicting the oldest entries if needed.
    pub fn resize_cache(&mut self, capacity: usize) {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(cache_capacity(capacity));
    }

    /// Registers `handler` for `uri`. An empty `methods` accepts any method.
    ///
    /// # Errors
    ///
    /// [`RouteError::RouteConflict`] if this exact URI string is already
    /// registered (whatever its methods), [`RouteError::InvalidPattern`] if a
    /// placeholder does not compile.
    pub fn add(&mut self, uri: &str, methods: &[Method], handler: H) -> Result<(), RouteError> {
        if self.routes_all.contains_key(uri) {
            return Err(RouteError::RouteConflict(uri.to_owned()));
        }

        let compiled = pattern::compile(uri)?;
        let methods = (!methods.is_empty()).then(|| methods.iter().copied().collect());
        let route = Arc::new(Route {
            uri: uri.to_owned(),
            handler,
            methods,
            pattern: compiled.regex,
            parameters: compiled.parameters,
        });

        self.routes_all.insert(uri.to_owned(), Arc::clone(&route));
        if compiled.unhashable {
            self.routes_always_check.push(route);
        } else if !route.parameters.is_empty() {
            self.routes_dynamic
                .entry(url_hash(uri))
                .or_default()
                .push(route);
        } else {
            self.routes_static.insert(uri.to_owned(), route);
        }
        Ok(())
    }

    /// Resolves a request path and method to a handler and its arguments.
    ///
    /// # Errors
    ///
    /// [`HttpError::NotFound`] when no route matches the path,
    /// [`HttpError::MethodNotAllowed`] when one does but rejects `method`.
    pub fn get(&self, url: &str, method: Method) -> Result<RouteMatch<H>, HttpError> {
        let key = (url.to_owned(), method);
        if let Some(hit) = self.lock_cache().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let resolved = self.resolve(url, method)?;
        self.lock_cache().put(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve(&self, url: &str, method: Method) -> Result<RouteMatch<H>, HttpError> {
        let (route, captures) = match self.routes_static.get(url) {
            Some(route) => (route, None),
            None => self
                .routes_dynamic
                .get(&url_hash(url))
                .into_iter()
                .flatten()
                .chain(self.routes_always_check.iter())
                .find_map(|route| route.pattern.captures(url).map(|c| (route, Some(c))))
                .ok_or_else(|| HttpError::not_found(format!("Requested URL {url} not found")))?,
        };

        if let Some(methods) = &route.methods {
            if !methods.contains(&method) {
                return Err(HttpError::MethodNotAllowed {
                    method,
                    url: url.to_owned(),
                });
            }
        }

        let mut kwargs = Params::new();
        if let Some(captures) = captures {
            for (index, parameter) in route.parameters.iter().enumerate() {
                let raw = captures
                    .name(&pattern::CompiledPattern::group_name(index))
                    .map_or("", |m| m.as_str());
                let value = parameter.kind.cast(raw).ok_or_else(|| {
                    HttpError::server_error(format!(
                        "cannot cast {raw:?} for parameter {} of route {}",
                        parameter.name, route.uri
                    ))
                })?;
                kwargs.insert(parameter.name.clone(), value);
            }
        }

        Ok(RouteMatch {
            handler: route.handler.clone(),
            args: Vec::new(),
            kwargs,
        })
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<(String, Method), RouteMatch<H>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total registered routes.
    pub fn len(&self) -> usize {
        self.routes_all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes_all.is_empty()
    }

    /// Lookups answered from the resolution cache.
    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that had to scan the partitions.
    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
