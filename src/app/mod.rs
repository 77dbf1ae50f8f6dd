//! Application layer: route registration and request dispatch.
//!
//! [`App::handle_request`] is the single callback the connection layer uses
//! to turn a complete [`Request`] into a [`Response`]. Lookup and handler
//! failures go through the [`ErrorHandler`]; a failure inside the error
//! handler itself falls back to a fixed 500 body.

mod blueprint;
mod error_handler;
mod handler;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{ErrorKind, HttpError};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::router::{Params, RouteError, Router};

pub use blueprint::Blueprint;
pub use error_handler::{ErrorHandler, ExceptionHandler};
pub use handler::{BoxedHandler, Handler, HandlerResult};

pub struct App {
    name: String,
    router: Router<BoxedHandler>,
    error_handler: ErrorHandler,
    blueprints: Vec<String>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            router: Router::new(),
            error_handler: ErrorHandler::new(),
            blueprints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the settings the app cares about: debug rendering and the
    /// router cache bound.
    pub fn configure(&mut self, config: &Config) {
        self.error_handler.set_debug(config.debug);
        self.router.resize_cache(config.router_cache_size);
    }

    pub fn router(&self) -> &Router<BoxedHandler> {
        &self.router
    }

    pub fn error_handler(&self) -> &ErrorHandler {
        &self.error_handler
    }

    /// Registers a handler. An empty `methods` accepts every method.
    pub fn route<F, Fut>(
        &mut self,
        uri: &str,
        methods: &[Method],
        handler: F,
    ) -> Result<&mut Self, RouteError>
    where
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_route(uri, methods, Arc::new(handler))?;
        Ok(self)
    }

    pub fn get<F, Fut>(&mut self, uri: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route(uri, &[Method::GET], handler)
    }

    pub fn post<F, Fut>(&mut self, uri: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route(uri, &[Method::POST], handler)
    }

    /// Renders every error of `kind` with `handler`.
    pub fn exception<F>(&mut self, kind: ErrorKind, handler: F) -> &mut Self
    where
        F: Fn(Option<&Request>, &HttpError) -> Result<Response, HttpError> + Send + Sync + 'static,
    {
        self.error_handler.add(kind, Arc::new(handler));
        self
    }

    /// Replays a blueprint's routes and error handlers onto this app.
    pub fn blueprint(&mut self, blueprint: Blueprint) -> Result<&mut Self, RouteError> {
        debug!(blueprint = blueprint.name(), routes = blueprint.routes.len(), "Registering blueprint");
        self.blueprints.push(blueprint.name().to_owned());
        for (uri, methods, handler) in blueprint.routes {
            self.add_route(&uri, &methods, handler)?;
        }
        for (kind, handler) in blueprint.exceptions {
            self.error_handler.add(kind, handler);
        }
        Ok(self)
    }

    /// Names of the registered blueprints, in registration order.
    pub fn blueprints(&self) -> &[String] {
        &self.blueprints
    }

    fn add_route(&mut self, uri: &str, methods: &[Method], handler: BoxedHandler) -> Result<(), RouteError> {
        self.router.add(uri, methods, handler)?;
        debug!(uri, ?methods, "Route registered");
        Ok(())
    }

    /// Looks up the handler, runs it, and renders any failure.
    pub async fn handle_request(&self, request: Arc<Request>) -> Response {
        let result = match self.router.get(&request.url, request.method) {
            Ok(matched) => {
                let call = matched.handler.call(Arc::clone(&request), matched.kwargs);
                match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => Err(HttpError::server_error("handler panicked")),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => response,
            Err(err) => match self.error_handler.response(Some(&request), &err) {
                Ok(response) => response,
                Err(nested) => {
                    error!(error = %nested, original = %err, path = %request.url, "Error while handling error");
                    self.error_handler.fallback(&nested)
                }
            },
        }
    }
}
