use std::future::Future;
use std::sync::Arc;

use crate::app::error_handler::ExceptionHandler;
use crate::app::handler::{BoxedHandler, HandlerResult};
use crate::error::{ErrorKind, HttpError};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::router::Params;

/// A group of routes and error handlers registered on an [`App`](super::App)
/// in one step, optionally under a common URL prefix.
///
/// ```
/// # use std::sync::Arc;
/// # use sprint::app::{App, Blueprint, HandlerResult};
/// # use sprint::http::{Method, Request, Response};
/// # use sprint::router::Params;
/// async fn list(_req: Arc<Request>, _params: Params) -> HandlerResult {
///     Ok(Response::text("[]"))
/// }
///
/// let mut api = Blueprint::new("api", Some("/api"));
/// api.route("/books", &[Method::GET], list);
///
/// let mut app = App::new("library");
/// app.blueprint(api).unwrap();
/// assert!(app.router().get("/api/books", Method::GET).is_ok());
/// ```
pub struct Blueprint {
    name: String,
    url_prefix: Option<String>,
    pub(crate) routes: Vec<(String, Vec<Method>, BoxedHandler)>,
    pub(crate) exceptions: Vec<(ErrorKind, ExceptionHandler)>,
}

impl Blueprint {
    pub fn new(name: impl Into<String>, url_prefix: Option<&str>) -> Self {
        Self {
            name: name.into(),
            url_prefix: url_prefix.map(str::to_owned),
            routes: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn route<F, Fut>(&mut self, uri: &str, methods: &[Method], handler: F) -> &mut Self
    where
        F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let uri = match &self.url_prefix {
            Some(prefix) => format!("{prefix}{uri}"),
            None => uri.to_owned(),
        };
        let handler: BoxedHandler = Arc::new(handler);
        self.routes.push((uri, methods.to_vec(), handler));
        self
    }

    pub fn exception<F>(&mut self, kind: ErrorKind, handler: F) -> &mut Self
    where
        F: Fn(Option<&Request>, &HttpError) -> Result<Response, HttpError> + Send + Sync + 'static,
    {
        let handler: ExceptionHandler = Arc::new(handler);
        self.exceptions.push((kind, handler));
        self
    }
}
