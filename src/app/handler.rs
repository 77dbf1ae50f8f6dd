use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::router::Params;

pub type HandlerResult = Result<Response, HttpError>;

/// An async request handler.
///
/// Implemented for every `Fn(Arc<Request>, Params) -> impl Future` closure or
/// `async fn`, so handlers are usually written as plain functions:
///
/// ```
/// # use std::sync::Arc;
/// # use sprint::app::HandlerResult;
/// # use sprint::http::{Request, Response};
/// # use sprint::router::Params;
/// async fn show_user(_req: Arc<Request>, params: Params) -> HandlerResult {
///     Ok(Response::text(format!("user {}", params.get_int("id").unwrap_or_default())))
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Arc<Request>, params: Params) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<Request>, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Arc<Request>, params: Params) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(request, params))
    }
}

/// Shared handler reference stored in the router.
pub type BoxedHandler = Arc<dyn Handler>;
