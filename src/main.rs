use std::sync::Arc;

use serde_json::json;
use sprint::app::HandlerResult;
use sprint::http::{Request, Response};
use sprint::router::Params;
use sprint::{App, Config, HttpError, Server};
use tracing::Level;

async fn index(_req: Arc<Request>, _params: Params) -> HandlerResult {
    Ok(Response::text("Hello from Sprint\n"))
}

async fn show_user(_req: Arc<Request>, params: Params) -> HandlerResult {
    let id = params
        .get_int("id")
        .ok_or_else(|| HttpError::server_error("missing id"))?;
    Response::json(&json!({ "id": id }))
}

async fn echo(req: Arc<Request>, _params: Params) -> HandlerResult {
    Response::json(req.json()?)
}

fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cfg.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let mut app = App::new("sprint");
    app.get("/", index)?
        .get("/users/<id:int>", show_user)?
        .post("/echo", echo)?;

    Server::new(cfg, app).run()
}
