use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{Signal as UnixSignal, kill};
use nix::unistd::Pid;

use sprint::app::{App, HandlerResult};
use sprint::http::request::Request;
use sprint::http::response::Response;
use sprint::router::Params;
use sprint::server::{Clock, Server};
use sprint::{Config, HttpError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn show_user(_req: Arc<Request>, params: Params) -> HandlerResult {
    let id = params
        .get_int("id")
        .ok_or_else(|| HttpError::server_error("missing id"))?;
    Ok(Response::text(format!("id={id}")))
}

async fn echo(req: Arc<Request>, _params: Params) -> HandlerResult {
    Ok(Response::bytes(req.body.clone(), "application/octet-stream"))
}

async fn slow(_req: Arc<Request>, _params: Params) -> HandlerResult {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(Response::text("late"))
}

struct TestServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
    }
}

fn start(config: Config, clock: Option<Clock>) -> TestServer {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut app = App::new("test");
    app.get("/users/<id:int>", show_user)
        .unwrap()
        .post("/echo", echo)
        .unwrap()
        .get("/slow", slow)
        .unwrap();

    let mut server = Server::new(config, app).with_listener(listener);
    if let Some(clock) = clock {
        server = server.with_clock(clock);
    }

    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_until(async {
        let _ = stopped.await;
    }));
    TestServer { addr, stop, handle }
}

/// Raw HTTP client that keeps bytes read past the current response.
struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: Vec::new(),
        }
    }

    async fn send(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).await.unwrap();
    }

    /// Reads one response whose body length is given by Content-Length.
    async fn read_response(&mut self) -> String {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(end) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let total = end + 4 + length;
                if self.buf.len() >= total {
                    let response: Vec<u8> = self.buf.drain(..total).collect();
                    return String::from_utf8_lossy(&response).into_owned();
                }
            }
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-response");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Asserts the server closes the connection without sending more.
    async fn expect_closed(&mut self) {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        assert!(self.buf.is_empty() && rest.is_empty());
    }
}

async fn roundtrip(addr: SocketAddr, raw: &[u8]) -> String {
    let mut client = Client::connect(addr).await;
    client.send(raw).await;
    client.read_response().await
}

#[tokio::test]
async fn test_end_to_end_user_route() {
    let server = start(Config::default(), None);

    let ok = roundtrip(server.addr, b"GET /users/42 HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert!(ok.starts_with("HTTP/1.1 200 OK\r\n"), "{ok}");
    assert!(ok.ends_with("\r\n\r\nid=42"));

    let missing = roundtrip(server.addr, b"GET /users/abc HTTP/1.1\r\n\r\n").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"), "{missing}");

    let wrong = roundtrip(server.addr, b"POST /users/42 HTTP/1.1\r\n\r\n").await;
    assert!(wrong.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{wrong}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_keep_alive_serves_sequential_requests() {
    let server = start(Config::default(), None);
    let mut client = Client::connect(server.addr).await;

    client
        .send(b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\none")
        .await;
    let first = client.read_response().await;
    assert!(first.contains("Connection: keep-alive\r\n"));
    assert!(first.ends_with("one"));

    // Two requests in one write are answered in order.
    client
        .send(b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\ntwo\
                POST /echo HTTP/1.1\r\nContent-Length: 5\r\nConnection: close\r\n\r\nthree")
        .await;
    let second = client.read_response().await;
    assert!(second.ends_with("two"));
    let third = client.read_response().await;
    assert!(third.contains("Connection: close\r\n"));
    assert!(third.ends_with("three"));

    client.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_request_gets_bad_request() {
    let server = start(Config::default(), None);

    let response = roundtrip(server.addr, b"NOT-HTTP\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert!(response.contains("Connection: close\r\n"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_body_gets_payload_too_large() {
    let config = Config {
        request_max_size: Some(64),
        ..Config::default()
    };
    let server = start(config, None);

    let response = roundtrip(
        server.addr,
        b"POST /echo HTTP/1.1\r\nContent-Length: 1000\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 413 Request Entity Too Large\r\n"), "{response}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let clock = Clock::manual(0);
    let server = start(Config::default(), Some(clock.clone()));

    let mut client = Client::connect(server.addr).await;
    client.send(b"GET /users/1 HT").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    clock.advance(Duration::from_secs(61));
    let response = client.read_response().await;
    assert!(response.starts_with("HTTP/1.1 408 Request Timeout\r\n"), "{response}");

    client.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_timeout_cancels_running_handler() {
    let clock = Clock::manual(0);
    let server = start(Config::default(), Some(clock.clone()));

    let mut client = Client::connect(server.addr).await;
    client.send(b"GET /slow HTTP/1.1\r\n\r\n").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    clock.advance(Duration::from_secs(61));
    let response = client.read_response().await;
    assert!(response.starts_with("HTTP/1.1 408 Request Timeout\r\n"), "{response}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_idle_connections() {
    let server = start(Config::default(), None);

    let mut client = Client::connect(server.addr).await;
    client.send(b"GET /users/7 HTTP/1.1\r\n\r\n").await;
    let response = client.read_response().await;
    assert!(response.contains("Connection: keep-alive\r\n"));

    server.shutdown().await;
    client.expect_closed().await;
}

async fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server never started listening on {addr}");
}

#[tokio::test]
async fn test_prefork_workers_share_port_and_are_reaped() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let child = Command::new(env!("CARGO_BIN_EXE_sprint"))
        .env_remove("SPRINT_CONFIG")
        .env("SPRINT_HOST", "127.0.0.1")
        .env("SPRINT_PORT", port.to_string())
        .env("SPRINT_WORKERS", "2")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    wait_until_listening(addr).await;

    for _ in 0..8 {
        let response = roundtrip(addr, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("Hello from Sprint\n"));
    }
    // Let the supervisor install its signal handler.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let pid = Pid::from_raw(child.id().unwrap() as i32);
    kill(pid, UnixSignal::SIGTERM).unwrap();

    let output = tokio::time::timeout(Duration::from_secs(20), child.wait_with_output())
        .await
        .expect("supervisor did not exit after SIGTERM")
        .unwrap();
    assert!(output.status.success(), "{:?}", output.status);

    let log = String::from_utf8_lossy(&output.stdout);
    assert_eq!(log.matches("Started worker").count(), 2, "{log}");
    assert_eq!(log.matches("Worker reaped").count(), 2, "{log}");

    // No worker is left holding the socket.
    assert!(TcpStream::connect(addr).await.is_err());
}
