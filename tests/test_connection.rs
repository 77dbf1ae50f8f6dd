use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use sprint::app::{App, HandlerResult};
use sprint::http::connection::{Connection, ConnectionContext};
use sprint::http::protocol::ProtocolSettings;
use sprint::http::request::Request;
use sprint::http::response::Response;
use sprint::router::Params;
use sprint::server::{Clock, Signal};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

async fn index(_req: Arc<Request>, _params: Params) -> HandlerResult {
    Ok(Response::text("hello"))
}

/// Serves one request, then counts writes that never succeed.
struct DeadWriter {
    request: Option<Vec<u8>>,
    writes: Arc<AtomicUsize>,
    /// Block forever instead of failing.
    stall: bool,
}

impl DeadWriter {
    fn new(stall: bool) -> (Self, Arc<AtomicUsize>) {
        let writes = Arc::new(AtomicUsize::new(0));
        let stream = Self {
            request: Some(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec()),
            writes: Arc::clone(&writes),
            stall,
        };
        (stream, writes)
    }
}

impl AsyncRead for DeadWriter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(request) = self.request.take() {
            buf.put_slice(&request);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for DeadWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            Poll::Pending
        } else {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn context() -> ConnectionContext {
    let mut app = App::new("test");
    app.get("/", index).unwrap();
    ConnectionContext {
        app: Arc::new(app),
        clock: Clock::manual(0),
        signal: Signal::new(),
        settings: ProtocolSettings {
            request_timeout: Duration::from_millis(200),
            request_max_size: None,
        },
    }
}

#[tokio::test]
async fn test_failed_response_write_attempts_error_response() {
    let ctx = context();
    let (stream, writes) = DeadWriter::new(false);
    let mut conn = Connection::new(stream, None, &ctx);

    tokio::time::timeout(Duration::from_secs(5), conn.run())
        .await
        .unwrap()
        .unwrap();

    // The response, then one error response before closing.
    assert_eq!(writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_that_never_reads_is_dropped() {
    let ctx = context();
    let (stream, writes) = DeadWriter::new(true);
    let mut conn = Connection::new(stream, None, &ctx);

    tokio::time::timeout(Duration::from_secs(5), conn.run())
        .await
        .expect("stalled write should give up after the request timeout")
        .unwrap();

    // The error response was tried after the stalled one.
    assert!(writes.load(Ordering::SeqCst) >= 2);
}
