use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::app::App;
use crate::error::HttpError;
use crate::http::protocol::{ConnectionState, HttpProtocol, ProtocolSettings};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::clock::{Clock, REFRESH_INTERVAL};
use crate::server::signal::Signal;

const READ_BUFFER_SIZE: usize = 4096;

/// Worker-wide state every connection needs.
#[derive(Clone)]
pub struct ConnectionContext {
    pub app: Arc<App>,
    pub clock: Clock,
    pub signal: Signal,
    pub settings: ProtocolSettings,
}

/// What woke the connection loop.
enum Wake {
    Read(std::io::Result<usize>),
    Finished(Result<Response, JoinError>),
    Tick,
    Stop,
}

/// Drives one [`HttpProtocol`] over a byte stream.
///
/// Reads feed the protocol; a completed request runs on its own task so a
/// suspended handler never blocks the worker. While the handler runs the
/// socket is not read, which keeps requests on one connection sequential.
pub struct Connection<S> {
    stream: S,
    peer: Option<SocketAddr>,
    protocol: HttpProtocol,
    ctx: ConnectionContext,
    buffer: BytesMut,
    task: Option<JoinHandle<Response>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: Option<SocketAddr>, ctx: &ConnectionContext) -> Self {
        Self {
            stream,
            peer,
            protocol: HttpProtocol::new(ctx.settings, ctx.signal.clone(), peer),
            ctx: ctx.clone(),
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            task: None,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.protocol.connection_made(self.ctx.clock.now());

        while self.protocol.state() != ConnectionState::Closed {
            let Some(time_left) = self.protocol.time_left(self.ctx.clock.now()) else {
                self.connection_timeout().await;
                break;
            };
            // The cached clock only moves once per refresh, so never sleep past one.
            let wait = time_left.min(REFRESH_INTERVAL);

            let wake = match self.task.as_mut() {
                Some(task) => tokio::select! {
                    joined = task => Wake::Finished(joined),
                    _ = tokio::time::sleep(wait) => Wake::Tick,
                },
                None => {
                    let idle = self.protocol.is_idle();
                    tokio::select! {
                        read = self.stream.read_buf(&mut self.buffer) => Wake::Read(read),
                        _ = tokio::time::sleep(wait) => Wake::Tick,
                        _ = self.ctx.signal.stopped(), if idle => Wake::Stop,
                    }
                }
            };

            match wake {
                Wake::Read(Ok(0)) => {
                    debug!(peer = ?self.peer, "Client closed connection");
                    self.protocol.close();
                }
                Wake::Read(Ok(_)) => {
                    let data = self.buffer.split();
                    match self.protocol.data_received(&data) {
                        Ok(Some(request)) => self.dispatch(request),
                        Ok(None) => {}
                        Err(e) => self.write_error(&e).await,
                    }
                }
                Wake::Read(Err(e)) => {
                    self.protocol.close();
                    return Err(e.into());
                }
                Wake::Finished(joined) => {
                    self.task = None;
                    match joined {
                        Ok(response) => self.write_response(response).await,
                        Err(e) => {
                            error!(peer = ?self.peer, error = %e, "Handler task failed");
                            self.write_error(&HttpError::server_error("handler task failed"))
                                .await;
                        }
                    }
                }
                Wake::Tick => {}
                Wake::Stop => {
                    if self.protocol.close_if_idle() {
                        debug!(peer = ?self.peer, "Closing idle connection on shutdown");
                    }
                }
            }
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
        let _ = self.stream.shutdown().await;
        Ok(())
    }

    fn dispatch(&mut self, request: Arc<Request>) {
        debug!(peer = ?self.peer, method = %request.method, path = %request.url, "Dispatching");
        let app = Arc::clone(&self.ctx.app);
        self.task = Some(tokio::spawn(async move { app.handle_request(request).await }));
    }

    async fn write_response(&mut self, response: Response) {
        if let Some(request) = self.protocol.in_flight() {
            info!(
                peer = ?self.peer,
                method = %request.method,
                path = %request.url,
                status = response.status.as_u16(),
                "Request handled"
            );
        }

        let (writer, keep_alive) = self.protocol.write_response(&response, self.ctx.clock.now());
        if let Err(e) = self.send(writer).await {
            self.bail_out(&e).await;
            return;
        }

        if keep_alive {
            match self.protocol.resume() {
                Ok(Some(request)) => self.dispatch(request),
                Ok(None) => {}
                Err(e) => self.write_error(&e).await,
            }
        }
    }

    /// Writes the error response for `err` and closes. Write failures are
    /// logged only.
    async fn write_error(&mut self, err: &HttpError) {
        debug!(peer = ?self.peer, error = %err, "Writing error response");
        let writer = self.protocol.write_error(err, self.ctx.app.error_handler());
        if let Err(e) = self.send(writer).await {
            debug!(peer = ?self.peer, error = %e, "Connection lost before error response was written");
        }
        self.protocol.close();
    }

    /// Writes a frame, giving up once the client has stopped reading for a
    /// whole request timeout.
    async fn send(&mut self, mut writer: ResponseWriter) -> anyhow::Result<()> {
        let timeout = self.ctx.settings.request_timeout;
        match tokio::time::timeout(timeout, writer.write_to_stream(&mut self.stream)).await {
            Ok(written) => written,
            Err(_) => Err(anyhow::anyhow!("write timed out after {timeout:?}")),
        }
    }

    async fn bail_out(&mut self, err: &anyhow::Error) {
        error!(peer = ?self.peer, error = %err, "Failed to write response");
        self.write_error(&HttpError::server_error(format!("Response write failed: {err}")))
            .await;
    }

    async fn connection_timeout(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!(peer = ?self.peer, "Request timed out");
        self.write_error(&HttpError::RequestTimeout).await;
    }
}
