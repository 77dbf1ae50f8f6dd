//! Server lifecycle.
//!
//! A [`Server`] owns the configured [`App`] and the listening socket. In
//! single-worker mode it runs one `current_thread` runtime in the calling
//! process; with `workers > 1` it binds once with `SO_REUSEPORT`, forks the
//! workers, and supervises them (see [`workers`]).
//!
//! Every worker shares three pieces of state across its connections: the
//! cached [`Clock`], the stop [`Signal`], and the live [`Connections`]
//! counter used to drain on shutdown.

pub mod clock;
pub mod listener;
pub mod signal;
pub mod socket;
pub mod workers;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::{error, info};

use crate::app::App;
use crate::config::Config;
use crate::http::connection::ConnectionContext;
use crate::http::protocol::ProtocolSettings;

pub use clock::Clock;
pub use signal::{Connections, Signal};

pub struct Server {
    config: Config,
    app: Arc<App>,
    listener: Option<std::net::TcpListener>,
    clock: Option<Clock>,
}

impl Server {
    /// Applies `config` to `app` and prepares to serve it.
    pub fn new(config: Config, mut app: App) -> Self {
        app.configure(&config);
        Self {
            config,
            app: Arc::new(app),
            listener: None,
            clock: None,
        }
    }

    /// Serves on an already bound socket instead of binding `host:port`.
    pub fn with_listener(mut self, listener: std::net::TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Uses `clock` for timeout arithmetic instead of a fresh system clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Serves until SIGINT/SIGTERM. Blocks the calling thread.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn run(mut self) -> anyhow::Result<()> {
        let prefork = self.config.workers > 1;
        let listener = self.take_listener(prefork)?;

        if prefork {
            info!(workers = self.config.workers, "Starting workers");
            workers::serve_multiple(self.config.workers, &listener, |listener| {
                self.run_worker(listener)
            })
        } else {
            self.run_worker(listener)
        }
    }

    /// Serves a single worker on the current runtime until `shutdown`
    /// resolves, then drains.
    pub async fn serve_until<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.take_listener(false)?;
        self.serve_listener(listener, shutdown).await
    }

    fn take_listener(&mut self, reuse_port: bool) -> anyhow::Result<std::net::TcpListener> {
        match self.listener.take() {
            Some(listener) => Ok(listener),
            None => socket::bind(&self.config, reuse_port),
        }
    }

    fn run_worker(&self, listener: std::net::TcpListener) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building worker runtime")?;
        runtime.block_on(self.serve_listener(listener, shutdown_signal()))
    }

    async fn serve_listener<F>(
        &self,
        listener: std::net::TcpListener,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(listener)?;

        let clock = self.clock.clone().unwrap_or_default();
        let updater = clock.spawn_updater();
        let ctx = ConnectionContext {
            app: Arc::clone(&self.app),
            clock,
            signal: Signal::new(),
            settings: ProtocolSettings::from_config(&self.config),
        };

        let result = listener::serve(
            listener,
            ctx,
            Connections::new(),
            self.config.shutdown_timeout(),
            shutdown,
        )
        .await;
        updater.abort();
        result
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match unix_signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
