use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::Config;

/// Binds the listening socket described by `config`.
///
/// Address reuse is always on; `reuse_port` additionally sets `SO_REUSEPORT`
/// for prefork workers. The socket is left non-blocking so it can be handed
/// to a tokio runtime in any process that inherits it.
pub fn bind(config: &Config, reuse_port: bool) -> anyhow::Result<TcpListener> {
    let addr = resolve(config)?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .context("creating listening socket")?;
    socket.set_reuse_address(true)?;
    if reuse_port {
        socket.set_reuse_port(true)?;
    }
    socket
        .bind(&addr.into())
        .with_context(|| format!("binding {addr}"))?;
    let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

fn resolve(config: &Config) -> anyhow::Result<SocketAddr> {
    let listen_addr = config.listen_addr();
    listen_addr
        .to_socket_addrs()
        .with_context(|| format!("resolving {listen_addr}"))?
        .next()
        .with_context(|| format!("no address for {listen_addr}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_ephemeral_port() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let listener = bind(&config, false).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
