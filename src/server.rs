//! TCP accept loop.
//!
//! Accepts connections until the shutdown signal fires and hands each one to
//! its own session task. Admission never waits on a session.

use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::session::{Session, SessionConfig};
use crate::shutdown::Shutdown;

/// Listen backlog for the server socket
const LISTEN_BACKLOG: i32 = 1024;

/// Create the listening socket.
///
/// Must be called from within a tokio runtime.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}

/// Accept connections until `shutdown` fires.
///
/// The listener is borrowed: it stays open until the caller drops it.
/// Sessions already running are not awaited; they observe the same signal.
pub async fn serve(listener: &TcpListener, shutdown: Shutdown, config: SessionConfig) {
    let mut next_id: u64 = 0;

    while !shutdown.is_cancelled() {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.cancelled() => break,
        };

        match accepted {
            Ok((stream, peer)) => {
                next_id += 1;
                let session = Session::new(next_id, stream, config);
                info!(session = session.id(), peer = %peer, "New client connected");

                tokio::spawn(session.run(shutdown.clone()));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }

    info!(sessions = next_id, "Stopped accepting connections");
}
