//! Session handler: owns one accepted connection from accept to close.
//!
//! Each session loops over a race between the idle timer, a read from the
//! client and the shutdown signal:
//!
//! ```text
//!             timer fires ──────────────► TimedOut ─┐
//!             chunk is "quit" ──────────► Quitting ─┤
//! Reading ──► read returns 0 ───────────► Eof ──────┼──► Closed
//!             read/write fails ─────────► Error ────┤
//!             shutdown signal ──────────────────────┘
//! ```
//!
//! Any other chunk is echoed back and the session keeps reading. The
//! connection is released exactly once, when the session reaches `Closed`.

use bytes::BytesMut;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::protocol::{self, Command};
use crate::shutdown::Shutdown;

/// How long a client may stay silent before it is timed out.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Read buffer size per connection.
pub const BUFFER_SIZE: usize = 4096;

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Idle timeout, restarted for every read attempt.
    pub idle_timeout: Duration,
    /// Maximum bytes taken from the connection per read.
    pub buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: IDLE_TIMEOUT,
            buffer_size: BUFFER_SIZE,
        }
    }
}

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next chunk from the client.
    Reading,
    /// The idle timer fired before any data arrived.
    TimedOut,
    /// The client asked to quit.
    Quitting,
    /// The client closed its write side.
    Eof,
    /// A read or write failed.
    Error,
    /// Connection released.
    Closed,
}

impl SessionState {
    /// Whether the machine may move from `self` to `next`.
    ///
    /// No state is revisited: `Reading` leads to exactly one of the exit
    /// states (or straight to `Closed` on shutdown), and every exit state
    /// leads to `Closed`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Reading, TimedOut | Quitting | Eof | Error | Closed)
                | (TimedOut | Quitting | Eof | Error, Closed)
        )
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// No data within the idle timeout.
    Timeout,
    /// The client sent `quit`.
    Quit,
    /// Zero-length read.
    PeerClosed,
    /// Read or write failed (reset, broken pipe, ...).
    Transport,
    /// The shutdown signal fired while the session was waiting.
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Timeout => "timeout",
            CloseReason::Quit => "quit",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::Transport => "transport error",
            CloseReason::Cancelled => "shutdown",
        };
        f.write_str(s)
    }
}

/// A pending write that did not complete.
enum WriteError {
    Cancelled,
    Transport(io::Error),
}

/// One live connection.
pub struct Session<S> {
    id: u64,
    stream: S,
    buffer: Box<[u8]>,
    state: SessionState,
    idle_timeout: Duration,
    echoed: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session for a freshly accepted connection.
    pub fn new(id: u64, stream: S, config: SessionConfig) -> Self {
        Self {
            id,
            stream,
            buffer: vec![0u8; config.buffer_size].into_boxed_slice(),
            state: SessionState::Reading,
            idle_timeout: config.idle_timeout,
            echoed: 0,
        }
    }

    /// Session identifier assigned at accept time.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drive the connection until it closes, then release it.
    pub async fn run(mut self, shutdown: Shutdown) -> CloseReason {
        let reason = self.serve(&shutdown).await;
        self.close(reason).await;
        reason
    }

    async fn serve(&mut self, shutdown: &Shutdown) -> CloseReason {
        while !shutdown.is_cancelled() {
            let read = tokio::select! {
                _ = tokio::time::sleep(self.idle_timeout) => {
                    self.transition(SessionState::TimedOut);
                    debug!(session = self.id, "Client timed out");
                    // The peer may already be gone; the notice is best-effort.
                    let _ = self.send(protocol::TIMEOUT_NOTICE, shutdown).await;
                    return CloseReason::Timeout;
                }
                _ = shutdown.cancelled() => return CloseReason::Cancelled,
                read = self.stream.read(&mut self.buffer) => read,
            };

            let n = match read {
                Ok(0) => {
                    self.transition(SessionState::Eof);
                    return CloseReason::PeerClosed;
                }
                Ok(n) => n,
                Err(e) => {
                    self.transition(SessionState::Error);
                    debug!(session = self.id, error = %e, "Read failed");
                    return CloseReason::Transport;
                }
            };

            let chunk = &self.buffer[..n];
            debug!(
                session = self.id,
                bytes = n,
                text = %String::from_utf8_lossy(chunk),
                "Received"
            );

            let (response, quitting) = match protocol::parse(chunk) {
                Command::Quit => (BytesMut::from(protocol::QUIT_NOTICE), true),
                Command::Echo(data) => (protocol::echo_response(data), false),
            };

            if quitting {
                self.transition(SessionState::Quitting);
                debug!(session = self.id, "Client quitting");
            }

            match self.send(&response, shutdown).await {
                Ok(()) if quitting => return CloseReason::Quit,
                Ok(()) => self.echoed += 1,
                Err(WriteError::Cancelled) => return CloseReason::Cancelled,
                Err(WriteError::Transport(e)) => {
                    if !quitting {
                        self.transition(SessionState::Error);
                    }
                    debug!(session = self.id, error = %e, "Write failed");
                    return CloseReason::Transport;
                }
            }
        }

        CloseReason::Cancelled
    }

    /// Write the whole buffer unless shutdown interrupts it.
    async fn send(&mut self, data: &[u8], shutdown: &Shutdown) -> Result<(), WriteError> {
        tokio::select! {
            result = self.stream.write_all(data) => result.map_err(WriteError::Transport),
            _ = shutdown.cancelled() => Err(WriteError::Cancelled),
        }
    }

    /// Release the connection. Consumes the session, so it runs once.
    async fn close(mut self, reason: CloseReason) {
        self.transition(SessionState::Closed);
        if reason != CloseReason::Cancelled {
            let _ = self.stream.shutdown().await;
        }
        drop(self.stream);
        info!(
            session = self.id,
            reason = %reason,
            echoed = self.echoed,
            "Client disconnected"
        );
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}
