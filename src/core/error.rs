//! Error types for the NOMAD mux.

use std::io;

use thiserror::Error;

use crate::frame::FrameError;

/// Errors surfaced by a mux [`Session`](crate::session::Session) and its
/// logical connections.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The session has been closed; no further operations are possible.
    #[error("the mux session is closed")]
    SessionClosed,

    /// `close` was called on a session that was already closed.
    #[error("the mux session has already been closed")]
    AlreadyClosed,

    /// The peer did not acknowledge a new connection in time.
    #[error("timed out waiting for the peer to accept the connection")]
    OpenTimeout,

    /// The peer explicitly refused a new connection.
    #[error("the peer refused the connection")]
    ConnectionRefused,

    /// No further inbound connections will arrive.
    #[error("accept failed: the session is shutting down")]
    AcceptClosed,

    /// The logical connection is closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(i32),

    /// Receive window overflow on a logical connection.
    #[error("receive window overflow on connection {id}: {buffered} + {incoming} > {capacity}")]
    WindowOverflow {
        /// Connection id.
        id: i32,
        /// Bytes already buffered.
        buffered: usize,
        /// Bytes in the rejected segment.
        incoming: usize,
        /// Window capacity.
        capacity: usize,
    },

    /// Frame encoding or decoding failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error on the transport.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl MuxError {
    /// Check if this error means the whole session is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MuxError::SessionClosed | MuxError::AlreadyClosed | MuxError::Frame(_) | MuxError::Io(_)
        )
    }

    /// Check if this error reports a closed session or connection.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            MuxError::SessionClosed
                | MuxError::AlreadyClosed
                | MuxError::AcceptClosed
                | MuxError::ConnectionClosed(_)
        )
    }
}

/// Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(MuxError::SessionClosed.is_fatal());
        assert!(MuxError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "test")).is_fatal());
        assert!(MuxError::Frame(FrameError::UnknownFlag(0xff)).is_fatal());

        assert!(!MuxError::OpenTimeout.is_fatal());
        assert!(!MuxError::ConnectionClosed(7).is_fatal());
    }

    #[test]
    fn test_closed_errors() {
        assert!(MuxError::AcceptClosed.is_closed());
        assert!(MuxError::ConnectionClosed(3).is_closed());
        assert!(!MuxError::ConnectionRefused.is_closed());
    }
}
