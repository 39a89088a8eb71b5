//! Core traits for the NOMAD mux.
//!
//! These traits describe the physical link a session runs over.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A physical, already-open, reliable byte-stream connection.
///
/// The session splits the transport into a read half owned by the decode
/// loop and a write half owned by the writer loop. Dropping both halves
/// closes the transport.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Local address of the physical connection.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }
}

impl Transport for DuplexStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "in-memory transport has no socket address",
        ))
    }
}

/// Kind of physical transport, which decides the ping-failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// TCP stream.
    #[default]
    Tcp,
    /// KCP (reliable UDP). Sessions over KCP also close after a shorter run
    /// of silent ping intervals.
    Kcp,
}

impl TransportKind {
    /// Lower-case name of the transport kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Kcp => "kcp",
        }
    }

    /// Whether the transport is UDP based.
    pub fn is_udp(self) -> bool {
        matches!(self, TransportKind::Kcp)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "kcp" | "udp" => Ok(TransportKind::Kcp),
            other => Err(format!("unknown transport kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("tcp".parse::<TransportKind>().unwrap(), TransportKind::Tcp);
        assert_eq!("KCP".parse::<TransportKind>().unwrap(), TransportKind::Kcp);
        assert!("quic".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_transport_kind_udp() {
        assert!(TransportKind::Kcp.is_udp());
        assert!(!TransportKind::Tcp.is_udp());
        assert_eq!(TransportKind::Kcp.to_string(), "kcp");
    }

    #[tokio::test]
    async fn test_duplex_has_no_addr() {
        let (a, _b) = tokio::io::duplex(64);
        assert_eq!(
            Transport::local_addr(&a).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }
}
