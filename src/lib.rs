//! # NOMAD Mux
//!
//! Stream multiplexing over a single reliable transport connection.
//!
//! A [`Session`] wraps one already-open TCP or KCP connection and carries any
//! number of independent logical byte streams ([`MuxConn`]) over it. It
//! provides:
//!
//! - **Multiplexing**: open and accept logical connections on either end
//! - **Flow control**: per-connection receive windows with credit reports
//! - **Liveness**: keep-alive pings; a dead link closes the session
//! - **Telemetry**: latency and read-throughput estimates of the link
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types and the transport trait
//! - [`frame`]: Wire format and pooled payload buffers
//! - [`session`]: Sessions, logical connections and their background tasks
//! - [`telemetry`]: Bandwidth and latency estimators
//!
//! ## Example Usage
//!
//! ```rust
//! use nomad_mux::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> MuxResult<()> {
//! let (a, b) = tokio::io::duplex(64 * 1024);
//! let client = Session::new(a, TransportKind::Tcp);
//! let server = Session::new(b, TransportKind::Tcp);
//!
//! let (opened, accepted) = tokio::join!(client.open(), server.accept());
//! let (local, remote) = (opened?, accepted?);
//!
//! local.write(b"hello").await?;
//! let mut buf = [0u8; 16];
//! let n = remote.read(&mut buf).await?;
//! assert_eq!(&buf[..n], b"hello");
//!
//! client.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod frame;
pub mod session;
pub mod telemetry;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{MuxError, MuxResult, Transport, TransportKind};
    pub use crate::session::{MuxConn, Segment, Session, SessionConfig, SessionConfigBuilder};
}

// Re-export commonly used items at crate root
pub use core::{MuxError, MuxResult, Transport, TransportKind};
pub use frame::{BufferPool, Flag, Frame, FrameError, PooledBuf};
pub use session::{MuxConn, Segment, Session, SessionConfig, SessionConfigBuilder};
