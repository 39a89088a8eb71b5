//! NOMAD Mux - Session Layer
//!
//! A [`Session`] wraps one open transport and carries any number of logical
//! connections ([`MuxConn`]) over it. Each session runs five tasks:
//!
//! - **Writer**: the only task that writes to the transport
//! - **Decoder**: reads frames and routes them to connections
//! - **Accept dispatch**: registers inbound connections and confirms them
//! - **Pinger**: sends keep-alive pings and enforces the ping timeout
//! - **Ping receiver**: turns ping-returns into latency samples
//!
//! Tasks exchange work through [`Queue`]s and channels. Closing the session
//! cancels every task and shuts down every connection.

mod config;
mod conn;
mod ids;
mod pinger;
mod queue;
mod reader;
mod registry;
#[allow(clippy::module_inception)]
mod session;
mod window;
mod writer;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use conn::MuxConn;
pub use ids::IdAllocator;
pub use queue::Queue;
pub use registry::ConnRegistry;
pub use session::Session;
pub use window::{ReceiveWindow, Segment, SendWindow};

use crate::frame::Frame;

/// Outbound frame queue drained by the writer task. Ping, ping-return and
/// window reports use the priority lane.
pub type WriteQueue = Queue<Frame>;
