//! NOMAD Mux - Framing Layer
//!
//! This module implements the wire format shared by both ends of a mux
//! session:
//!
//! - **Frame encoding/decoding**: [`Frame`] and [`Flag`]
//! - **Payload buffers**: [`BufferPool`] hands out [`PooledBuf`] guards that
//!   return to the pool when dropped
//!
//! # Wire format
//!
//! ```text
//! +------+-----------+----------------------------------------------+
//! | flag | conn id   | body                                         |
//! | u8   | i32 LE    |                                              |
//! +------+-----------+----------------------------------------------+
//! body by flag:
//!   ping, ping-return, new-message, new-message-part:  len u16 LE | payload
//!   message-send-ok:                                   window u32 LE
//!   new-connection, -ok, -fail, connection-close:      (empty)
//! ```

#[allow(clippy::module_inception)]
mod frame;
mod pool;

pub use frame::*;
pub use pool::*;
