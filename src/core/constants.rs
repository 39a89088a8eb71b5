//! Protocol constants for the NOMAD mux.
//!
//! Wire-visible values are fixed by the protocol and MUST NOT be changed.
//! Timing values are the defaults used by [`SessionConfig`](crate::session::SessionConfig).

use std::time::Duration;

// =============================================================================
// FRAME FLAGS (wire codes)
// =============================================================================

/// Keep-alive ping carrying the sender's timestamp.
pub const FLAG_PING: u8 = 0;

/// Peer accepted a new logical connection.
pub const FLAG_NEW_CONN_OK: u8 = 1;

/// Peer refused a new logical connection.
pub const FLAG_NEW_CONN_FAIL: u8 = 2;

/// Final (or only) segment of a message.
pub const FLAG_NEW_MSG: u8 = 3;

/// Non-final segment of a message; more segments follow.
pub const FLAG_NEW_MSG_PART: u8 = 4;

/// Receiver reports its remaining window after consuming data.
pub const FLAG_MSG_SEND_OK: u8 = 5;

/// Request to open a new logical connection.
pub const FLAG_NEW_CONN: u8 = 6;

/// Logical connection closed by the sender.
pub const FLAG_CONN_CLOSE: u8 = 7;

/// Echo of a ping, carrying the original payload.
pub const FLAG_PING_RETURN: u8 = 8;

/// Connection id reserved for session-level control frames.
pub const SESSION_CONN_ID: i32 = -1;

// =============================================================================
// FRAME SIZES
// =============================================================================

/// Size of a pooled payload buffer.
pub const POOL_BUFFER_SIZE: usize = 4096;

/// Frame header size (flag + connection id).
pub const FRAME_HEADER_SIZE: usize = 1 + 4;

/// Payload length prefix size.
pub const FRAME_LENGTH_SIZE: usize = 2;

/// Remaining-window field size (message-send-ok only).
pub const FRAME_WINDOW_SIZE: usize = 4;

/// Maximum payload bytes in a single frame.
pub const MAX_SEGMENT_SIZE: usize =
    POOL_BUFFER_SIZE - FRAME_LENGTH_SIZE - FRAME_HEADER_SIZE - FRAME_WINDOW_SIZE;

/// Receive window per logical connection (32 MiB).
pub const MAX_WINDOW_SIZE: u32 = 1 << 25;

// =============================================================================
// TIMING
// =============================================================================

/// Interval between keep-alive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Missed ping intervals before the session is considered dead (5 minutes).
pub const PING_TIMEOUT_MISSES: u32 = 60;

/// Consecutive silent intervals tolerated on KCP transports.
pub const KCP_IDLE_LIMIT: u32 = 10;

/// How long `open` waits for the peer to acknowledge a new connection.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// ID ALLOCATION
// =============================================================================

/// Distance from `i32::MAX` at which the id counter wraps back to zero.
pub const ID_WRAP_MARGIN: i32 = 10_000;

// =============================================================================
// TELEMETRY
// =============================================================================

/// Segments that must be read before throughput is recomputed.
pub const BANDWIDTH_SAMPLE_SEGMENTS: usize = 300;

/// Reported throughput (bytes/sec) before any sample exists.
pub const DEFAULT_BANDWIDTH: f64 = 100.0;

/// Slots in the latency ring buffer.
pub const LATENCY_SLOTS: usize = 16;

/// Samples above `min * LOSS_RATIO` are counted as lost.
pub const LOSS_RATIO: f64 = 1.6;
