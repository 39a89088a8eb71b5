//! Session configuration.

use std::time::Duration;

use crate::core::{
    KCP_IDLE_LIMIT, MAX_SEGMENT_SIZE, MAX_WINDOW_SIZE, OPEN_TIMEOUT, PING_INTERVAL,
    PING_TIMEOUT_MISSES,
};
use crate::frame::DEFAULT_POOL_CAPACITY;

/// Tunables for a mux [`Session`](super::Session).
///
/// Both ends of a session should use the same `max_segment_size` and
/// `receive_window`: the sender starts with the receive window as its send
/// credit.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between keep-alive pings.
    pub ping_interval: Duration,

    /// Ping intervals without a ping-return before the session closes.
    pub ping_timeout_misses: u32,

    /// Silent ping intervals tolerated on KCP transports.
    pub kcp_idle_limit: u32,

    /// How long `open` waits for the peer's answer.
    pub open_timeout: Duration,

    /// Maximum payload bytes per frame.
    pub max_segment_size: usize,

    /// Per-connection receive window in bytes.
    pub receive_window: u32,

    /// Idle payload buffers kept by the session's pool.
    pub pool_capacity: usize,

    /// Accepted connections buffered ahead of `accept`.
    pub accept_backlog: usize,

    /// Ping-return payloads buffered for the ping-receive loop.
    pub ping_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            ping_timeout_misses: PING_TIMEOUT_MISSES,
            kcp_idle_limit: KCP_IDLE_LIMIT,
            open_timeout: OPEN_TIMEOUT,
            max_segment_size: MAX_SEGMENT_SIZE,
            receive_window: MAX_WINDOW_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            accept_backlog: 1,
            ping_queue: 1,
        }
    }
}

/// Builder for a [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    /// Set the ping interval (at least one millisecond).
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the number of missed ping intervals before the session closes.
    pub fn ping_timeout_misses(mut self, misses: u32) -> Self {
        self.config.ping_timeout_misses = misses.max(1);
        self
    }

    /// Set the silent-interval limit for KCP transports.
    pub fn kcp_idle_limit(mut self, limit: u32) -> Self {
        self.config.kcp_idle_limit = limit.max(1);
        self
    }

    /// Set the open timeout.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    /// Set the maximum segment size (clamped to what the length field holds).
    pub fn max_segment_size(mut self, size: usize) -> Self {
        self.config.max_segment_size = size.clamp(1, u16::MAX as usize);
        self
    }

    /// Set the per-connection receive window.
    pub fn receive_window(mut self, window: u32) -> Self {
        self.config.receive_window = window.max(1);
        self
    }

    /// Set how many idle buffers the pool keeps.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    /// Set how many accepted connections may wait for `accept`.
    pub fn accept_backlog(mut self, backlog: usize) -> Self {
        self.config.accept_backlog = backlog.max(1);
        self
    }

    /// Set how many ping-return payloads may wait for the ping-receive loop.
    pub fn ping_queue(mut self, depth: usize) -> Self {
        self.config.ping_queue = depth.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
