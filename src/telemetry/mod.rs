//! NOMAD Mux - Link Telemetry
//!
//! Estimators that describe the physical link a session runs over:
//!
//! - **Throughput**: [`Bandwidth`] samples bytes read by the decode loop
//! - **Latency and loss**: [`LatencyCounter`] tracks ping round trips
//!
//! Each estimator is mutated by exactly one task. The value other tasks read
//! is published through a [`Gauge`], so no locking is needed.

mod bandwidth;
mod latency;

pub use bandwidth::Bandwidth;
pub use latency::LatencyCounter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A shared `f64` published atomically (stored as its bit pattern).
#[derive(Debug, Clone, Default)]
pub struct Gauge(Arc<AtomicU64>);

impl Gauge {
    /// Create a gauge holding `value`.
    pub fn new(value: f64) -> Self {
        Self(Arc::new(AtomicU64::new(value.to_bits())))
    }

    /// Publish a new value.
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Read the last published value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}
