//! Rolling read-throughput estimation.

use std::time::Instant;

use super::Gauge;
use crate::core::{BANDWIDTH_SAMPLE_SEGMENTS, DEFAULT_BANDWIDTH};

/// Read-throughput sampler owned by the decode loop.
///
/// Bytes are accumulated until `BANDWIDTH_SAMPLE_SEGMENTS` full segments have
/// been read; the next read then closes the window and publishes
/// bytes / (time between the two window starts).
#[derive(Debug)]
pub struct Bandwidth {
    /// Start of the current sampling window.
    read_start: Option<Instant>,
    /// Start of the previous sampling window.
    last_read_start: Option<Instant>,
    /// Bytes read in the current window.
    buf_length: usize,
    /// Bytes required before a new sample is computed.
    threshold: usize,
    /// Last computed throughput in bytes/sec.
    published: Gauge,
}

impl Bandwidth {
    /// Create a sampler for frames of at most `max_segment` payload bytes.
    pub fn new(max_segment: usize) -> Self {
        Self {
            read_start: None,
            last_read_start: None,
            buf_length: 0,
            threshold: max_segment * BANDWIDTH_SAMPLE_SEGMENTS,
            published: Gauge::default(),
        }
    }

    /// Handle for reading the published throughput from other tasks.
    pub fn gauge(&self) -> Gauge {
        self.published.clone()
    }

    /// Mark the start of a frame read.
    pub fn start_read(&mut self) {
        self.start_read_at(Instant::now());
    }

    /// Mark the start of a frame read at `now`.
    pub fn start_read_at(&mut self, now: Instant) {
        if self.read_start.is_none() {
            self.read_start = Some(now);
        }
        if self.buf_length >= self.threshold {
            self.last_read_start = self.read_start.replace(now);
            self.calc_bandwidth();
        }
    }

    /// Record payload bytes copied out of the last frame.
    pub fn add_copied(&mut self, n: usize) {
        self.buf_length = self.buf_length.saturating_add(n);
    }

    /// Current throughput, or `DEFAULT_BANDWIDTH` before the first sample.
    pub fn get(&self) -> f64 {
        Self::read_gauge(&self.published)
    }

    /// Read a bandwidth gauge, applying the floor default.
    pub fn read_gauge(gauge: &Gauge) -> f64 {
        let bw = gauge.get();
        if bw > 0.0 { bw } else { DEFAULT_BANDWIDTH }
    }

    fn calc_bandwidth(&mut self) {
        if let (Some(start), Some(last)) = (self.read_start, self.last_read_start) {
            let secs = start.saturating_duration_since(last).as_secs_f64();
            if secs > 0.0 {
                self.published.set(self.buf_length as f64 / secs);
            }
        }
        self.buf_length = 0;
    }
}
