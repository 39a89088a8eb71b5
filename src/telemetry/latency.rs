//! Latency and loss estimation from ping round trips.

use super::Gauge;
use crate::core::{LATENCY_SLOTS, LOSS_RATIO};

/// Ring buffer of recent latency samples with a tracked minimum.
///
/// The reported latency is the minimum sample scaled by the success rate,
/// where a sample counts as lost when it exceeds `LOSS_RATIO` times the
/// minimum. Owned by the ping-receive loop.
#[derive(Debug)]
pub struct LatencyCounter {
    /// Samples in seconds; `None` until the slot is first written.
    buf: [Option<f64>; LATENCY_SLOTS],
    /// Slot the next sample replaces.
    head: usize,
    /// Slot holding the smallest sample.
    min: usize,
    /// Last reported latency in seconds.
    published: Gauge,
}

impl Default for LatencyCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self {
            buf: [None; LATENCY_SLOTS],
            head: 0,
            min: 0,
            published: Gauge::default(),
        }
    }

    /// Handle for reading the reported latency from other tasks.
    pub fn gauge(&self) -> Gauge {
        self.published.clone()
    }

    /// Record a sample and return (and publish) the reported latency.
    ///
    /// Samples that are not positive are ignored.
    pub fn latency(&mut self, value: f64) -> f64 {
        if value > 0.0 {
            self.add(value);
        }
        let latency = self.minimum() * self.success_rate();
        self.published.set(latency);
        latency
    }

    /// Smallest sample currently in the buffer (0 when empty).
    pub fn minimum(&self) -> f64 {
        self.buf[self.min].unwrap_or(0.0)
    }

    /// Fraction of populated samples within `LOSS_RATIO` of the minimum.
    pub fn success_rate(&self) -> f64 {
        let threshold = LOSS_RATIO * self.minimum();
        let (success, loss) = self
            .buf
            .iter()
            .flatten()
            .fold((0u32, 0u32), |(success, loss), &sample| {
                if sample > threshold {
                    (success, loss + 1)
                } else {
                    (success + 1, loss)
                }
            });
        if success + loss == 0 {
            return 1.0;
        }
        f64::from(success) / f64::from(success + loss)
    }

    fn add(&mut self, value: f64) {
        self.buf[self.head] = Some(value);
        if self.head == self.min {
            // The old minimum was just overwritten.
            self.min = self.rescan();
        }
        if self.buf[self.min].is_none_or(|min| min > value) {
            self.min = self.head;
        }
        self.head = (self.head + 1) % LATENCY_SLOTS;
    }

    fn rescan(&self) -> usize {
        self.buf
            .iter()
            .enumerate()
            .filter_map(|(i, sample)| sample.map(|s| (i, s)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(self.head, |(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample() {
        let mut counter = LatencyCounter::new();
        assert_eq!(counter.latency(0.02), 0.02);
        assert_eq!(counter.gauge().get(), 0.02);
    }

    #[test]
    fn test_single_outlier_counts_as_loss() {
        let mut counter = LatencyCounter::new();
        for _ in 0..15 {
            counter.latency(5.0);
        }
        let latency = counter.latency(100.0);

        assert!((counter.success_rate() - 15.0 / 16.0).abs() < 1e-9);
        assert!((latency - 5.0 * 15.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_within_loss_ratio_is_success() {
        let mut counter = LatencyCounter::new();
        counter.latency(10.0);
        let latency = counter.latency(16.0);

        assert_eq!(counter.success_rate(), 1.0);
        assert_eq!(latency, 10.0);
    }

    #[test]
    fn test_new_minimum_tracked() {
        let mut counter = LatencyCounter::new();
        counter.latency(8.0);
        counter.latency(4.0);
        counter.latency(6.0);
        assert_eq!(counter.minimum(), 4.0);
        assert_eq!(counter.min, 1);
    }

    #[test]
    fn test_overwritten_minimum_rescanned() {
        let mut counter = LatencyCounter::new();
        counter.latency(1.0);
        for _ in 0..15 {
            counter.latency(5.0);
        }
        assert_eq!(counter.minimum(), 1.0);
        assert_eq!(counter.head, 0);

        // Slot 0 holds the minimum and is replaced next.
        counter.latency(7.0);
        assert_eq!(counter.minimum(), 5.0);
        assert_ne!(counter.min, 0);
        assert_eq!(counter.success_rate(), 1.0);
    }

    #[test]
    fn test_zero_sample_ignored() {
        let mut counter = LatencyCounter::new();
        for _ in 0..15 {
            counter.latency(0.010);
        }
        let reported = counter.latency(0.0);

        assert_eq!(counter.minimum(), 0.010);
        assert_eq!(counter.success_rate(), 1.0);
        assert_eq!(reported, 0.010);
        assert_eq!(counter.head, 15);

        assert_eq!(counter.latency(-1.0), 0.010);
        assert_eq!(counter.latency(f64::NAN), 0.010);
    }
}
