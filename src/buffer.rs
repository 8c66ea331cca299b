//! Bounded snapshot staging between the driver and the observer
//!
//! Snapshots accumulate in a flat buffer and are flushed as one batch
//! when either the capacity is reached or a monotonic deadline expires,
//! whichever comes first. The dual policy bounds resident memory and
//! observer-visible latency at the same time, independent of how fine
//! the reporting increment is.

use std::time::{Duration, Instant};

use crate::params::ConfigError;

/// Never stage more than 1 MiB of snapshot data.
pub const STORAGE_LIMIT_BYTES: usize = 1 << 20;

/// Never hold a staged snapshot back for more than one second.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed-width snapshot staging area.
///
/// Capacity is derived once from the snapshot width and the byte budget;
/// occupancy never exceeds it because the driver flushes as soon as the
/// buffer fills.
#[derive(Debug)]
pub struct ResultBuffer {
    storage: Vec<f64>,
    width: usize,
    capacity: usize,
    occupied: usize,
    deadline: Instant,
}

impl ResultBuffer {
    /// Snapshot capacity the byte budget allows for rows of `width`
    /// variables. Fails when even a single snapshot does not fit, i.e.
    /// the capacity truncates to zero.
    pub fn capacity_for(width: usize) -> Result<usize, ConfigError> {
        if width == 0 {
            return Err(ConfigError::EmptyState);
        }
        let capacity = STORAGE_LIMIT_BYTES / (width * std::mem::size_of::<f64>());
        if capacity == 0 {
            return Err(ConfigError::SnapshotTooLarge {
                width,
                limit: STORAGE_LIMIT_BYTES,
            });
        }
        Ok(capacity)
    }

    /// Allocate a buffer for snapshots of `width` variables.
    pub fn new(width: usize, now: Instant) -> Result<Self, ConfigError> {
        let capacity = Self::capacity_for(width)?;
        Ok(Self {
            storage: vec![0.0; capacity * width],
            width,
            capacity,
            occupied: 0,
            deadline: now + FLUSH_INTERVAL,
        })
    }

    /// Snapshots currently staged.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Maximum number of staged snapshots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserve the next snapshot row for writing.
    ///
    /// # Panics
    /// Panics if the buffer is full; the driver flushes at capacity, so a
    /// full buffer here is a logic error.
    pub fn append(&mut self) -> &mut [f64] {
        assert!(self.occupied < self.capacity, "result buffer overflow");
        let start = self.occupied * self.width;
        self.occupied += 1;
        &mut self.storage[start..start + self.width]
    }

    /// Whether the staged batch should be pushed to the observer now:
    /// at capacity, or past the flush deadline.
    pub fn flush_due(&self, now: Instant) -> bool {
        self.occupied == self.capacity || now >= self.deadline
    }

    /// The staged batch as one flat slice of `len() * width` values in
    /// chronological order.
    pub fn as_slice(&self) -> &[f64] {
        &self.storage[..self.occupied * self.width]
    }

    /// Clear the staged batch and re-arm the flush deadline.
    pub fn reset(&mut self, now: Instant) {
        self.occupied = 0;
        self.deadline = now + FLUSH_INTERVAL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_from_byte_budget() {
        let now = Instant::now();
        let buf = ResultBuffer::new(4, now).unwrap();
        assert_eq!(buf.capacity(), STORAGE_LIMIT_BYTES / 32);

        // Exactly one snapshot fits at the budget boundary.
        let width = STORAGE_LIMIT_BYTES / 8;
        let buf = ResultBuffer::new(width, now).unwrap();
        assert_eq!(buf.capacity(), 1);
    }

    #[test]
    fn test_oversized_snapshot_rejected() {
        let width = STORAGE_LIMIT_BYTES / 8 + 1;
        assert!(ResultBuffer::new(width, Instant::now()).is_err());
    }

    #[test]
    fn test_append_and_flush_by_size() {
        let now = Instant::now();
        let mut buf = ResultBuffer::new(STORAGE_LIMIT_BYTES / 16, now).unwrap();
        assert_eq!(buf.capacity(), 2);

        buf.append().fill(1.0);
        assert_eq!(buf.len(), 1);
        assert!(!buf.flush_due(now));

        buf.append().fill(2.0);
        assert!(buf.flush_due(now));
        assert_eq!(buf.as_slice().len(), 2 * buf.width);
        assert_eq!(buf.as_slice()[0], 1.0);
        assert_eq!(buf.as_slice()[buf.width], 2.0);

        buf.reset(now);
        assert!(buf.is_empty());
        assert!(!buf.flush_due(now));
    }

    #[test]
    fn test_flush_by_deadline() {
        let now = Instant::now();
        let mut buf = ResultBuffer::new(8, now).unwrap();
        buf.append().fill(0.5);

        // Just before the deadline: hold. At the deadline: flush.
        assert!(!buf.flush_due(now + FLUSH_INTERVAL - Duration::from_millis(1)));
        assert!(buf.flush_due(now + FLUSH_INTERVAL));

        // Resetting re-arms the deadline relative to the flush time.
        let later = now + FLUSH_INTERVAL;
        buf.reset(later);
        buf.append().fill(0.5);
        assert!(!buf.flush_due(later + FLUSH_INTERVAL - Duration::from_millis(1)));
        assert!(buf.flush_due(later + FLUSH_INTERVAL));
    }
}
