//! Time-window descriptors for windowed joins and aggregations.

use std::time::Duration;

/// An immutable time-windowing policy: window size, advance (hop), and how
/// long expired window state is retained for late arrivals.
///
/// `Windows::tumbling(size)` gives advance == size (non-overlapping);
/// `advance_by` turns it into a hopping window. Attaching the same policy to
/// two operators still yields two independent topology nodes.
///
/// # Examples
///
/// ```rust
/// use rillstream::rillstream::window::Windows;
/// use std::time::Duration;
///
/// let hourly = Windows::tumbling(Duration::from_secs(3600));
/// let hopping = Windows::tumbling(Duration::from_secs(3600))
///     .advance_by(Duration::from_secs(900))
///     .with_retention(Duration::from_secs(7200));
/// assert_eq!(hopping.advance(), Duration::from_secs(900));
/// assert_eq!(hourly.advance(), Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Windows {
    size: Duration,
    advance: Duration,
    retention: Duration,
}

impl Windows {
    /// A tumbling window: advance equals size, retention defaults to size.
    pub fn tumbling(size: Duration) -> Self {
        Windows {
            size,
            advance: size,
            retention: size,
        }
    }

    /// Set the advance (hop) interval, producing overlapping windows when
    /// smaller than the size.
    pub fn advance_by(mut self, advance: Duration) -> Self {
        self.advance = advance;
        self
    }

    /// Set how long window state is kept after the window closes.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Window size.
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Advance (hop) interval.
    pub fn advance(&self) -> Duration {
        self.advance
    }

    /// Retention period.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Window size in milliseconds.
    pub fn size_ms(&self) -> i64 {
        self.size.as_millis() as i64
    }

    /// Advance interval in milliseconds.
    pub fn advance_ms(&self) -> i64 {
        self.advance.as_millis() as i64
    }

    /// Retention in milliseconds.
    pub fn retention_ms(&self) -> i64 {
        self.retention.as_millis() as i64
    }

    /// Start timestamps of every window containing `timestamp`.
    ///
    /// For tumbling windows this is a single start; for hopping windows
    /// (advance < size) a record belongs to size/advance windows.
    pub fn windows_for(&self, timestamp: i64) -> Vec<i64> {
        let size = self.size_ms();
        let advance = self.advance_ms().max(1);
        let mut starts = Vec::new();
        // Earliest window whose [start, start + size) interval covers the
        // timestamp, aligned to the advance grid.
        let mut start = (timestamp - size + advance).div_euclid(advance) * advance;
        if start < 0 {
            start = 0;
        }
        while start <= timestamp {
            if timestamp < start + size {
                starts.push(start);
            }
            start += advance;
        }
        starts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumbling_window_assigns_single_window() {
        let w = Windows::tumbling(Duration::from_millis(1000));
        assert_eq!(w.windows_for(0), vec![0]);
        assert_eq!(w.windows_for(999), vec![0]);
        assert_eq!(w.windows_for(1000), vec![1000]);
        assert_eq!(w.windows_for(2500), vec![2000]);
    }

    #[test]
    fn hopping_window_assigns_overlapping_windows() {
        let w = Windows::tumbling(Duration::from_millis(1000)).advance_by(Duration::from_millis(500));
        assert_eq!(w.windows_for(1200), vec![500, 1000]);
        assert_eq!(w.windows_for(400), vec![0]);
    }
}
