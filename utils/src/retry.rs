//! Fixed retry schedules.
//!
//! A schedule is an explicit list of delays: attempt `n` waits `delays[n]`
//! before running, and once the list is exhausted the caller gives up.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Build a schedule from delays in whole seconds.
    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Delay before attempt `attempt` (zero-based), or `None` once the
    /// schedule is exhausted.
    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    /// Number of attempts the schedule allows.
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }
}

impl Default for RetrySchedule {
    /// Immediate first attempt, then 1s, 5s and 10s.
    fn default() -> Self {
        Self::from_secs(&[0, 1, 5, 10])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_starts_immediately() {
        let s = RetrySchedule::default();
        assert_eq!(s.attempts(), 4);
        assert_eq!(s.delay(0), Some(Duration::ZERO));
        assert_eq!(s.delay(3), Some(Duration::from_secs(10)));
        assert_eq!(s.delay(4), None);
    }

    #[test]
    fn empty_schedule_allows_nothing() {
        let s = RetrySchedule::new(Vec::new());
        assert!(s.is_empty());
        assert_eq!(s.delay(0), None);
    }
}
