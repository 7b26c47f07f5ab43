//! Fixed-capacity rolling window of uptime samples

use crate::models::{SampleStatus, UptimeHistoryEntry};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Ring buffer of uptime samples for one website.
///
/// Polls landing in the same sampling slot are folded into one entry, so the
/// window covers `capacity * sample_interval` regardless of the live poll
/// cadence. Every derived value is recomputed from the entries themselves.
#[derive(Debug, Clone)]
pub struct UptimeHistory {
    entries: VecDeque<UptimeHistoryEntry>,
    capacity: usize,
    sample_interval: Duration,
}

impl UptimeHistory {
    pub fn new(capacity: usize, sample_interval: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            sample_interval,
        }
    }

    /// Record one observation. Returns the evicted entry when the window was full.
    pub fn record(&mut self, entry: UptimeHistoryEntry) -> Option<UptimeHistoryEntry> {
        let same_slot = self
            .entries
            .back()
            .is_some_and(|last| self.same_slot(last.timestamp, entry.timestamp));

        if same_slot {
            if let Some(last) = self.entries.back_mut() {
                fold_into(last, entry);
            }
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };

        self.entries.push_back(entry);
        if evicted.is_some() {
            debug!("Uptime window full at {}, evicted oldest sample", self.capacity);
        }

        evicted
    }

    fn same_slot(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        let slot_ms = self.sample_interval.as_millis() as i64;
        if slot_ms == 0 {
            return false;
        }
        a.timestamp_millis().div_euclid(slot_ms) == b.timestamp_millis().div_euclid(slot_ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &UptimeHistoryEntry> {
        self.entries.iter()
    }

    /// Oldest first
    pub fn to_vec(&self) -> Vec<UptimeHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Share of `up` samples, rounded to two decimals. 0 for an empty window.
    pub fn uptime_percentage(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }

        let up = self
            .entries
            .iter()
            .filter(|e| e.status == SampleStatus::Up)
            .count();

        round2(up as f64 / self.entries.len() as f64 * 100.0)
    }

    /// Mean of measured response times, 0 when none were measured
    pub fn avg_response_time(&self) -> u64 {
        let measured: Vec<u64> = self
            .entries
            .iter()
            .filter_map(|e| e.response_time_ms)
            .collect();

        if measured.is_empty() {
            return 0;
        }

        let sum: u64 = measured.iter().sum();
        (sum as f64 / measured.len() as f64).round() as u64
    }
}

/// Worst status wins; the newest measured response time is kept
fn fold_into(slot: &mut UptimeHistoryEntry, newer: UptimeHistoryEntry) {
    if newer.status == SampleStatus::Down {
        slot.status = SampleStatus::Down;
    }
    if newer.response_time_ms.is_some() {
        slot.response_time_ms = newer.response_time_ms;
    }
    slot.timestamp = newer.timestamp;
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn sample(minutes: i64, status: SampleStatus, response_time_ms: Option<u64>) -> UptimeHistoryEntry {
        UptimeHistoryEntry {
            timestamp: DateTime::from_timestamp(0, 0).unwrap() + TimeDelta::minutes(minutes),
            status,
            response_time_ms,
        }
    }

    fn per_poll(capacity: usize) -> UptimeHistory {
        UptimeHistory::new(capacity, Duration::ZERO)
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut history = per_poll(96);
        for i in 0..200 {
            history.record(sample(i, SampleStatus::Up, Some(100)));
            assert!(history.len() <= 96);
        }
        assert_eq!(history.len(), 96);
    }

    #[test]
    fn test_full_window_evicts_exactly_the_oldest() {
        let mut history = per_poll(3);
        assert!(history.record(sample(0, SampleStatus::Up, Some(1))).is_none());
        history.record(sample(1, SampleStatus::Up, Some(2)));
        history.record(sample(2, SampleStatus::Up, Some(3)));

        let evicted = history.record(sample(3, SampleStatus::Down, None)).unwrap();
        assert_eq!(evicted.response_time_ms, Some(1));
        assert_eq!(history.len(), 3);
        assert_eq!(history.entries().next().unwrap().response_time_ms, Some(2));
    }

    #[test]
    fn test_uptime_percentage_rounds_to_two_decimals() {
        let mut history = per_poll(96);
        for i in 0..96 {
            let status = if i < 90 { SampleStatus::Up } else { SampleStatus::Down };
            history.record(sample(i, status, None));
        }
        assert_eq!(history.uptime_percentage(), 93.75);

        let mut history = per_poll(96);
        history.record(sample(0, SampleStatus::Up, None));
        history.record(sample(1, SampleStatus::Up, None));
        history.record(sample(2, SampleStatus::Down, None));
        assert_eq!(history.uptime_percentage(), 66.67);
    }

    #[test]
    fn test_derived_values_follow_evictions() {
        let mut history = per_poll(2);
        history.record(sample(0, SampleStatus::Down, None));
        history.record(sample(1, SampleStatus::Up, Some(100)));
        assert_eq!(history.uptime_percentage(), 50.0);

        history.record(sample(2, SampleStatus::Up, Some(300)));
        assert_eq!(history.uptime_percentage(), 100.0);
        assert_eq!(history.avg_response_time(), 200);
    }

    #[test]
    fn test_avg_response_time_skips_unmeasured() {
        let mut history = per_poll(10);
        assert_eq!(history.avg_response_time(), 0);

        history.record(sample(0, SampleStatus::Down, None));
        assert_eq!(history.avg_response_time(), 0);

        history.record(sample(1, SampleStatus::Up, Some(100)));
        history.record(sample(2, SampleStatus::Up, Some(201)));
        assert_eq!(history.avg_response_time(), 151);
    }

    #[test]
    fn test_empty_window_reports_zero_uptime() {
        assert_eq!(per_poll(4).uptime_percentage(), 0.0);
    }

    #[test]
    fn test_polls_in_same_slot_fold_worst_status() {
        let mut history = UptimeHistory::new(96, Duration::from_secs(15 * 60));
        history.record(sample(0, SampleStatus::Up, Some(120)));
        history.record(sample(5, SampleStatus::Down, None));
        history.record(sample(10, SampleStatus::Up, Some(80)));
        assert_eq!(history.len(), 1);

        let slot = history.entries().next().unwrap();
        assert_eq!(slot.status, SampleStatus::Down);
        assert_eq!(slot.response_time_ms, Some(80));

        history.record(sample(15, SampleStatus::Up, Some(90)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_fold_into_full_window_does_not_evict() {
        let mut history = UptimeHistory::new(2, Duration::from_secs(15 * 60));
        history.record(sample(0, SampleStatus::Up, Some(100)));
        history.record(sample(15, SampleStatus::Up, Some(200)));

        assert!(history.record(sample(20, SampleStatus::Down, None)).is_none());
        assert_eq!(history.len(), 2);
        assert_eq!(history.uptime_percentage(), 50.0);

        let evicted = history.record(sample(30, SampleStatus::Up, Some(300))).unwrap();
        assert_eq!(evicted.response_time_ms, Some(100));
        assert_eq!(history.avg_response_time(), 250);
    }
}
