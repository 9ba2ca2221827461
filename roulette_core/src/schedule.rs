//! Deceleration schedules for the highlight animation.
//!
//! A schedule is a list of tick delays in milliseconds whose sum matches a
//! requested total duration. Delays follow
//! `start + (end - start) * (i / (N - 1))^exponent`, scaled as a whole so the
//! total is exact regardless of how well the tick count `N` was estimated.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_EXPONENT: f64 = 2.0;
/// Upper bound on ticks in a single schedule.
pub const MAX_TICKS: usize = 100_000;
pub const MIN_INTERVAL_MS: u32 = 1;
/// Longest ceremony a schedule will cover; larger totals are clamped.
pub const MAX_DURATION_SECS: f64 = 3600.0;

/// Start/end highlight intervals in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalBounds {
    pub start_ms: u32,
    pub end_ms: u32,
}

impl IntervalBounds {
    pub fn new(start_ms: u32, end_ms: u32) -> Self {
        Self { start_ms, end_ms }
    }

    /// Ordered so the animation strictly decelerates.
    pub fn normalized(self) -> Self {
        if self.start_ms > self.end_ms {
            Self::new(self.end_ms, self.start_ms)
        } else {
            self
        }
    }
}

/// Range of draw durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationRange {
    pub lower: f64,
    pub upper: f64,
}

impl DurationRange {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn normalized(self) -> Self {
        if self.lower > self.upper {
            Self::new(self.upper, self.lower)
        } else {
            self
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let r = self.normalized();
        value >= r.lower && value <= r.upper
    }
}

pub fn compute_schedule(
    total_duration_secs: f64,
    start_interval_ms: u32,
    end_interval_ms: u32,
) -> Vec<u32> {
    compute_schedule_with_exponent(
        total_duration_secs,
        start_interval_ms,
        end_interval_ms,
        DEFAULT_EXPONENT,
    )
}

pub fn compute_schedule_with_exponent(
    total_duration_secs: f64,
    start_interval_ms: u32,
    end_interval_ms: u32,
    exponent: f64,
) -> Vec<u32> {
    let start = start_interval_ms.max(MIN_INTERVAL_MS) as f64;
    let end = end_interval_ms.max(MIN_INTERVAL_MS) as f64;
    // NaN and infinities fall into this branch too.
    if !(total_duration_secs.is_finite() && total_duration_secs > 0.0) {
        return vec![start as u32];
    }
    let total_duration_secs = if total_duration_secs > MAX_DURATION_SECS {
        warn!(requested = total_duration_secs, max = MAX_DURATION_SECS, "draw duration clamped");
        MAX_DURATION_SECS
    } else {
        total_duration_secs
    };
    let exponent = if exponent.is_finite() && exponent > 0.0 { exponent } else { DEFAULT_EXPONENT };

    let target_ms = total_duration_secs * 1000.0;
    let average = (start + end) / 2.0;
    let ticks = ((target_ms / average).round() as usize).clamp(2, MAX_TICKS);

    let raw: Vec<f64> = (0..ticks)
        .map(|i| {
            let p = i as f64 / (ticks - 1) as f64;
            start + (end - start) * p.powf(exponent)
        })
        .collect();
    let raw_sum: f64 = raw.iter().sum();
    let scale = target_ms / raw_sum;

    // Cumulative rounding keeps the rounded total within half a millisecond.
    let mut intervals = Vec::with_capacity(ticks);
    let mut running = 0.0;
    let mut emitted: u64 = 0;
    for value in &raw {
        running += value * scale;
        let cumulative = running.round() as u64;
        let step = cumulative.saturating_sub(emitted);
        emitted = emitted.max(cumulative);
        intervals.push((step.min(u32::MAX as u64) as u32).max(MIN_INTERVAL_MS));
    }

    let target = target_ms.round() as u64;
    rebalance(&mut intervals, target);
    intervals
}

/// Take back milliseconds added by the 1 ms floor, largest intervals first.
fn rebalance(intervals: &mut [u32], target: u64) {
    let mut excess = intervals
        .iter()
        .map(|&v| v as u64)
        .sum::<u64>()
        .saturating_sub(target);
    while excess > 0 {
        let Some((idx, &largest)) = intervals.iter().enumerate().max_by_key(|(_, v)| **v) else {
            return;
        };
        if largest <= MIN_INTERVAL_MS {
            return;
        }
        let take = (excess.min((largest - MIN_INTERVAL_MS) as u64)) as u32;
        intervals[idx] -= take;
        excess -= take as u64;
    }
}

pub fn schedule_total_secs(schedule: &[u32]) -> f64 {
    schedule.iter().map(|&v| v as u64).sum::<u64>() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(total: f64, start: u32, end: u32) {
        let schedule = compute_schedule(total, start, end);
        assert!(!schedule.is_empty());
        assert!(schedule.iter().all(|&v| v >= 1), "{total} {start} {end}");
        let sum = schedule_total_secs(&schedule);
        assert!((sum - total).abs() <= 0.01, "total={total} start={start} end={end} sum={sum}");
    }

    #[test]
    fn test_total_matches_across_inputs() {
        for &total in &[0.05, 0.5, 1.0, 3.0, 7.3, 10.0, 49.9, 120.0] {
            let bounds = [
                (100, 500),
                (500, 100),
                (1, 5000),
                (250, 250),
                (5000, 100),
                (1, 1),
                (0, 0),
            ];
            for &(start, end) in &bounds {
                assert_valid(total, start, end);
            }
        }
    }

    #[test]
    fn test_tiny_totals_stay_close() {
        for &total in &[0.001, 0.002, 0.004, 0.009] {
            assert_valid(total, 100, 500);
        }
    }

    #[test]
    fn test_decelerates() {
        let schedule = compute_schedule(8.0, 100, 500);
        assert!(schedule.len() > 2);
        assert!(schedule.first() < schedule.last());
        let rising = schedule.windows(2).filter(|w| w[1] >= w[0]).count();
        assert!(rising >= schedule.len() - 2);
    }

    #[test]
    fn test_reversed_bounds_accelerate() {
        let schedule = compute_schedule(8.0, 500, 100);
        assert!(schedule.first() > schedule.last());
        let fixed = IntervalBounds::new(500, 100).normalized();
        assert_eq!(fixed, IntervalBounds::new(100, 500));
    }

    #[test]
    fn test_non_positive_duration() {
        assert_eq!(compute_schedule(0.0, 120, 500), vec![120]);
        assert_eq!(compute_schedule(-4.0, 0, 500), vec![1]);
        assert_eq!(compute_schedule(f64::NAN, 80, 500), vec![80]);
        assert_eq!(compute_schedule(f64::INFINITY, 80, 500), vec![80]);
        assert_eq!(compute_schedule(f64::NEG_INFINITY, 80, 500), vec![80]);
    }

    #[test]
    fn test_huge_duration_clamped() {
        for &total in &[MAX_DURATION_SECS + 1.0, 1e9, 1e12, f64::MAX] {
            let schedule = compute_schedule(total, 100, 500);
            assert!(schedule.len() <= MAX_TICKS);
            assert!(schedule.iter().all(|&v| v >= MIN_INTERVAL_MS));
            let sum = schedule_total_secs(&schedule);
            assert!((sum - MAX_DURATION_SECS).abs() <= 0.01, "total={total} sum={sum}");
        }
        assert_valid(MAX_DURATION_SECS, 100, 500);
    }

    #[test]
    fn test_duration_range_normalized() {
        let range = DurationRange::new(10.0, 3.0).normalized();
        assert_eq!(range, DurationRange::new(3.0, 10.0));
        assert!(range.contains(3.0) && range.contains(10.0));
        assert!(!range.contains(10.5));
    }
}
