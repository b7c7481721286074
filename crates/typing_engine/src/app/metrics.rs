use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub tps: f32,
    /// Simulated time advanced per second of wall time.
    pub sim_speed: f32,
    pub dropped_backlog_ms: u64,
    pub total_ticks: u64,
    /// Longest single scene update within the interval.
    pub slowest_update_us: u64,
}

/// Rolls tick counts and scene update timings into periodic snapshots.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    sim_time: Duration,
    dropped_backlog: Duration,
    slowest_update: Duration,
    total_ticks: u64,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            ticks: 0,
            sim_time: Duration::ZERO,
            dropped_backlog: Duration::ZERO,
            slowest_update: Duration::ZERO,
            total_ticks: 0,
        }
    }

    pub(crate) fn record_tick(&mut self, fixed_dt: Duration, update_time: Duration) {
        self.ticks = self.ticks.saturating_add(1);
        self.total_ticks = self.total_ticks.saturating_add(1);
        self.sim_time = self.sim_time.saturating_add(fixed_dt);
        self.slowest_update = self.slowest_update.max(update_time);
    }

    pub(crate) fn record_dropped_backlog(&mut self, dropped: Duration) {
        self.dropped_backlog = self.dropped_backlog.saturating_add(dropped);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        if now.saturating_duration_since(self.interval_start) < self.interval {
            return None;
        }
        Some(self.take_snapshot(now))
    }

    /// Closes the current interval regardless of its length.
    pub(crate) fn take_snapshot(&mut self, now: Instant) -> LoopMetricsSnapshot {
        let elapsed_seconds = now
            .saturating_duration_since(self.interval_start)
            .as_secs_f32()
            .max(f32::EPSILON);
        let snapshot = LoopMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            sim_speed: self.sim_time.as_secs_f32() / elapsed_seconds,
            dropped_backlog_ms: self.dropped_backlog.as_millis() as u64,
            total_ticks: self.total_ticks,
            slowest_update_us: self.slowest_update.as_micros() as u64,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.sim_time = Duration::ZERO;
        self.dropped_backlog = Duration::ZERO;
        self.slowest_update = Duration::ZERO;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_rates_over_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        for update_ms in [2, 9, 4, 1] {
            accumulator.record_tick(Duration::from_millis(500), Duration::from_millis(update_ms));
        }
        accumulator.record_dropped_backlog(Duration::from_millis(30));

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(2))
            .expect("snapshot should be emitted");
        assert!((snapshot.tps - 2.0).abs() < 0.01);
        assert!((snapshot.sim_speed - 1.0).abs() < 0.01);
        assert_eq!(snapshot.dropped_backlog_ms, 30);
        assert_eq!(snapshot.total_ticks, 4);
        assert_eq!(snapshot.slowest_update_us, 9_000);

        let next = accumulator.take_snapshot(base + Duration::from_secs(3));
        assert_eq!(next.tps, 0.0);
        assert_eq!(next.total_ticks, 4);
        assert_eq!(next.slowest_update_us, 0);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        accumulator.record_tick(Duration::from_millis(16), Duration::ZERO);
        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }
}
