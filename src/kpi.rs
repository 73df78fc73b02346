//! Streaming KPI aggregation over the event log.
//!
//! The aggregator is a pull-based consumer: it remembers how far into the
//! recorder it has read and drains newly appended events once per tick.
//! Every update is O(1), so arbitrarily long simulated runs aggregate
//! without re-scanning the log.
//!
//! # Metrics computed per window
//!
//! - **Response time**: submission-to-first-dispatch delay distribution
//! - **Latency percentiles**: p50/p95/p99 from a log2-bucket histogram
//! - **Throughput**: completions per tick of window
//! - **Utilization**: CPU units allocated vs capacity, sampled each tick
//! - **Deadline-miss rate**: misses / (misses + completions)

use crate::recorder::{EventKind, EventRecorder, SchedEvent};
use crate::types::{MemUnits, Tick};

/// Summary statistics for a distribution of tick values.
#[derive(Debug, Clone, Default)]
pub struct DistributionStats {
    /// Number of samples.
    pub count: u64,
    /// Minimum value (or 0 if empty).
    pub min: Tick,
    /// Maximum value (or 0 if empty).
    pub max: Tick,
    /// Sum of all values.
    pub sum: Tick,
    /// Sum of squares (for variance calculation).
    sum_sq: u128,
}

impl DistributionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample value.
    pub fn add(&mut self, value: Tick) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += (value as u128) * (value as u128);
    }

    /// Mean value (or 0 if empty).
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Standard deviation (or 0 if empty or single sample).
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            let mean = self.mean();
            let variance = (self.sum_sq as f64 / self.count as f64) - (mean * mean);
            variance.max(0.0).sqrt()
        }
    }
}

/// Number of log2 buckets: values 0, 1, [2,4), ... up to the full u64 range.
const LATENCY_BUCKETS: usize = 65;

/// Fixed-size log2 histogram for streaming percentile estimates.
///
/// Inserts are O(1); a percentile query scans the 65 buckets and reports
/// the upper bound of the bucket holding the requested rank, so estimates
/// are conservative (never below the true percentile).
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    buckets: Vec<u64>,
    count: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        LatencyHistogram {
            buckets: vec![0; LATENCY_BUCKETS],
            count: 0,
        }
    }

    fn bucket_of(value: Tick) -> usize {
        (64 - value.leading_zeros()) as usize
    }

    fn bucket_upper_bound(idx: usize) -> Tick {
        match idx {
            0 => 0,
            64.. => u64::MAX,
            _ => (1u64 << idx) - 1,
        }
    }

    pub fn record(&mut self, value: Tick) {
        self.buckets[Self::bucket_of(value)] += 1;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The value at or below which fraction `p` of samples fall.
    /// Returns 0 for an empty histogram.
    pub fn percentile(&self, p: f64) -> Tick {
        if self.count == 0 {
            return 0;
        }
        let rank = ((p * self.count as f64).ceil() as u64).clamp(1, self.count);
        let mut seen = 0u64;
        for (idx, &n) in self.buckets.iter().enumerate() {
            seen += n;
            if seen >= rank {
                return Self::bucket_upper_bound(idx);
            }
        }
        Self::bucket_upper_bound(LATENCY_BUCKETS - 1)
    }
}

/// Aggregated statistics for one time window `[start, end)`.
#[derive(Debug, Clone)]
pub struct KpiWindow {
    pub start: Tick,
    pub end: Tick,
    pub dispatches: u64,
    pub completions: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejections: u64,
    pub preemptions: u64,
    /// Submission-to-first-dispatch delays observed in this window.
    pub response: DistributionStats,
    latency: LatencyHistogram,
    cpu_busy: u64,
    cpu_capacity: u64,
    mem_used: u128,
    mem_capacity: u128,
    samples: u64,
}

impl KpiWindow {
    fn new(start: Tick, end: Tick) -> Self {
        KpiWindow {
            start,
            end,
            dispatches: 0,
            completions: 0,
            misses: 0,
            evictions: 0,
            rejections: 0,
            preemptions: 0,
            response: DistributionStats::new(),
            latency: LatencyHistogram::new(),
            cpu_busy: 0,
            cpu_capacity: 0,
            mem_used: 0,
            mem_capacity: 0,
            samples: 0,
        }
    }

    /// Completions per tick of window length.
    pub fn throughput(&self) -> f64 {
        let len = self.end - self.start;
        if len == 0 {
            0.0
        } else {
            self.completions as f64 / len as f64
        }
    }

    /// CPU units allocated over CPU units available, across the ticks
    /// sampled so far.
    pub fn utilization(&self) -> f64 {
        if self.cpu_capacity == 0 {
            0.0
        } else {
            self.cpu_busy as f64 / self.cpu_capacity as f64
        }
    }

    /// Mean fraction of the memory budget allocated.
    pub fn mem_utilization(&self) -> f64 {
        if self.mem_capacity == 0 {
            0.0
        } else {
            self.mem_used as f64 / self.mem_capacity as f64
        }
    }

    /// Deadline misses over terminal outcomes with a verdict.
    pub fn miss_rate(&self) -> f64 {
        let decided = self.misses + self.completions;
        if decided == 0 {
            0.0
        } else {
            self.misses as f64 / decided as f64
        }
    }

    pub fn latency_percentile(&self, p: f64) -> Tick {
        self.latency.percentile(p)
    }
}

/// Streaming reducer from the event log into per-window statistics.
pub struct KpiAggregator {
    window_len: Tick,
    /// Reporting scale: simulated microseconds per tick.
    tick_micros: u64,
    /// How far into the recorder this aggregator has read.
    consumed: usize,
    closed: Vec<KpiWindow>,
    current: KpiWindow,
}

impl KpiAggregator {
    pub fn new(window_len: Tick, tick_micros: u64) -> Self {
        let window_len = window_len.max(1);
        KpiAggregator {
            window_len,
            tick_micros,
            consumed: 0,
            closed: Vec::new(),
            current: KpiWindow::new(0, window_len),
        }
    }

    /// Close windows until `now` falls inside the current one.
    pub fn advance_to(&mut self, now: Tick) {
        while now >= self.current.end {
            let next_start = self.current.end;
            let finished = std::mem::replace(
                &mut self.current,
                KpiWindow::new(next_start, next_start + self.window_len),
            );
            self.closed.push(finished);
        }
    }

    /// Pull events appended since the last drain. O(1) per event.
    pub fn drain(&mut self, recorder: &EventRecorder) {
        while let Some(event) = recorder.get(self.consumed) {
            self.consumed += 1;
            self.observe(&event);
        }
    }

    fn observe(&mut self, event: &SchedEvent) {
        let w = &mut self.current;
        match event.kind {
            EventKind::Dispatch { wait, .. } => {
                w.dispatches += 1;
                if let Some(wait) = wait {
                    w.response.add(wait);
                    w.latency.record(wait);
                }
            }
            EventKind::Preempt { .. } => w.preemptions += 1,
            EventKind::Evict { .. } => w.evictions += 1,
            EventKind::Complete { .. } => w.completions += 1,
            EventKind::DeadlineMiss { .. } => w.misses += 1,
            EventKind::AdmissionRejected { .. } => w.rejections += 1,
        }
    }

    /// Record one tick's resource allocation sample.
    pub fn observe_tick(
        &mut self,
        cpu_allocated: u64,
        cpu_capacity: u64,
        mem_allocated: MemUnits,
        mem_capacity: MemUnits,
    ) {
        let w = &mut self.current;
        w.cpu_busy += cpu_allocated;
        w.cpu_capacity += cpu_capacity;
        w.mem_used += mem_allocated as u128;
        w.mem_capacity += mem_capacity as u128;
        w.samples += 1;
    }

    /// Closed windows plus the in-progress one, in time order.
    pub fn snapshot(&self) -> KpiSnapshot {
        let mut windows = self.closed.clone();
        windows.push(self.current.clone());
        KpiSnapshot {
            windows,
            tick_micros: self.tick_micros,
        }
    }
}

/// Point-in-time view of all windows, consumed by the external reporting
/// and prediction layers.
#[derive(Debug, Clone)]
pub struct KpiSnapshot {
    pub windows: Vec<KpiWindow>,
    /// Simulated microseconds one tick stands for.
    pub tick_micros: u64,
}

impl KpiSnapshot {
    pub fn total_completions(&self) -> u64 {
        self.windows.iter().map(|w| w.completions).sum()
    }

    pub fn total_misses(&self) -> u64 {
        self.windows.iter().map(|w| w.misses).sum()
    }

    pub fn total_evictions(&self) -> u64 {
        self.windows.iter().map(|w| w.evictions).sum()
    }

    pub fn total_rejections(&self) -> u64 {
        self.windows.iter().map(|w| w.rejections).sum()
    }

    pub fn overall_miss_rate(&self) -> f64 {
        let completions = self.total_completions();
        let misses = self.total_misses();
        if completions + misses == 0 {
            0.0
        } else {
            misses as f64 / (completions + misses) as f64
        }
    }

    /// Mean response time across all windows.
    pub fn overall_response_mean(&self) -> f64 {
        let count: u64 = self.windows.iter().map(|w| w.response.count).sum();
        let sum: u64 = self.windows.iter().map(|w| w.response.sum).sum();
        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }

    /// Coarse system-health score in [0, 100].
    ///
    /// Deductions follow the platform tuning heuristics: deadline misses
    /// cost up to 20 points, sustained memory pressure (>80% of budget)
    /// costs 15, and a mean response time beyond 10 ticks costs 10.
    pub fn health_score(&self) -> f64 {
        let mut score = 100.0;

        let miss_rate = self.overall_miss_rate();
        if miss_rate > 0.0 {
            score -= 20.0 * miss_rate.min(1.0);
        }

        let pressured = self
            .windows
            .iter()
            .filter(|w| w.samples > 0 && w.mem_utilization() > 0.8)
            .count();
        if pressured > 0 {
            score -= 15.0;
        }

        if self.overall_response_mean() > 10.0 {
            score -= 10.0;
        }

        score.max(0.0)
    }

    /// Print a summary report to stderr.
    pub fn print_summary(&self) {
        eprintln!("\n=== KPI Summary ===\n");
        for w in &self.windows {
            eprintln!("  Window [{}, {}):", w.start, w.end);
            eprintln!("    Dispatches:   {}", w.dispatches);
            eprintln!("    Completions:  {}", w.completions);
            eprintln!("    Misses:       {}", w.misses);
            eprintln!("    Evictions:    {}", w.evictions);
            eprintln!("    Rejections:   {}", w.rejections);
            eprintln!(
                "    Response:     {:.2} mean, {:.2} stddev (ticks; {:.2}ms mean)",
                w.response.mean(),
                w.response.stddev(),
                w.response.mean() * self.tick_micros as f64 / 1_000.0
            );
            eprintln!(
                "    Latency:      p50={} p95={} p99={}",
                w.latency_percentile(0.50),
                w.latency_percentile(0.95),
                w.latency_percentile(0.99)
            );
            eprintln!("    Throughput:   {:.3} completions/tick", w.throughput());
            eprintln!(
                "    Utilization:  cpu {:.1}% mem {:.1}%",
                100.0 * w.utilization(),
                100.0 * w.mem_utilization()
            );
            eprintln!("    Miss rate:    {:.1}%", 100.0 * w.miss_rate());
        }
        eprintln!("\n  Health score: {:.1}/100\n", self.health_score());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CpuId, TaskId};

    #[test]
    fn test_distribution_stats_empty() {
        let stats = DistributionStats::new();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.stddev(), 0.0);
    }

    #[test]
    fn test_distribution_stats_multiple() {
        let mut stats = DistributionStats::new();
        stats.add(100);
        stats.add(200);
        stats.add(300);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 100);
        assert_eq!(stats.max, 300);
        assert_eq!(stats.mean(), 200.0);
        // stddev of [100,200,300] is ~81.65
        assert!(stats.stddev() > 80.0 && stats.stddev() < 83.0);
    }

    #[test]
    fn test_histogram_buckets() {
        let mut h = LatencyHistogram::new();
        h.record(0);
        h.record(1);
        h.record(2);
        h.record(3);
        assert_eq!(h.count(), 4);
        assert_eq!(h.percentile(0.25), 0);
        assert_eq!(h.percentile(0.5), 1);
        assert_eq!(h.percentile(1.0), 3);
    }

    #[test]
    fn test_histogram_percentile_is_conservative() {
        let mut h = LatencyHistogram::new();
        for v in [5, 6, 7, 100] {
            h.record(v);
        }
        // 5..=7 land in the [4,8) bucket whose upper bound is 7.
        assert_eq!(h.percentile(0.5), 7);
        assert!(h.percentile(0.99) >= 100);
    }

    #[test]
    fn test_windows_roll_over() {
        let rec = EventRecorder::new();
        let mut kpi = KpiAggregator::new(10, 1_000);

        rec.record(
            2,
            TaskId(1),
            EventKind::Dispatch {
                cpu: CpuId(0),
                wait: Some(2),
            },
        );
        rec.record(4, TaskId(1), EventKind::Complete { turnaround: 4 });
        kpi.advance_to(4);
        kpi.drain(&rec);

        rec.record(12, TaskId(2), EventKind::Complete { turnaround: 3 });
        kpi.advance_to(12);
        kpi.drain(&rec);

        let snap = kpi.snapshot();
        assert_eq!(snap.windows.len(), 2);
        assert_eq!(snap.windows[0].completions, 1);
        assert_eq!(snap.windows[1].completions, 1);
        assert_eq!(snap.total_completions(), 2);
    }

    #[test]
    fn test_miss_rate_and_health() {
        let rec = EventRecorder::new();
        let mut kpi = KpiAggregator::new(10, 1_000);
        rec.record(1, TaskId(1), EventKind::Complete { turnaround: 2 });
        rec.record(3, TaskId(2), EventKind::DeadlineMiss { deadline: 3 });
        kpi.drain(&rec);

        let snap = kpi.snapshot();
        assert_eq!(snap.overall_miss_rate(), 0.5);
        assert!(snap.health_score() < 100.0);
    }

    #[test]
    fn test_utilization_sampling() {
        let mut kpi = KpiAggregator::new(10, 1_000);
        kpi.observe_tick(1, 2, 8, 16);
        kpi.observe_tick(2, 2, 8, 16);
        let snap = kpi.snapshot();
        let w = &snap.windows[0];
        assert_eq!(w.utilization(), 0.75);
        assert_eq!(w.mem_utilization(), 0.5);
    }
}
