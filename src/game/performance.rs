//! Tick performance monitoring
//!
//! Tracks tick durations against the tick interval budget, and times named
//! sections of each tick (expire, advance, collision, ...) for periodic
//! profiling reports.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::game::constants::profiling::{MIN_REMAINDER, OUTLIER_FACTOR, REPORT_INTERVAL};

/// Performance status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    /// Well under budget
    Excellent,
    /// Normal operation
    Good,
    /// Close to the budget, catch-up ticks likely
    Warning,
    /// Over budget, the simulation is falling behind wall-clock time
    Critical,
}

impl PerformanceStatus {
    pub fn is_behind(&self) -> bool {
        matches!(self, PerformanceStatus::Critical)
    }
}

/// Accumulated timings of one named block of code
#[derive(Debug, Clone, Default)]
pub struct SectionStats {
    pub count: u32,
    pub total: Duration,
    pub max: Duration,
}

impl SectionStats {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.max = self.max.max(duration);
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }

    /// `name N * avg = total`, with the max called out when it is an outlier
    fn summary(&self, name: &str) -> String {
        let avg = self.average();
        let mut line = format!("{} {} * {:.2?} = {:.2?}", name, self.count, avg, self.total);
        if self.max >= avg * OUTLIER_FACTOR && self.max > Duration::ZERO {
            line.push_str(&format!(" (max {:.2?})", self.max));
        }
        line
    }
}

/// Performance monitor that tracks tick durations
pub struct PerformanceMonitor {
    /// Rolling window of tick durations
    tick_durations: VecDeque<Duration>,
    /// Maximum samples to keep
    max_samples: usize,
    /// Target tick duration (budget)
    target_tick_duration: Duration,
    /// Thresholds as fractions of the budget
    excellent_threshold: f32,
    warning_threshold: f32,
    critical_threshold: f32,
    status: PerformanceStatus,
    tick_start: Option<Instant>,

    /// Whole ticks since the last report
    ticks: SectionStats,
    /// Sections within the tick, in first-seen order
    sections: Vec<(&'static str, SectionStats)>,
    report_interval: Duration,
    last_report: Instant,
}

impl PerformanceMonitor {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_durations: VecDeque::with_capacity(120),
            max_samples: 120,
            target_tick_duration: tick_interval.max(Duration::from_micros(1)),
            excellent_threshold: 0.3,
            warning_threshold: 0.7,
            critical_threshold: 1.0,
            status: PerformanceStatus::Excellent,
            tick_start: None,
            ticks: SectionStats::default(),
            sections: Vec::new(),
            report_interval: REPORT_INTERVAL,
            last_report: Instant::now(),
        }
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Start timing a tick
    pub fn tick_start(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// End timing a tick and record the duration
    pub fn tick_end(&mut self) {
        if let Some(start) = self.tick_start.take() {
            self.record_tick(start.elapsed());
        }
    }

    fn record_tick(&mut self, duration: Duration) {
        self.ticks.record(duration);
        self.tick_durations.push_back(duration);
        while self.tick_durations.len() > self.max_samples {
            self.tick_durations.pop_front();
        }
        self.update_status();
    }

    /// Run `f`, charging its duration to section `name`
    pub fn time<R>(&mut self, name: &'static str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record_section(name, start.elapsed());
        result
    }

    fn record_section(&mut self, name: &'static str, duration: Duration) {
        match self.sections.iter_mut().find(|(n, _)| *n == name) {
            Some((_, stats)) => stats.record(duration),
            None => {
                let mut stats = SectionStats::default();
                stats.record(duration);
                self.sections.push((name, stats));
            }
        }
    }

    fn update_status(&mut self) {
        if self.tick_durations.len() < 10 {
            return;
        }

        let ratio = self.average_tick_duration().as_secs_f32() / self.target_tick_duration.as_secs_f32();
        self.status = if ratio < self.excellent_threshold {
            PerformanceStatus::Excellent
        } else if ratio < self.warning_threshold {
            PerformanceStatus::Good
        } else if ratio < self.critical_threshold {
            PerformanceStatus::Warning
        } else {
            PerformanceStatus::Critical
        };
    }

    /// Get average tick duration
    pub fn average_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.tick_durations.iter().sum();
        sum / self.tick_durations.len() as u32
    }

    /// Tick duration at the given percentile (0.0-1.0) of the rolling window
    pub fn percentile_tick_duration(&self, percentile: f32) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.tick_durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * percentile) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn p95_tick_duration(&self) -> Duration {
        self.percentile_tick_duration(0.95)
    }

    pub fn p99_tick_duration(&self) -> Duration {
        self.percentile_tick_duration(0.99)
    }

    pub fn max_tick_duration(&self) -> Duration {
        self.tick_durations.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    /// Get budget usage as percentage (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        (self.average_tick_duration().as_secs_f32() / self.target_tick_duration.as_secs_f32()) * 100.0
    }

    pub fn status_message(&self) -> String {
        format!("{:?} - {:.1}% budget", self.status, self.budget_usage_percent())
    }

    /// Report lines for everything timed since the last reset
    ///
    /// One line for the tick, one indented line per section, and a
    /// `remainder` line for tick time not covered by any section.
    pub fn report_lines(&self) -> Vec<String> {
        if self.ticks.count == 0 {
            return Vec::new();
        }
        let mut lines = Vec::with_capacity(self.sections.len() + 2);
        lines.push(self.ticks.summary("tick"));

        let covered: Duration = self.sections.iter().map(|(_, s)| s.total).sum();
        for (name, stats) in &self.sections {
            lines.push(format!("  {}", stats.summary(name)));
        }
        let remainder = self.ticks.total.saturating_sub(covered);
        if !self.sections.is_empty() && remainder >= MIN_REMAINDER {
            lines.push(format!("  remainder {:.2?}", remainder));
        }
        lines
    }

    /// Take the report once the report interval has elapsed
    ///
    /// Section timings are reset afterwards so each report covers only the
    /// last interval. The rolling tick window is kept.
    pub fn take_report(&mut self, now: Instant) -> Option<Vec<String>> {
        if now.saturating_duration_since(self.last_report) < self.report_interval {
            return None;
        }
        self.last_report = now;
        let lines = self.report_lines();
        self.ticks = SectionStats::default();
        self.sections.clear();
        if lines.is_empty() {
            None
        } else {
            Some(lines)
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}
