//! Simple profiling utility for measuring fixed-tick stage cost.
//!
//! [`SimWorld`](crate::api::SimWorld) times each schedule stage (timescale,
//! path requests, path following) under its own section name once profiling
//! is enabled with `SimWorld::enable_profiling`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// A simple profiler for measuring named sections of code.
#[derive(Debug, Default)]
pub struct Profiler {
    /// Accumulated time per section
    sections: HashMap<String, SectionStats>,
    /// Total ticks profiled
    tick_count: u64,
}

/// Statistics for a profiled section
#[derive(Debug, Default, Clone)]
pub struct SectionStats {
    pub total_time: Duration,
    pub call_count: u64,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
}

impl SectionStats {
    pub fn avg_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.call_count as u32
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.total_time += elapsed;
        self.call_count += 1;
        self.min_time = Some(self.min_time.map_or(elapsed, |m| m.min(elapsed)));
        self.max_time = Some(self.max_time.map_or(elapsed, |m| m.max(elapsed)));
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time a section using a closure.
    pub fn time_section<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        match self.sections.get_mut(name) {
            Some(stats) => stats.record(elapsed),
            None => {
                let mut stats = SectionStats::default();
                stats.record(elapsed);
                self.sections.insert(name.to_string(), stats);
            }
        }
        result
    }

    /// Increment the tick counter.
    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    /// Get the number of ticks profiled.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Get statistics for a specific section.
    pub fn get_section(&self, name: &str) -> Option<&SectionStats> {
        self.sections.get(name)
    }

    /// Get all section names.
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(|s| s.as_str()).collect()
    }

    /// Format a table of all profiled sections, slowest first.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Profiler Summary ({} ticks) ===", self.tick_count);

        let mut sections: Vec<_> = self.sections.iter().collect();
        sections.sort_by(|a, b| b.1.total_time.cmp(&a.1.total_time));

        let total: Duration = sections.iter().map(|(_, s)| s.total_time).sum();

        let _ = writeln!(
            out,
            "{:<25} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "Section", "Total", "Avg/call", "Min", "Max", "% Time"
        );
        let _ = writeln!(out, "{}", "-".repeat(78));

        for (name, stats) in &sections {
            let pct = if total.as_nanos() > 0 {
                (stats.total_time.as_nanos() as f64 / total.as_nanos() as f64) * 100.0
            } else {
                0.0
            };

            let _ = writeln!(
                out,
                "{:<25} {:>10.2?} {:>10.2?} {:>10.2?} {:>10.2?} {:>7.1}%",
                name,
                stats.total_time,
                stats.avg_time(),
                stats.min_time.unwrap_or(Duration::ZERO),
                stats.max_time.unwrap_or(Duration::ZERO),
                pct
            );
        }

        let _ = writeln!(out, "{}", "-".repeat(78));
        let _ = writeln!(out, "{:<25} {:>10.2?}", "TOTAL", total);
        if self.tick_count > 0 {
            let avg_tick = total / self.tick_count as u32;
            let _ = writeln!(out, "{:<25} {:>10.2?}", "Avg per tick", avg_tick);
        }
        out
    }

    /// Reset all profiling data.
    pub fn reset(&mut self) {
        self.sections.clear();
        self.tick_count = 0;
    }
}
