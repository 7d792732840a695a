//! Aggregate CPU usage.
//!
//! `/proc/stat` only exposes cumulative tick counters, so the probe keeps the
//! previous sample as its state and reports the share of each mode over the
//! interval between two runs. The first run only primes the state.

use anyhow::{Context, Result};
use log::debug;
use procfs::{CurrentSI, KernelStats};

use crate::probes::StatefulProbe;
use crate::telemetry;

/// Cumulative CPU ticks across all cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub total: u64,
}

impl CpuTicks {
    pub fn read() -> Result<Self> {
        let stats = KernelStats::current().context("Failed to read /proc/stat")?;
        let cpu = stats.total;
        let iowait = cpu.iowait.unwrap_or(0);
        let irq = cpu.irq.unwrap_or(0) + cpu.softirq.unwrap_or(0);
        let steal = cpu.steal.unwrap_or(0);

        Ok(Self {
            user: cpu.user + cpu.nice,
            system: cpu.system + irq,
            idle: cpu.idle + iowait,
            total: cpu.user + cpu.nice + cpu.system + irq + cpu.idle + iowait + steal,
        })
    }

    /// Percentages of the interval since `previous`, or `None` when no ticks
    /// elapsed (or the counters went backwards).
    pub fn usage_since(&self, previous: &CpuTicks) -> Option<CpuUsage> {
        let total = self.total.checked_sub(previous.total)?;
        if total == 0 {
            return None;
        }

        let share =
            |now: u64, before: u64| now.saturating_sub(before) as f64 * 100.0 / total as f64;
        Some(CpuUsage {
            user: share(self.user, previous.user),
            system: share(self.system, previous.system),
            idle: share(self.idle, previous.idle),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuUsage {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

pub struct CpuProbe;

impl StatefulProbe<CpuTicks> for CpuProbe {
    fn sample(&self, previous: Option<CpuTicks>) -> Result<Option<CpuTicks>> {
        let current = CpuTicks::read()?;

        if let Some(usage) = previous.and_then(|p| current.usage_since(&p)) {
            debug!(
                "cpu user={:.1}% system={:.1}% idle={:.1}%",
                usage.user, usage.system, usage.idle
            );
            telemetry::record_cpu_usage(usage.user, usage.system, usage.idle);
        }

        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(user: u64, system: u64, idle: u64) -> CpuTicks {
        CpuTicks {
            user,
            system,
            idle,
            total: user + system + idle,
        }
    }

    #[test]
    fn test_usage_since_previous_sample() {
        let previous = ticks(100, 50, 850);
        let current = ticks(130, 60, 1010);

        let usage = current.usage_since(&previous).unwrap();

        assert!((usage.user - 15.0).abs() < 1e-9);
        assert!((usage.system - 5.0).abs() < 1e-9);
        assert!((usage.idle - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_usage_since_without_elapsed_ticks() {
        let sample = ticks(10, 10, 10);
        assert!(sample.usage_since(&sample).is_none());
    }

    #[test]
    fn test_usage_since_counter_reset() {
        let previous = ticks(100, 100, 100);
        let current = ticks(1, 1, 1);
        assert!(current.usage_since(&previous).is_none());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_probe_primes_state_on_first_run() {
        let first = CpuProbe.sample(None).unwrap();
        assert!(first.is_some());

        let second = CpuProbe.sample(first).unwrap();
        assert!(second.unwrap().total >= first.unwrap().total);
    }
}
