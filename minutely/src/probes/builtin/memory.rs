use anyhow::{Context, Result};
use log::debug;
use procfs::{Current, Meminfo};

use crate::probes::StatelessProbe;
use crate::telemetry;

/// System memory from `/proc/meminfo`.
pub struct MemoryProbe;

impl StatelessProbe for MemoryProbe {
    fn sample(&self) -> Result<()> {
        let info = Meminfo::current().context("Failed to read /proc/meminfo")?;

        debug!(
            "memory total={} available={:?} free={}",
            info.mem_total, info.mem_available, info.mem_free
        );
        telemetry::record_memory(info.mem_total, info.mem_available, info.mem_free);
        Ok(())
    }
}
