use anyhow::{Context, Result};
use log::debug;
use procfs::process::Process;

use crate::probes::StatelessProbe;
use crate::telemetry;

/// Resident memory and thread count of the agent's own process.
pub struct ProcessProbe;

impl StatelessProbe for ProcessProbe {
    fn sample(&self) -> Result<()> {
        let status = Process::myself()
            .and_then(|p| p.status())
            .context("Failed to read /proc/self/status")?;
        // VmRSS is reported in kB
        let rss_bytes = status.vmrss.unwrap_or(0) * 1024;

        debug!("process rss={} threads={}", rss_bytes, status.threads);
        telemetry::record_process(rss_bytes, status.threads);
        Ok(())
    }
}
