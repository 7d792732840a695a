use anyhow::{Context, Result};
use log::debug;
use procfs::{Current, LoadAverage};

use crate::probes::StatelessProbe;
use crate::telemetry;

pub struct LoadAverageProbe;

impl StatelessProbe for LoadAverageProbe {
    fn sample(&self) -> Result<()> {
        let load = LoadAverage::current().context("Failed to read /proc/loadavg")?;

        debug!("load_average 1m={} 5m={} 15m={}", load.one, load.five, load.fifteen);
        telemetry::record_load_average(load.one, load.five, load.fifteen);
        Ok(())
    }
}
