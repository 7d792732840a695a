pub mod probes;
pub mod settings;
pub mod telemetry;

use anyhow::Result;
use log::info;
use tokio::signal;

use crate::settings::Settings;

pub struct MinutelyAgent {
    pub settings: Settings,
}

impl MinutelyAgent {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Registers the enabled builtin probes and starts the probe loop.
    /// Returns the names of the registered probes; empty when minutely
    /// probes are disabled.
    pub fn start(&self) -> Vec<&'static str> {
        if !self.settings.minutely_probes_enabled() {
            info!("Minutely probes disabled.");
            return Vec::new();
        }

        let registered =
            probes::builtin::register_enabled(&probes::registry(), &self.settings.builtin_probes);
        probes::start();
        registered
    }

    pub async fn run(self) -> Result<()> {
        self.start();

        info!("Minutely probes active. Press Ctrl-C to exit.");
        signal::ctrl_c().await?;
        info!("Exiting...");

        probes::request_shutdown();
        telemetry::shutdown_metrics();
        Ok(())
    }
}
