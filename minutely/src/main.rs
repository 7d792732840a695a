use anyhow::{Context, Result};
use clap::Parser;

use minutely::{MinutelyAgent, settings::Settings, telemetry};

#[derive(Debug, Parser)]
struct Opt {
    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opt.verbose { "debug" } else { "info" },
    ))
    .init();

    let settings = Settings::new().context("Failed to load settings")?;
    telemetry::init_metrics(settings.otel_exporter_otlp_endpoint.as_deref())?;

    MinutelyAgent::new(settings).run().await
}
