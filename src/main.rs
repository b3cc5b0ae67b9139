//! Incident Report - writes the shooting incident analysis to the output directory.

use anyhow::Context;
use incident_report::{pipeline, ReportConfig, VERSION};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = ReportConfig::from_env().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!(version = VERSION, "Starting incident report");
    let report = pipeline::run(&config)?;
    tracing::info!(
        rows = report.rows_kept,
        output = %config.output_dir.display(),
        "Done"
    );
    Ok(())
}
