//! End-to-end run: load, normalize, aggregate, fit, render and write.

use crate::config::ReportConfig;
use crate::data::{DataLoader, DataProcessor, ProcessorOptions};
use crate::report::IncidentReport;
use anyhow::Context;

/// Execute one report run with the given configuration.
pub fn run(config: &ReportConfig) -> anyhow::Result<IncidentReport> {
    tracing::info!(source = %config.source, "Loading incident data");
    let loader = DataLoader::new(config.http_timeout);
    let raw = loader
        .load(&config.source)
        .with_context(|| format!("Failed to load incidents from {}", config.source))?;

    let options = ProcessorOptions {
        strict: config.strict,
    };
    let table =
        DataProcessor::normalize(&raw, options).context("Failed to normalize incident table")?;

    let mut report = IncidentReport::build(&config.source, raw.height(), &table, config)
        .context("Failed to build report")?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    if config.render_charts {
        report.render_charts(&config.output_dir);
    }

    report
        .write_to(&config.output_dir)
        .with_context(|| format!("Failed to write report to {}", config.output_dir.display()))?;
    report.print_tables();

    Ok(report)
}
