//! Incident Report - exploratory analysis of the NYPD shooting incident dataset
//!
//! Loads the incident CSV, normalizes it into a typed table, aggregates it,
//! fits hour-of-day location models and writes a Markdown/JSON report with charts.

pub mod charts;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod report;
pub mod stats;

pub use config::{ConfigError, ReportConfig};
pub use report::{IncidentReport, ModelOutcome, ReportError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
