//! Report configuration, read from environment variables.

use crate::data::{Borough, DataSource};
use crate::stats::{default_populations, BoroughPopulation};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// NYC open data: NYPD Shooting Incident Data (Historic).
pub const DEFAULT_SOURCE: &str =
    "https://data.cityofnewyork.us/api/views/833y-fsy8/rows.csv?accessType=DOWNLOAD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("Failed to read population file {path}: {source}")]
    PopulationFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid population file: {0}")]
    PopulationFormat(#[from] serde_json::Error),

    #[error("Unknown borough in population file: {0}")]
    UnknownBorough(String),
}

/// Runtime settings of one report run.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Incident CSV location (URL or local path)
    pub source: DataSource,

    /// Directory receiving report.md, report.json and charts
    pub output_dir: PathBuf,

    /// Number of location descriptions in the ranking
    pub top_n: usize,

    /// Abort on the first row that fails conversion
    pub strict: bool,

    /// Render PNG charts
    pub render_charts: bool,

    /// Timeout of the dataset download
    pub http_timeout: Duration,

    /// Logging level used when RUST_LOG is unset
    pub log_level: String,

    /// Borough populations for per-capita rates
    pub populations: Vec<BoroughPopulation>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            source: DataSource::parse(DEFAULT_SOURCE),
            output_dir: PathBuf::from("report"),
            top_n: 10,
            strict: false,
            render_charts: true,
            http_timeout: Duration::from_secs(60),
            log_level: "info".to_string(),
            populations: default_populations(),
        }
    }
}

impl ReportConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from any variable lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let populations = match lookup("POPULATION_FILE") {
            Some(path) => load_populations(Path::new(&path), &defaults.populations)?,
            None => defaults.populations,
        };

        Ok(Self {
            source: lookup("INCIDENT_SOURCE")
                .map(|s| DataSource::parse(&s))
                .unwrap_or(defaults.source),

            output_dir: lookup("REPORT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),

            top_n: parse_var(&lookup, "REPORT_TOP_N", |v| {
                v.parse::<usize>().ok().filter(|n| *n > 0)
            })?
            .unwrap_or(defaults.top_n),

            strict: parse_var(&lookup, "REPORT_STRICT", parse_bool)?.unwrap_or(defaults.strict),

            render_charts: parse_var(&lookup, "REPORT_CHARTS", parse_bool)?
                .unwrap_or(defaults.render_charts),

            http_timeout: parse_var(&lookup, "HTTP_TIMEOUT_SECS", |v| {
                v.parse::<u64>().ok().map(Duration::from_secs)
            })?
            .unwrap_or(defaults.http_timeout),

            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),

            populations,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_var<F, T>(
    lookup: &F,
    var: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => parse(&value)
            .map(Some)
            .ok_or(ConfigError::InvalidValue { var, value }),
    }
}

/// Read a JSON object of borough name to population, e.g.
/// `{"BRONX": 1472654, "STATEN ISLAND": 495747}`. Boroughs not listed keep
/// their value from `base`.
pub fn load_populations(
    path: &Path,
    base: &[BoroughPopulation],
) -> Result<Vec<BoroughPopulation>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::PopulationFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_populations(&text, base)
}

pub fn parse_populations(
    json: &str,
    base: &[BoroughPopulation],
) -> Result<Vec<BoroughPopulation>, ConfigError> {
    let overrides: HashMap<String, u64> = serde_json::from_str(json)?;

    let mut populations = base.to_vec();
    for (name, population) in overrides {
        let borough = Borough::parse(Some(name.as_str()))
            .map_err(|_| ConfigError::UnknownBorough(name.clone()))?;
        match populations.iter_mut().find(|p| p.borough == borough) {
            Some(entry) => entry.population = population,
            None => populations.push(BoroughPopulation {
                borough,
                population,
            }),
        }
    }
    Ok(populations)
}
