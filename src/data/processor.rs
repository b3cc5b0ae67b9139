//! Data Processor Module
//! Normalizes the raw text table into typed columns plus derived year/month/hour.

use super::record::{Incident, RowError};
use super::schema::{self, SchemaError, INCIDENT_SCHEMA};
use chrono::{Datelike, Timelike};
use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaError),
    #[error("Row {row} rejected: {error}")]
    Row {
        row: usize,
        #[source]
        error: RowError,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorOptions {
    /// Abort on the first rejected row instead of dropping it.
    pub strict: bool,
}

/// A dropped input row and the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// Zero-based data row index (header excluded).
    pub row: usize,
    pub error: RowError,
}

/// Typed incident table. Built once, never modified afterwards.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    frame: DataFrame,
    rejected: Vec<RejectedRow>,
}

impl NormalizedTable {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

/// Handles type normalization of the raw incident table.
pub struct DataProcessor;

impl DataProcessor {
    /// Convert every row through the declared schema and build a new typed table.
    ///
    /// The input frame is left untouched.
    pub fn normalize(
        raw: &DataFrame,
        options: ProcessorOptions,
    ) -> Result<NormalizedTable, ProcessorError> {
        let headers: Vec<String> = raw
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        schema::validate_headers(&headers)?;

        // Columns are cast to text so already-typed inputs go through the same conversions
        let mut text_columns: Vec<(&'static str, Column)> = Vec::new();
        for spec in INCIDENT_SCHEMA.iter() {
            if let Ok(column) = raw.column(spec.name) {
                text_columns.push((spec.name, column.cast(&DataType::String)?));
            }
        }
        let mut lookup_table: HashMap<&str, &StringChunked> = HashMap::new();
        for (name, column) in &text_columns {
            lookup_table.insert(*name, column.str()?);
        }

        let mut incidents = Vec::with_capacity(raw.height());
        let mut rejected = Vec::new();

        for row in 0..raw.height() {
            let lookup = |name: &str| lookup_table.get(name).and_then(|ca| ca.get(row));
            match Incident::from_fields(lookup) {
                Ok(incident) => incidents.push(incident),
                Err(error) if options.strict => {
                    return Err(ProcessorError::Row { row, error });
                }
                Err(error) => {
                    tracing::debug!(row, error = %error, "Row rejected");
                    rejected.push(RejectedRow { row, error });
                }
            }
        }

        if !rejected.is_empty() {
            tracing::warn!(
                rejected = rejected.len(),
                kept = incidents.len(),
                "Dropped rows that failed type conversion"
            );
        }

        let frame = Self::to_frame(&incidents)?;
        tracing::info!(rows = frame.height(), "Normalized incident table");

        Ok(NormalizedTable { frame, rejected })
    }

    /// Build the typed frame from records, in schema order followed by the
    /// derived YEAR, MONTH and HOUR columns.
    pub fn to_frame(incidents: &[Incident]) -> PolarsResult<DataFrame> {
        let dates: Vec<i32> = incidents
            .iter()
            .map(|i| i.occur_date.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
            .collect();
        let times: Vec<i64> = incidents
            .iter()
            .map(|i| {
                i64::from(i.occur_time.num_seconds_from_midnight()) * NANOS_PER_SECOND
                    + i64::from(i.occur_time.nanosecond())
            })
            .collect();

        let text = |f: fn(&Incident) -> String| incidents.iter().map(f).collect::<Vec<_>>();

        let columns = vec![
            Column::new(schema::OCCUR_DATE.into(), dates).cast(&DataType::Date)?,
            Column::new(schema::OCCUR_TIME.into(), times).cast(&DataType::Time)?,
            categorical(schema::BORO, text(|i| i.borough.label().to_string()))?,
            categorical(schema::PRECINCT, text(|i| i.precinct.clone()))?,
            Column::new(
                schema::JURISDICTION_CODE.into(),
                incidents.iter().map(|i| i.jurisdiction_code).collect::<Vec<_>>(),
            ),
            optional_categorical(
                schema::LOCATION_DESC,
                incidents.iter().map(|i| i.location_desc.clone()).collect(),
            )?,
            Column::new(
                schema::STATISTICAL_MURDER_FLAG.into(),
                incidents.iter().map(|i| i.murder_flag).collect::<Vec<_>>(),
            ),
            categorical(
                schema::PERP_AGE_GROUP,
                text(|i| i.perp_age_group.label().to_string()),
            )?,
            categorical(schema::PERP_SEX, text(|i| i.perp_sex.clone()))?,
            categorical(schema::PERP_RACE, text(|i| i.perp_race.clone()))?,
            categorical(
                schema::VIC_AGE_GROUP,
                text(|i| i.vic_age_group.label().to_string()),
            )?,
            categorical(schema::VIC_SEX, text(|i| i.vic_sex.clone()))?,
            categorical(schema::VIC_RACE, text(|i| i.vic_race.clone()))?,
            Column::new(
                schema::LATITUDE.into(),
                incidents.iter().map(|i| i.latitude).collect::<Vec<_>>(),
            ),
            Column::new(
                schema::LONGITUDE.into(),
                incidents.iter().map(|i| i.longitude).collect::<Vec<_>>(),
            ),
            Column::new(
                schema::YEAR.into(),
                incidents.iter().map(Incident::year).collect::<Vec<i32>>(),
            ),
            Column::new(
                schema::MONTH.into(),
                incidents.iter().map(|i| i.month() as i32).collect::<Vec<i32>>(),
            ),
            Column::new(
                schema::HOUR.into(),
                incidents.iter().map(|i| i.hour() as i32).collect::<Vec<i32>>(),
            ),
        ];

        DataFrame::new(columns)
    }
}

fn categorical_dtype() -> DataType {
    DataType::Categorical(None, CategoricalOrdering::Physical)
}

fn categorical(name: &str, values: Vec<String>) -> PolarsResult<Column> {
    Column::new(name.into(), values).cast(&categorical_dtype())
}

fn optional_categorical(name: &str, values: Vec<Option<String>>) -> PolarsResult<Column> {
    Column::new(name.into(), values).cast(&categorical_dtype())
}
