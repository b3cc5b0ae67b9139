//! Statistics Calculator Module
//! Descriptive statistics of numeric incident columns, overall and per group.

use super::aggregator::{count_by, group_key, AggregateError};
use polars::prelude::*;
use serde::Serialize;

/// Descriptive statistics for one set of values.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub group_name: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p05: f64,
}

impl Default for SummaryStats {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            count: 0,
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
            variance: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            p95: f64::NAN,
            p05: f64::NAN,
        }
    }
}

pub struct StatsCalculator;

impl StatsCalculator {
    /// Compute descriptive statistics for an array of values.
    pub fn compute_descriptive_stats(values: &[f64]) -> SummaryStats {
        let n = values.len();
        if n == 0 {
            return SummaryStats::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = values.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        let variance = if n > 1 {
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };

        SummaryStats {
            group_name: String::new(),
            count: n,
            mean,
            median,
            std: variance.sqrt(),
            variance,
            min: sorted[0],
            max: sorted[n - 1],
            p95: Self::percentile(&sorted, 95.0),
            p05: Self::percentile(&sorted, 5.0),
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    /// Non-null values of a numeric column as f64.
    pub fn column_values(df: &DataFrame, column: &str) -> Result<Vec<f64>, AggregateError> {
        let col = df
            .column(column)
            .map_err(|_| AggregateError::MissingColumn(column.to_string()))?;
        let as_f64 = col.cast(&DataType::Float64)?;
        Ok(as_f64.f64()?.into_iter().flatten().collect())
    }

    /// Statistics of a whole column, nulls skipped.
    pub fn describe_column(df: &DataFrame, column: &str) -> Result<SummaryStats, AggregateError> {
        let values = Self::column_values(df, column)?;
        let mut stats = Self::compute_descriptive_stats(&values);
        stats.group_name = column.to_string();
        Ok(stats)
    }

    /// Statistics of `value_col` for each distinct value of `group_col`,
    /// in first-appearance order of the groups.
    pub fn describe_by_group(
        df: &DataFrame,
        group_col: &str,
        value_col: &str,
    ) -> Result<Vec<SummaryStats>, AggregateError> {
        if df.column(value_col).is_err() {
            return Err(AggregateError::MissingColumn(value_col.to_string()));
        }

        count_by(df, group_col)?
            .groups
            .iter()
            .map(|group| {
                let subset = df
                    .clone()
                    .lazy()
                    .filter(group_key(group_col).eq(lit(group.key.as_str())))
                    .select([col(value_col)])
                    .collect()?;
                let mut stats = Self::describe_column(&subset, value_col)?;
                stats.group_name = group.key.clone();
                Ok(stats)
            })
            .collect()
    }
}
