//! Aggregation Module
//! Grouped counts, rankings, per-capita borough rates and flag shares.

use crate::data::{AgeGroup, Borough};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

/// Group label for null values, so every row lands in some group.
pub const NULL_LABEL: &str = "UNSPECIFIED";

/// Rates are expressed per this many residents.
pub const RATE_BASE: f64 = 100_000.0;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Column not found: {0}")]
    MissingColumn(String),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("Population for {borough} must be positive, got {population}")]
    InvalidPopulation { borough: Borough, population: u64 },
}

// Column names of grouped result frames
const KEY: &str = "key";
const COUNT: &str = "count";
const FLAGGED: &str = "flagged";

fn require(df: &DataFrame, column: &str) -> Result<(), AggregateError> {
    df.column(column)
        .map(|_| ())
        .map_err(|_| AggregateError::MissingColumn(column.to_string()))
}

/// Grouping key of `column`: its values as text, nulls as `NULL_LABEL`.
pub fn group_key(column: &str) -> Expr {
    col(column)
        .cast(DataType::String)
        .fill_null(lit(NULL_LABEL))
}

fn text_values(df: &DataFrame, column: &str) -> Result<Vec<String>, AggregateError> {
    Ok(df
        .column(column)?
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or(NULL_LABEL).to_string())
        .collect())
}

fn count_values(df: &DataFrame, column: &str) -> Result<Vec<usize>, AggregateError> {
    let counts = df.column(column)?.cast(&DataType::UInt64)?;
    Ok(counts
        .u64()?
        .into_iter()
        .map(|v| v.unwrap_or(0) as usize)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

/// Per-value record counts of one column, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCounts {
    pub column: String,
    pub groups: Vec<GroupCount>,
}

impl GroupCounts {
    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.groups.iter().find(|g| g.key == key).map(|g| g.count)
    }

    /// Descending by count. Equal counts keep first-appearance order.
    pub fn ranked(&self) -> Vec<GroupCount> {
        let mut ranked = self.groups.clone();
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked
    }

    pub fn top(&self, n: usize) -> Vec<GroupCount> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked
    }

    /// Ascending by the integer value of the key (year, month, hour).
    /// Keys that are not integers sort last in their original order.
    pub fn sorted_numeric(&self) -> Vec<GroupCount> {
        let mut sorted = self.groups.clone();
        sorted.sort_by_key(|g| g.key.parse::<i64>().map_or((1, 0), |v| (0, v)));
        sorted
    }

    /// Same counts without the null group.
    pub fn without_nulls(&self) -> GroupCounts {
        GroupCounts {
            column: self.column.clone(),
            groups: self
                .groups
                .iter()
                .filter(|g| g.key != NULL_LABEL)
                .cloned()
                .collect(),
        }
    }
}

/// Count records per distinct value of `column`.
pub fn count_by(df: &DataFrame, column: &str) -> Result<GroupCounts, AggregateError> {
    require(df, column)?;

    // Stable grouping keeps groups in first-appearance order
    let grouped = df
        .clone()
        .lazy()
        .group_by_stable([group_key(column).alias(KEY)])
        .agg([len().alias(COUNT)])
        .collect()?;

    let groups: Vec<GroupCount> = text_values(&grouped, KEY)?
        .into_iter()
        .zip(count_values(&grouped, COUNT)?)
        .map(|(key, count)| GroupCount { key, count })
        .collect();

    tracing::debug!(column, groups = groups.len(), "Counted groups");
    Ok(GroupCounts {
        column: column.to_string(),
        groups,
    })
}

/// Counts per age group in declared order, zero counts included.
pub fn count_by_age_group(
    df: &DataFrame,
    column: &str,
) -> Result<Vec<(AgeGroup, usize)>, AggregateError> {
    let counts = count_by(df, column)?;
    let mut result: Vec<(AgeGroup, usize)> = AgeGroup::ALL.iter().map(|g| (*g, 0)).collect();
    for group in &counts.groups {
        let age = AgeGroup::from_label(&group.key).unwrap_or(AgeGroup::Unknown);
        if let Some(slot) = result.iter_mut().find(|(g, _)| *g == age) {
            slot.1 += group.count;
        }
    }
    Ok(result)
}

/// Resident population of one borough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoroughPopulation {
    pub borough: Borough,
    pub population: u64,
}

/// 2020 census populations.
pub fn default_populations() -> Vec<BoroughPopulation> {
    [
        (Borough::Bronx, 1_472_654),
        (Borough::Brooklyn, 2_736_074),
        (Borough::Manhattan, 1_694_251),
        (Borough::Queens, 2_405_464),
        (Borough::StatenIsland, 495_747),
    ]
    .into_iter()
    .map(|(borough, population)| BoroughPopulation {
        borough,
        population,
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoroughRate {
    pub borough: Borough,
    pub count: usize,
    pub population: u64,
    pub rate_per_100k: f64,
}

/// `count / (population / 100000)` for every borough with a population entry.
/// Boroughs absent from `counts` get a zero count.
pub fn borough_rates(
    counts: &GroupCounts,
    populations: &[BoroughPopulation],
) -> Result<Vec<BoroughRate>, AggregateError> {
    for group in &counts.groups {
        if Borough::parse(Some(group.key.as_str())).is_err() {
            tracing::warn!(key = %group.key, "Group has no population entry, skipped in rates");
        }
    }

    populations
        .iter()
        .map(|p| {
            if p.population == 0 {
                return Err(AggregateError::InvalidPopulation {
                    borough: p.borough,
                    population: p.population,
                });
            }
            let count = counts.get(p.borough.label()).unwrap_or(0);
            Ok(BoroughRate {
                borough: p.borough,
                count,
                population: p.population,
                rate_per_100k: count as f64 / (p.population as f64 / RATE_BASE),
            })
        })
        .collect()
}

/// Share of flagged records within one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagRate {
    pub key: String,
    pub total: usize,
    pub flagged: usize,
    pub share: f64,
}

/// Per group of `group_col`, how many rows have `flag_col` set.
pub fn flag_rate_by(
    df: &DataFrame,
    group_col: &str,
    flag_col: &str,
) -> Result<Vec<FlagRate>, AggregateError> {
    require(df, group_col)?;
    require(df, flag_col)?;

    let grouped = df
        .clone()
        .lazy()
        .group_by_stable([group_key(group_col).alias(KEY)])
        .agg([
            len().alias(COUNT),
            col(flag_col)
                .cast(DataType::Boolean)
                .cast(DataType::UInt32)
                .sum()
                .alias(FLAGGED),
        ])
        .collect()?;

    let keys = text_values(&grouped, KEY)?;
    let totals = count_values(&grouped, COUNT)?;
    let flagged = count_values(&grouped, FLAGGED)?;

    Ok(keys
        .into_iter()
        .zip(totals)
        .zip(flagged)
        .map(|((key, total), flagged)| FlagRate {
            key,
            total,
            flagged,
            share: flagged as f64 / total as f64,
        })
        .collect())
}
