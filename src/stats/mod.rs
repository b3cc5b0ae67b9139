//! Statistics module - aggregation, descriptive statistics and regression

pub mod aggregator;
mod calculator;
pub mod regression;

pub use aggregator::{
    borough_rates, count_by, count_by_age_group, default_populations, flag_rate_by,
    AggregateError, BoroughPopulation, BoroughRate, FlagRate, GroupCount, GroupCounts,
};
pub use calculator::{StatsCalculator, SummaryStats};
pub use regression::{fit_categorical, DummyEncoding, Ols, OlsFit, RegressionError};
