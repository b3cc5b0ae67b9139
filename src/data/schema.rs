//! Incident Schema Module
//! Declares the typed column layout of the incident CSV and the per-value conversions.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const OCCUR_DATE: &str = "OCCUR_DATE";
pub const OCCUR_TIME: &str = "OCCUR_TIME";
pub const BORO: &str = "BORO";
pub const PRECINCT: &str = "PRECINCT";
pub const JURISDICTION_CODE: &str = "JURISDICTION_CODE";
pub const LOCATION_DESC: &str = "LOCATION_DESC";
pub const STATISTICAL_MURDER_FLAG: &str = "STATISTICAL_MURDER_FLAG";
pub const PERP_AGE_GROUP: &str = "PERP_AGE_GROUP";
pub const PERP_SEX: &str = "PERP_SEX";
pub const PERP_RACE: &str = "PERP_RACE";
pub const VIC_AGE_GROUP: &str = "VIC_AGE_GROUP";
pub const VIC_SEX: &str = "VIC_SEX";
pub const VIC_RACE: &str = "VIC_RACE";
pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";

// Derived columns
pub const YEAR: &str = "YEAR";
pub const MONTH: &str = "MONTH";
pub const HOUR: &str = "HOUR";

/// Source text format of `OCCUR_DATE`.
pub const DATE_FORMAT: &str = "%m/%d/%Y";
/// Source text format of `OCCUR_TIME`.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Label used for categorical values that are missing or unparseable.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Why a single raw value could not be converted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("value is missing")]
    Missing,
    #[error("invalid date '{0}', expected MM/DD/YYYY")]
    InvalidDate(String),
    #[error("invalid time '{0}', expected HH:MM:SS")]
    InvalidTime(String),
    #[error("invalid boolean flag '{0}'")]
    InvalidFlag(String),
    #[error("unknown borough '{0}'")]
    InvalidBorough(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

/// Semantic type of a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Time,
    Borough,
    Category,
    OptionalCategory,
    AgeGroup,
    Flag,
    OptionalInteger,
    OptionalFloat,
}

/// What happens to a row whose value in this column cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Drop the row (or abort in strict mode).
    Reject,
    /// Substitute `UNKNOWN` or null and keep the row.
    Sentinel,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub policy: FallbackPolicy,
}

const fn spec(name: &'static str, kind: ColumnKind, policy: FallbackPolicy) -> ColumnSpec {
    ColumnSpec { name, kind, policy }
}

/// Columns every incident CSV must carry, in output order.
pub const INCIDENT_SCHEMA: [ColumnSpec; 15] = [
    spec(OCCUR_DATE, ColumnKind::Date, FallbackPolicy::Reject),
    spec(OCCUR_TIME, ColumnKind::Time, FallbackPolicy::Reject),
    spec(BORO, ColumnKind::Borough, FallbackPolicy::Reject),
    spec(PRECINCT, ColumnKind::Category, FallbackPolicy::Sentinel),
    spec(JURISDICTION_CODE, ColumnKind::OptionalInteger, FallbackPolicy::Sentinel),
    spec(LOCATION_DESC, ColumnKind::OptionalCategory, FallbackPolicy::Sentinel),
    spec(STATISTICAL_MURDER_FLAG, ColumnKind::Flag, FallbackPolicy::Reject),
    spec(PERP_AGE_GROUP, ColumnKind::AgeGroup, FallbackPolicy::Sentinel),
    spec(PERP_SEX, ColumnKind::Category, FallbackPolicy::Sentinel),
    spec(PERP_RACE, ColumnKind::Category, FallbackPolicy::Sentinel),
    spec(VIC_AGE_GROUP, ColumnKind::AgeGroup, FallbackPolicy::Sentinel),
    spec(VIC_SEX, ColumnKind::Category, FallbackPolicy::Sentinel),
    spec(VIC_RACE, ColumnKind::Category, FallbackPolicy::Sentinel),
    spec(LATITUDE, ColumnKind::OptionalFloat, FallbackPolicy::Sentinel),
    spec(LONGITUDE, ColumnKind::OptionalFloat, FallbackPolicy::Sentinel),
];

/// Look up the declared spec for a column.
pub fn column_spec(name: &str) -> Option<&'static ColumnSpec> {
    INCIDENT_SCHEMA.iter().find(|c| c.name == name)
}

/// Check that every schema column is present among the CSV headers.
pub fn validate_headers<S: AsRef<str>>(headers: &[S]) -> Result<(), SchemaError> {
    let missing: Vec<String> = INCIDENT_SCHEMA
        .iter()
        .filter(|c| !headers.iter().any(|h| h.as_ref().trim() == c.name))
        .map(|c| c.name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::MissingColumns(missing))
    }
}

/// Empty strings and the literal `(null)` count as missing.
pub fn non_missing(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("(null)"))
}

pub fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ConversionError> {
    let value = non_missing(raw).ok_or(ConversionError::Missing)?;
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| ConversionError::InvalidDate(value.to_string()))
}

pub fn parse_time(raw: Option<&str>) -> Result<NaiveTime, ConversionError> {
    let value = non_missing(raw).ok_or(ConversionError::Missing)?;
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .ok()
        // chrono represents a leap second as nanosecond >= 1e9
        .filter(|t| t.nanosecond() < 1_000_000_000)
        .ok_or_else(|| ConversionError::InvalidTime(value.to_string()))
}

pub fn parse_flag(raw: Option<&str>) -> Result<bool, ConversionError> {
    let value = non_missing(raw).ok_or(ConversionError::Missing)?;
    match value.to_ascii_lowercase().as_str() {
        "true" | "y" | "yes" | "1" => Ok(true),
        "false" | "n" | "no" | "0" => Ok(false),
        _ => Err(ConversionError::InvalidFlag(value.to_string())),
    }
}

pub fn parse_optional_int(raw: Option<&str>) -> Result<Option<i32>, ConversionError> {
    match non_missing(raw) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .ok()
            .filter(|f| {
                f.fract() == 0.0 && *f >= f64::from(i32::MIN) && *f <= f64::from(i32::MAX)
            })
            .map(|f| Some(f as i32))
            .ok_or_else(|| ConversionError::InvalidNumber(v.to_string())),
    }
}

pub fn parse_optional_float(raw: Option<&str>) -> Result<Option<f64>, ConversionError> {
    match non_missing(raw) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| ConversionError::InvalidNumber(v.to_string())),
    }
}

/// Trimmed categorical value, `UNKNOWN` when missing.
pub fn normalize_category(raw: Option<&str>) -> String {
    non_missing(raw).unwrap_or(UNKNOWN_LABEL).to_string()
}

/// One of the five boroughs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Borough {
    Bronx,
    Brooklyn,
    Manhattan,
    Queens,
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Manhattan,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    /// Label as written in the dataset.
    pub fn label(&self) -> &'static str {
        match self {
            Borough::Bronx => "BRONX",
            Borough::Brooklyn => "BROOKLYN",
            Borough::Manhattan => "MANHATTAN",
            Borough::Queens => "QUEENS",
            Borough::StatenIsland => "STATEN ISLAND",
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Borough, ConversionError> {
        let value = non_missing(raw).ok_or(ConversionError::Missing)?;
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        Borough::ALL
            .into_iter()
            .find(|b| b.label().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ConversionError::InvalidBorough(value.to_string()))
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered age bucket. Variant order is the declared total order,
/// with `Unknown` sorting after every real bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AgeGroup {
    Under18,
    From18To24,
    From25To44,
    From45To64,
    Over65,
    Unknown,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 6] = [
        AgeGroup::Under18,
        AgeGroup::From18To24,
        AgeGroup::From25To44,
        AgeGroup::From45To64,
        AgeGroup::Over65,
        AgeGroup::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgeGroup::Under18 => "<18",
            AgeGroup::From18To24 => "18-24",
            AgeGroup::From25To44 => "25-44",
            AgeGroup::From45To64 => "45-64",
            AgeGroup::Over65 => "65+",
            AgeGroup::Unknown => UNKNOWN_LABEL,
        }
    }

    /// Exact label match; `None` for anything not declared.
    pub fn from_label(label: &str) -> Option<AgeGroup> {
        let label = label.trim();
        AgeGroup::ALL
            .into_iter()
            .find(|g| g.label().eq_ignore_ascii_case(label))
    }

    /// Lenient parse: missing or unrecognized raw values become `Unknown`.
    pub fn parse(raw: Option<&str>) -> AgeGroup {
        non_missing(raw)
            .and_then(AgeGroup::from_label)
            .unwrap_or(AgeGroup::Unknown)
    }

    pub fn is_known(&self) -> bool {
        *self != AgeGroup::Unknown
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_headers_reports_all_missing() {
        let headers = vec!["OCCUR_DATE", "BORO", "INCIDENT_KEY"];
        let err = validate_headers(&headers).unwrap_err();
        let SchemaError::MissingColumns(missing) = err;
        assert_eq!(missing.len(), INCIDENT_SCHEMA.len() - 2);
        assert!(missing.contains(&"OCCUR_TIME".to_string()));
        assert!(!missing.contains(&"BORO".to_string()));
    }

    #[test]
    fn test_validate_headers_accepts_full_schema() {
        let mut headers: Vec<&str> = INCIDENT_SCHEMA.iter().map(|c| c.name).collect();
        headers.push("X_COORD_CD");
        assert!(validate_headers(&headers).is_ok());
    }

    #[test]
    fn test_parse_date_and_time() {
        let date = parse_date(Some("07/04/2021")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 7, 4).unwrap());
        assert!(matches!(
            parse_date(Some("2021-07-04")),
            Err(ConversionError::InvalidDate(_))
        ));
        assert_eq!(parse_date(Some("  ")), Err(ConversionError::Missing));

        let time = parse_time(Some("23:59:01")).unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(23, 59, 1).unwrap());
        assert!(parse_time(Some("24:00:00")).is_err());
        assert!(matches!(
            parse_time(Some("23:59:60")),
            Err(ConversionError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_parse_flag_variants() {
        assert_eq!(parse_flag(Some("true")), Ok(true));
        assert_eq!(parse_flag(Some("FALSE")), Ok(false));
        assert_eq!(parse_flag(Some("Y")), Ok(true));
        assert_eq!(parse_flag(Some("0")), Ok(false));
        assert!(parse_flag(Some("maybe")).is_err());
        assert_eq!(parse_flag(None), Err(ConversionError::Missing));
    }

    #[test]
    fn test_age_group_order() {
        assert!(AgeGroup::Under18 < AgeGroup::From18To24);
        assert!(AgeGroup::From18To24 < AgeGroup::From25To44);
        assert!(AgeGroup::From25To44 < AgeGroup::From45To64);
        assert!(AgeGroup::From45To64 < AgeGroup::Over65);
        assert!(AgeGroup::Over65 < AgeGroup::Unknown);
        assert!(!AgeGroup::Unknown.is_known());
        assert!(AgeGroup::ALL[..5].iter().all(AgeGroup::is_known));
    }

    #[test]
    fn test_age_group_parse_falls_back_to_unknown() {
        assert_eq!(AgeGroup::parse(Some("25-44")), AgeGroup::From25To44);
        assert_eq!(AgeGroup::parse(Some("1020")), AgeGroup::Unknown);
        assert_eq!(AgeGroup::parse(Some("(null)")), AgeGroup::Unknown);
        assert_eq!(AgeGroup::parse(None), AgeGroup::Unknown);
        assert_eq!(AgeGroup::from_label("940"), None);
    }

    #[test]
    fn test_borough_parse() {
        assert_eq!(Borough::parse(Some("BRONX")), Ok(Borough::Bronx));
        assert_eq!(
            Borough::parse(Some("Staten  Island")),
            Ok(Borough::StatenIsland)
        );
        assert!(Borough::parse(Some("NEWARK")).is_err());
    }

    #[test]
    fn test_optional_numbers() {
        assert_eq!(parse_optional_int(Some("2")), Ok(Some(2)));
        assert_eq!(parse_optional_int(Some("")), Ok(None));
        assert!(parse_optional_int(Some("1.5")).is_err());
        assert_eq!(
            parse_optional_int(Some("99999999999")),
            Err(ConversionError::InvalidNumber("99999999999".to_string()))
        );
        assert_eq!(parse_optional_int(Some("-2147483648")), Ok(Some(i32::MIN)));
        assert_eq!(parse_optional_float(Some("40.8")), Ok(Some(40.8)));
        assert_eq!(parse_optional_float(Some("(null)")), Ok(None));
        assert!(parse_optional_float(Some("north")).is_err());
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category(Some(" M ")), "M");
        assert_eq!(normalize_category(Some("")), UNKNOWN_LABEL);
        assert_eq!(normalize_category(None), UNKNOWN_LABEL);
    }
}
