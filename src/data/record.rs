//! Incident Record Module
//! Typed view of one CSV row, with conversion from and back to raw text fields.

use super::schema::{self, AgeGroup, Borough, ColumnKind, ConversionError, FallbackPolicy};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use thiserror::Error;

/// A row that failed a `Reject`-policy conversion.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("column {column}: {source}")]
pub struct RowError {
    pub column: &'static str,
    pub raw: Option<String>,
    pub source: ConversionError,
}

/// One shooting incident after type normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub occur_date: NaiveDate,
    pub occur_time: NaiveTime,
    pub borough: Borough,
    pub precinct: String,
    pub jurisdiction_code: Option<i32>,
    pub location_desc: Option<String>,
    pub murder_flag: bool,
    pub perp_age_group: AgeGroup,
    pub perp_sex: String,
    pub perp_race: String,
    pub vic_age_group: AgeGroup,
    pub vic_sex: String,
    pub vic_race: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Incident {
    /// Build a record from raw fields, looked up by header name.
    ///
    /// Columns with a `Sentinel` policy never fail; a `Reject` column that
    /// cannot be converted yields a `RowError`.
    pub fn from_fields<'a, F>(lookup: F) -> Result<Self, RowError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let reject = |column: &'static str| {
            let raw = lookup(column).map(str::to_string);
            move |source: ConversionError| RowError {
                column,
                raw,
                source,
            }
        };
        let occur_date =
            schema::parse_date(lookup(schema::OCCUR_DATE)).map_err(reject(schema::OCCUR_DATE))?;
        let occur_time =
            schema::parse_time(lookup(schema::OCCUR_TIME)).map_err(reject(schema::OCCUR_TIME))?;
        let borough = Borough::parse(lookup(schema::BORO)).map_err(reject(schema::BORO))?;
        let murder_flag = schema::parse_flag(lookup(schema::STATISTICAL_MURDER_FLAG))
            .map_err(reject(schema::STATISTICAL_MURDER_FLAG))?;

        Ok(Self {
            occur_date,
            occur_time,
            borough,
            precinct: schema::normalize_category(lookup(schema::PRECINCT)),
            jurisdiction_code: lenient(
                schema::JURISDICTION_CODE,
                schema::parse_optional_int(lookup(schema::JURISDICTION_CODE)),
            ),
            location_desc: schema::non_missing(lookup(schema::LOCATION_DESC)).map(str::to_string),
            murder_flag,
            perp_age_group: AgeGroup::parse(lookup(schema::PERP_AGE_GROUP)),
            perp_sex: schema::normalize_category(lookup(schema::PERP_SEX)),
            perp_race: schema::normalize_category(lookup(schema::PERP_RACE)),
            vic_age_group: AgeGroup::parse(lookup(schema::VIC_AGE_GROUP)),
            vic_sex: schema::normalize_category(lookup(schema::VIC_SEX)),
            vic_race: schema::normalize_category(lookup(schema::VIC_RACE)),
            latitude: lenient(
                schema::LATITUDE,
                schema::parse_optional_float(lookup(schema::LATITUDE)),
            ),
            longitude: lenient(
                schema::LONGITUDE,
                schema::parse_optional_float(lookup(schema::LONGITUDE)),
            ),
        })
    }

    /// Serialize back to the source text formats, in schema order.
    /// Missing optional values become empty strings.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        schema::INCIDENT_SCHEMA
            .iter()
            .map(|spec| (spec.name, self.field_text(spec.name)))
            .collect()
    }

    fn field_text(&self, column: &str) -> String {
        let opt = |v: Option<String>| v.unwrap_or_default();
        match column {
            schema::OCCUR_DATE => self.occur_date.format(schema::DATE_FORMAT).to_string(),
            schema::OCCUR_TIME => self.occur_time.format(schema::TIME_FORMAT).to_string(),
            schema::BORO => self.borough.label().to_string(),
            schema::PRECINCT => self.precinct.clone(),
            schema::JURISDICTION_CODE => opt(self.jurisdiction_code.map(|c| c.to_string())),
            schema::LOCATION_DESC => opt(self.location_desc.clone()),
            schema::STATISTICAL_MURDER_FLAG => self.murder_flag.to_string(),
            schema::PERP_AGE_GROUP => self.perp_age_group.label().to_string(),
            schema::PERP_SEX => self.perp_sex.clone(),
            schema::PERP_RACE => self.perp_race.clone(),
            schema::VIC_AGE_GROUP => self.vic_age_group.label().to_string(),
            schema::VIC_SEX => self.vic_sex.clone(),
            schema::VIC_RACE => self.vic_race.clone(),
            schema::LATITUDE => opt(self.latitude.map(|v| v.to_string())),
            schema::LONGITUDE => opt(self.longitude.map(|v| v.to_string())),
            _ => String::new(),
        }
    }

    pub fn year(&self) -> i32 {
        self.occur_date.year()
    }

    /// 1-12
    pub fn month(&self) -> u32 {
        self.occur_date.month()
    }

    /// 0-23
    pub fn hour(&self) -> u32 {
        self.occur_time.hour()
    }
}

/// Sentinel columns downgrade conversion failures to null.
fn lenient<T>(column: &'static str, result: Result<Option<T>, ConversionError>) -> Option<T> {
    result.unwrap_or_else(|e| {
        tracing::debug!(column, error = %e, "value replaced by sentinel");
        None
    })
}

/// Columns whose conversion failure drops the row.
pub fn reject_columns() -> impl Iterator<Item = &'static str> {
    schema::INCIDENT_SCHEMA
        .iter()
        .filter(|c| c.policy == FallbackPolicy::Reject)
        .map(|c| c.name)
}

/// Columns whose text is rewritten by normalization, so a round trip
/// is only exact for inputs already in canonical form.
pub fn is_normalized_column(column: &str) -> bool {
    schema::column_spec(column)
        .map(|c| matches!(c.kind, ColumnKind::AgeGroup | ColumnKind::Borough))
        .unwrap_or(false)
}
