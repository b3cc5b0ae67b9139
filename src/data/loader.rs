//! CSV Data Loader Module
//! Fetches the incident CSV (remote or local) and parses it with Polars.

use super::schema::{self, AgeGroup, SchemaError};
use polars::prelude::*;
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to fetch CSV: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Failed to read CSV file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse CSV: {0}")]
    Parse(#[from] PolarsError),
    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaError),
}

/// Where the incident CSV comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Url(String),
    File(PathBuf),
}

impl DataSource {
    /// `http://` and `https://` locations are fetched, anything else is a path.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            DataSource::Url(location.to_string())
        } else {
            DataSource::File(PathBuf::from(location))
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Url(url) => f.write_str(url),
            DataSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Loads the incident CSV as a table of untyped (string) columns.
pub struct DataLoader {
    timeout: Duration,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl DataLoader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Load and validate the CSV from `source`.
    ///
    /// A single attempt is made; there are no retries.
    pub fn load(&self, source: &DataSource) -> Result<DataFrame, LoaderError> {
        let df = match source {
            DataSource::Url(url) => {
                let bytes = self.fetch(url)?;
                Self::parse_csv_bytes(bytes)?
            }
            DataSource::File(path) => {
                if !path.exists() {
                    return Err(LoaderError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} does not exist", path.display()),
                    )));
                }
                // All columns are read as text; typing happens in the processor
                LazyCsvReader::new(path)
                    .with_has_header(true)
                    .with_infer_schema_length(Some(0))
                    .finish()?
                    .collect()?
            }
        };

        Self::validate(&df)?;
        tracing::info!(
            source = %source,
            rows = df.height(),
            columns = df.width(),
            "Loaded incident CSV"
        );
        Ok(df)
    }

    /// Blocking GET of the whole resource.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoaderError> {
        tracing::info!(url, "Fetching incident CSV");
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        tracing::debug!(bytes = bytes.len(), "Download complete");
        Ok(bytes.to_vec())
    }

    /// Parse an in-memory CSV payload with every column as text.
    pub fn parse_csv_bytes(bytes: Vec<u8>) -> Result<DataFrame, LoaderError> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;
        Ok(df)
    }

    /// Check headers against the declared schema and report age-group labels
    /// outside the declared levels.
    pub fn validate(df: &DataFrame) -> Result<(), LoaderError> {
        let headers = Self::get_columns(df);
        schema::validate_headers(&headers)?;

        for column in [schema::PERP_AGE_GROUP, schema::VIC_AGE_GROUP] {
            let unrecognized: Vec<String> = Self::unique_values(df, column)
                .into_iter()
                .filter(|v| schema::non_missing(Some(v.as_str())).is_some())
                .filter(|v| AgeGroup::from_label(v).is_none())
                .collect();
            if !unrecognized.is_empty() {
                tracing::warn!(
                    column,
                    values = ?unrecognized,
                    "Unrecognized age group labels will be mapped to UNKNOWN"
                );
            }
        }
        Ok(())
    }

    /// Column names of a loaded table.
    pub fn get_columns(df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Distinct non-null raw values of a column, in first-appearance order.
    pub fn unique_values(df: &DataFrame, column: &str) -> Vec<String> {
        df.column(column)
            .ok()
            .and_then(|col| col.as_materialized_series().unique_stable().ok())
            .and_then(|unique| unique.cast(&DataType::String).ok())
            .map(|unique| {
                unique
                    .str()
                    .map(|ca| ca.into_iter().flatten().map(str::to_string).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "INCIDENT_KEY,OCCUR_DATE,OCCUR_TIME,BORO,PRECINCT,JURISDICTION_CODE,LOCATION_DESC,STATISTICAL_MURDER_FLAG,PERP_AGE_GROUP,PERP_SEX,PERP_RACE,VIC_AGE_GROUP,VIC_SEX,VIC_RACE,Latitude,Longitude";

    fn sample_csv() -> String {
        format!(
            "{HEADER}\n\
             1,01/27/2021,21:38:00,BRONX,44,0,,false,18-24,M,BLACK,25-44,M,BLACK,40.83,-73.92\n\
             2,02/14/2020,03:05:00,QUEENS,105,,\"GROCERY, BODEGA\",true,1020,,,<18,F,WHITE,40.66,-73.73\n"
        )
    }

    #[test]
    fn test_data_source_parse() {
        assert_eq!(
            DataSource::parse("https://example.org/rows.csv"),
            DataSource::Url("https://example.org/rows.csv".to_string())
        );
        assert_eq!(
            DataSource::parse("data/rows.csv"),
            DataSource::File(PathBuf::from("data/rows.csv"))
        );
    }

    #[test]
    fn test_parse_bytes_keeps_text_columns() {
        let df = DataLoader::parse_csv_bytes(sample_csv().into_bytes()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("PRECINCT").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("Latitude").unwrap().dtype(), &DataType::String);
        DataLoader::validate(&df).unwrap();
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_csv().as_bytes()).unwrap();

        let loader = DataLoader::default();
        let df = loader
            .load(&DataSource::File(file.path().to_path_buf()))
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            DataLoader::unique_values(&df, "BORO"),
            vec!["BRONX".to_string(), "QUEENS".to_string()]
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = DataLoader::default();
        let err = loader
            .load(&DataSource::File(PathBuf::from("/nonexistent/incidents.csv")))
            .unwrap_err();
        assert!(matches!(err, LoaderError::Io(_)));
    }

    #[test]
    fn test_unreachable_url_is_fetch_error() {
        let loader = DataLoader::new(Duration::from_secs(2));
        let err = loader
            .load(&DataSource::Url("http://127.0.0.1:1/incidents.csv".to_string()))
            .unwrap_err();
        assert!(matches!(err, LoaderError::Fetch(_)));
    }

    #[test]
    fn test_unique_values_keep_first_appearance() {
        let df = df!("BORO" => [Some("QUEENS"), None, Some("BRONX"), Some("QUEENS")]).unwrap();
        assert_eq!(
            DataLoader::unique_values(&df, "BORO"),
            vec!["QUEENS".to_string(), "BRONX".to_string()]
        );
        assert!(DataLoader::unique_values(&df, "PRECINCT").is_empty());
    }

    #[test]
    fn test_missing_headers_rejected() {
        let df = DataLoader::parse_csv_bytes(b"OCCUR_DATE,BORO\n01/01/2020,BRONX\n".to_vec())
            .unwrap();
        let err = DataLoader::validate(&df).unwrap_err();
        match err {
            LoaderError::Schema(SchemaError::MissingColumns(cols)) => {
                assert!(cols.contains(&"OCCUR_TIME".to_string()));
                assert!(!cols.contains(&"BORO".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
