//! Data module - CSV loading, schema and type normalization

mod loader;
mod processor;
mod record;
pub mod schema;

pub use loader::{DataLoader, DataSource, LoaderError};
pub use processor::{DataProcessor, NormalizedTable, ProcessorError, ProcessorOptions, RejectedRow};
pub use record::{is_normalized_column, reject_columns, Incident, RowError};
pub use schema::{AgeGroup, Borough};
