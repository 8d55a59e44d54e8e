//! Data contracts shared by Smart Detector plugins and the clients which
//! service them: resource identifiers, telemetry query descriptions,
//! tabular query results, and alert presentation configuration.
mod alerts;
mod clock;
mod resources;
mod table;
mod telemetry;

pub use alerts::{Alert, AlertBuilder, AlertProperty, AnalysisOutcome, ChartType, PropertyKind};
pub use clock::{Clock, FixedClock, SystemClock};
pub use resources::{ResourceIdentifier, ResourceType};
pub use table::{merge_table_sets, Column, ColumnType, DataTable, Value};
pub use telemetry::{QueryRunInfo, TelemetryDbType};

/// Error raised when constructing or parsing a data contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("'{0}' is not a valid resource identifier")]
    InvalidResourceId(String),
    #[error("resource type '{0}' is not supported")]
    UnsupportedResourceType(String),
    #[error("a {resource_type:?} identifier {reason}")]
    InvalidResourceParts {
        resource_type: ResourceType,
        reason: &'static str,
    },
    #[error("column type '{0}' is not supported")]
    UnsupportedColumnType(String),
    #[error("value {value} is not a valid {column_type}")]
    InvalidValue {
        column_type: ColumnType,
        value: String,
    },
    #[error("an alert requires a non-empty title")]
    EmptyAlertTitle,
    #[error("alert property '{0}' is defined more than once")]
    DuplicateAlertProperty(String),
}
