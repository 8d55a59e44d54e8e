use crate::ResourceIdentifier;

/// Backend which stores the telemetry of a query.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TelemetryDbType {
    LogAnalytics,
    ApplicationInsights,
}

impl std::fmt::Display for TelemetryDbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TelemetryDbType::LogAnalytics => "Log Analytics",
            TelemetryDbType::ApplicationInsights => "Application Insights",
        })
    }
}

/// QueryRunInfo describes which telemetry backend, and which ordered list of
/// its resources, services the queries of a single analysis request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryRunInfo {
    pub db_type: TelemetryDbType,
    pub resource_ids: Vec<ResourceIdentifier>,
}
