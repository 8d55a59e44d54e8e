mod query;
mod resolver;
mod run_info;
mod wire;

pub use query::TelemetryQueryClient;
pub use resolver::TelemetryResourceResolver;
pub use run_info::QueryRunInfoProvider;
pub use wire::iso8601_duration;
