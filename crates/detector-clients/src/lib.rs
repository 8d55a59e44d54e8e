//! Clients of the external services which Smart Detectors query:
//! Azure Resource Manager, Azure Monitor Metrics, Log Analytics and
//! Application Insights. Every external call is made through a
//! dependency-scoped RetryPolicy.
pub mod arm;
pub mod config;
pub mod credentials;
pub mod factory;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod telemetry;

mod pagination;

#[cfg(test)]
pub(crate) mod testing;

pub use arm::ResourceManagerClient;
pub use config::{ClientConfig, RetryConfig};
pub use credentials::{Audience, StaticTokenProvider, TokenProvider};
pub use factory::AnalysisServicesFactory;
pub use http::{HttpClient, Request, Response, Transport};
pub use metrics::MetricsClient;
pub use retry::{DependencyRecord, DependencyTracker, RetryPolicy, TracingTracker};
pub use telemetry::{QueryRunInfoProvider, TelemetryQueryClient, TelemetryResourceResolver};

pub use tokio_util::sync::CancellationToken;

use reqwest::{Method, StatusCode};

/// Error returned by a telemetry backend, rendered as `[code] message`.
/// A nested backend error is exposed as this error's source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct TelemetryDataError {
    pub code: String,
    pub message: String,
    #[source]
    pub inner: Option<Box<TelemetryDataError>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{method} {url}: {status}: {body}")]
    Http {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to send {method} {url}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),
    #[error("{method} {url} timed out after {timeout:?}")]
    Timeout {
        method: Method,
        url: String,
        timeout: std::time::Duration,
    },
    #[error("operation was cancelled")]
    Cancelled,
    #[error("resource {0} was not found")]
    NotFound(String),
    #[error(transparent)]
    TelemetryData(#[from] TelemetryDataError),
    #[error("none of the telemetry resources of the query were found")]
    NoTelemetryResourcesFound,
    #[error("at least one resource is required")]
    NoResources,
    #[error("{requested} resources were requested, but at most {max} are supported")]
    TooManyResources { requested: usize, max: usize },
    #[error("resources {0} cannot be queried together: they mix Log Analytics workspaces and Application Insights applications")]
    MixedTelemetryResources(String),
    #[error("no Log Analytics workspaces were found in the subscriptions of the resources")]
    NoWorkspacesFound,
    #[error("resource {resource} is not a {expected:?} resource")]
    UnexpectedResourceType {
        resource: String,
        expected: detector_models::ResourceType,
    },
    #[error("failed to parse response of {context}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response of {context} is malformed: {detail}")]
    Malformed { context: String, detail: String },
    #[error("invalid URL {0:?}")]
    InvalidUrl(String, #[source] url::ParseError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to acquire an access token for {audience}: {detail}")]
    Credentials {
        audience: Audience,
        detail: String,
    },
    #[error(transparent)]
    Model(#[from] detector_models::Error),
}

impl Error {
    /// Transient errors are expected to succeed if retried: server errors,
    /// request timeouts, throttling, and failures to reach the service.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Error::Transport { .. } | Error::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Http { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
