use crate::Error;
use std::time::Duration;

/// Configuration of the external service clients.
/// Every field has a default, so a partial document may be deserialized.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of Azure Resource Manager.
    pub arm_endpoint: url::Url,
    /// Base URL of the Log Analytics query API.
    pub log_analytics_endpoint: url::Url,
    /// Base URL of the Application Insights query API.
    pub application_insights_endpoint: url::Url,
    /// Timeout of each individual HTTP request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum number of telemetry resources a single query will fan out to.
    /// Further resources are dropped.
    pub max_resources: usize,
    /// Number of telemetry resources serviced by a single query request.
    pub batch_size: usize,
    /// Application name sent with every telemetry query.
    pub app_name: String,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts of an operation, including the first.
    pub max_attempts: u32,
    /// Attempt `n` (from zero) which fails is followed by a wait of
    /// `backoff_base ^ n` seconds.
    pub backoff_base: u32,
    /// Upper bound of a single wait.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            arm_endpoint: url::Url::parse("https://management.azure.com/").unwrap(),
            log_analytics_endpoint: url::Url::parse("https://api.loganalytics.io/").unwrap(),
            application_insights_endpoint: url::Url::parse("https://api.applicationinsights.io/")
                .unwrap(),
            request_timeout: Duration::from_secs(100),
            max_resources: 300,
            batch_size: 15,
            app_name: "SmartDetectorsRuntime".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least one"));
        }
        if self.max_resources == 0 {
            return Err(Error::InvalidConfig("max_resources must be at least one"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidConfig("request_timeout must be non-zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be at least one"));
        }
        if self.retry.backoff_base == 0 {
            return Err(Error::InvalidConfig("retry.backoff_base must be at least one"));
        }
        Ok(())
    }
}
