use crate::{
    arm::{ApiVersionCache, ResourceManagerClient},
    config::ClientConfig,
    http::{new_http_client, HttpClient, Transport},
    metrics::MetricsClient,
    retry::{DependencyTracker, RetryPolicy, TracingTracker},
    telemetry::{QueryRunInfoProvider, TelemetryQueryClient},
    CancellationToken, Error, TokenProvider,
};
use detector_models::{Clock, ResourceIdentifier, SystemClock, TelemetryDbType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// AnalysisServicesFactory hands out the clients available to a detector's
/// analysis. Clients share one transport, token provider, and API version
/// cache, and each external dependency has a single RetryPolicy.
///
/// The factory records whether a Log Analytics or Application Insights
/// client was handed out, which the host reports for the analysis.
pub struct AnalysisServicesFactory {
    config: ClientConfig,
    http: HttpClient,
    credentials: Arc<dyn TokenProvider>,
    clock: Arc<dyn Clock>,
    arm: ResourceManagerClient,
    metrics_policy: Arc<RetryPolicy>,
    log_analytics_policy: Arc<RetryPolicy>,
    application_insights_policy: Arc<RetryPolicy>,
    used_log_analytics: AtomicBool,
    used_application_insights: AtomicBool,
}

impl AnalysisServicesFactory {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
        tracker: Arc<dyn DependencyTracker>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let policy = |dependency: &str| {
            Arc::new(RetryPolicy::new(
                dependency,
                &config.retry,
                tracker.clone(),
                clock.clone(),
            ))
        };
        let http = HttpClient::new(transport, config.request_timeout);

        let arm = ResourceManagerClient::new(
            http.clone(),
            credentials.clone(),
            config.arm_endpoint.clone(),
            policy("AzureResourceManager"),
            Arc::new(ApiVersionCache::default()),
        );
        let metrics_policy = policy("AzureMetrics");
        let log_analytics_policy = policy("LogAnalytics");
        let application_insights_policy = policy("ApplicationInsights");

        Ok(Self {
            config,
            http,
            credentials,
            clock,
            arm,
            metrics_policy,
            log_analytics_policy,
            application_insights_policy,
            used_log_analytics: AtomicBool::new(false),
            used_application_insights: AtomicBool::new(false),
        })
    }

    /// Build a factory which talks to the configured endpoints over HTTPS,
    /// using the wall clock and logging dependency calls.
    pub fn from_config(
        config: ClientConfig,
        credentials: Arc<dyn TokenProvider>,
    ) -> Result<Self, Error> {
        let client = new_http_client(
            concat!("detector-clients/", env!("CARGO_PKG_VERSION")),
            config.request_timeout,
        )?;

        Self::new(
            config,
            Arc::new(client),
            credentials,
            Arc::new(SystemClock),
            Arc::new(TracingTracker),
        )
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn resource_manager_client(&self) -> ResourceManagerClient {
        self.arm.clone()
    }

    pub fn metrics_client(&self) -> MetricsClient {
        MetricsClient::new(
            self.arm.with_retry_policy(self.metrics_policy.clone()),
            self.clock.clone(),
        )
    }

    pub fn query_run_info_provider(&self) -> QueryRunInfoProvider {
        QueryRunInfoProvider::new(self.arm.clone(), self.config.max_resources)
    }

    pub fn log_analytics_client(&self, workspaces: Vec<ResourceIdentifier>) -> TelemetryQueryClient {
        self.used_log_analytics.store(true, Ordering::SeqCst);
        self.query_client(TelemetryDbType::LogAnalytics, workspaces)
    }

    pub fn application_insights_client(
        &self,
        applications: Vec<ResourceIdentifier>,
    ) -> TelemetryQueryClient {
        self.used_application_insights.store(true, Ordering::SeqCst);
        self.query_client(TelemetryDbType::ApplicationInsights, applications)
    }

    /// Build the telemetry query client which services an analysis of `targets`.
    pub async fn telemetry_query_client(
        &self,
        targets: &[ResourceIdentifier],
        cancel: &CancellationToken,
    ) -> Result<TelemetryQueryClient, Error> {
        let run_info = self
            .query_run_info_provider()
            .query_run_info(targets, cancel)
            .await?;

        Ok(match run_info.db_type {
            TelemetryDbType::LogAnalytics => self.log_analytics_client(run_info.resource_ids),
            TelemetryDbType::ApplicationInsights => {
                self.application_insights_client(run_info.resource_ids)
            }
        })
    }

    pub fn used_log_analytics_client(&self) -> bool {
        self.used_log_analytics.load(Ordering::SeqCst)
    }

    pub fn used_application_insights_client(&self) -> bool {
        self.used_application_insights.load(Ordering::SeqCst)
    }

    fn query_client(
        &self,
        db_type: TelemetryDbType,
        resources: Vec<ResourceIdentifier>,
    ) -> TelemetryQueryClient {
        let retry = match db_type {
            TelemetryDbType::LogAnalytics => self.log_analytics_policy.clone(),
            TelemetryDbType::ApplicationInsights => self.application_insights_policy.clone(),
        };

        TelemetryQueryClient::new(
            &self.config,
            db_type,
            resources,
            self.http.clone(),
            self.credentials.clone(),
            self.arm.clone(),
            retry,
        )
    }
}
