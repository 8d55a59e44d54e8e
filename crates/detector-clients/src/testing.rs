//! Fixtures shared by the tests of this crate.
use crate::{
    arm::{ApiVersionCache, ResourceManagerClient},
    retry::{DependencyRecord, DependencyTracker, RetryPolicy, TracingTracker},
    Audience, ClientConfig, Error, HttpClient, Request, Response, StaticTokenProvider,
    TelemetryQueryClient, Transport,
};
use chrono::{DateTime, TimeZone, Utc};
use detector_models::{FixedClock, ResourceIdentifier, ResourceType, TelemetryDbType};
use reqwest::StatusCode;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

lazy_static::lazy_static! {
    pub static ref TEST_EPOCH: DateTime<Utc> = Utc.with_ymd_and_hms(2019, 3, 1, 10, 0, 0).unwrap();
}

/// A Transport which returns scripted responses in order.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Response>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Response>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        self.requests.lock().unwrap().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Malformed {
                context: "scripted transport".to_string(),
                detail: "script is exhausted".to_string(),
            })
    }
}

#[derive(Default)]
pub struct RecordingTracker(Mutex<Vec<DependencyRecord>>);

impl RecordingTracker {
    pub fn records(&self) -> Vec<DependencyRecord> {
        self.0.lock().unwrap().clone()
    }
}

impl DependencyTracker for RecordingTracker {
    fn track(&self, record: DependencyRecord) {
        self.0.lock().unwrap().push(record);
    }
}

/// FakeAzure serves ARM resource lookups (host `arm.test`) and telemetry
/// queries (hosts `la.test` and `ai.test`) over numbered workspaces `ws-{n}`
/// and applications `app-{n}`.
///
/// A resource marked deleted isn't found, and a query which names a deleted
/// resource is rejected as a bad request. A successful query returns one row
/// per queried resource, holding its name.
#[derive(Default)]
pub struct FakeAzure {
    deleted: HashSet<usize>,
    forbidden: HashSet<usize>,
    query_responses: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<Request>>,
}

impl FakeAzure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deleted(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.deleted.extend(indices);
        self
    }

    pub fn with_forbidden(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.forbidden.extend(indices);
        self
    }

    /// Responses served to telemetry queries before falling back to the fake backend.
    pub fn with_query_responses(self, responses: Vec<Response>) -> Self {
        Self {
            query_responses: Mutex::new(responses.into()),
            ..self
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn query_requests(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == reqwest::Method::POST)
            .collect()
    }

    pub fn provider_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| {
                let segments: Vec<_> = r.url.path().split('/').collect();
                segments.len() == 5 && segments[3] == "providers"
            })
            .count()
    }

    fn index_of(name: &str) -> Option<usize> {
        let (_, index) = name.rsplit_once('-')?;
        index.parse().ok()
    }

    fn is_deleted(&self, name: &str) -> bool {
        Self::index_of(name).map_or(false, |i| self.deleted.contains(&i))
    }

    fn serve_arm(&self, request: &Request) -> Response {
        let path = request.url.path();
        let segments: Vec<_> = path.split('/').collect();

        if segments.len() == 5 && segments[3] == "providers" {
            let resource_types = match segments[4] {
                "Microsoft.OperationalInsights" => serde_json::json!([
                    {"resourceType": "workspaces", "apiVersions": ["2021-12-01-preview", "2020-08-01"]},
                    {"resourceType": "querypacks", "apiVersions": ["2019-09-01"]},
                ]),
                "Microsoft.Insights" => serde_json::json!([
                    {"resourceType": "components", "apiVersions": ["2020-02-02", "2015-05-01"]},
                ]),
                _ => serde_json::json!([]),
            };
            return json(
                StatusCode::OK,
                serde_json::json!({"namespace": segments[4], "resourceTypes": resource_types}),
            );
        }

        let Ok(resource) = path.parse::<ResourceIdentifier>() else {
            return json(StatusCode::BAD_REQUEST, error_body("InvalidResourceId", path));
        };
        let name = resource.resource_name().unwrap_or_default();

        if Self::index_of(name).map_or(false, |i| self.forbidden.contains(&i)) {
            json(StatusCode::FORBIDDEN, error_body("AuthorizationFailed", name))
        } else if self.is_deleted(name) {
            json(StatusCode::NOT_FOUND, error_body("ResourceNotFound", name))
        } else {
            json(
                StatusCode::OK,
                serde_json::json!({
                    "id": path,
                    "name": name,
                    "properties": {"customerId": format!("id-{name}"), "AppId": format!("id-{name}")},
                }),
            )
        }
    }

    fn serve_query(&self, request: &Request) -> Response {
        if let Some(response) = self.query_responses.lock().unwrap().pop_front() {
            return response;
        }

        let primary = request
            .url
            .path()
            .trim_end_matches("/query")
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_start_matches("id-")
            .to_string();

        let body = request.body.clone().unwrap_or_default();
        let additional: Vec<String> = ["workspaces", "applications"]
            .iter()
            .filter_map(|key| body.get(*key).and_then(serde_json::Value::as_array))
            .flatten()
            .filter_map(|id| id.as_str()?.parse::<ResourceIdentifier>().ok())
            .filter_map(|r| r.resource_name().map(str::to_string))
            .collect();

        if let Some(deleted) = additional.iter().find(|name| self.is_deleted(name)) {
            return json(
                StatusCode::BAD_REQUEST,
                error_body("BadArgumentError", &format!("resource {deleted} does not exist")),
            );
        }

        let rows: Vec<_> = std::iter::once(primary)
            .chain(additional)
            .map(|name| serde_json::json!([name]))
            .collect();

        json(
            StatusCode::OK,
            serde_json::json!({"tables": [{
                "name": "PrimaryResult",
                "columns": [{"name": "Resource", "type": "string"}],
                "rows": rows,
            }]}),
        )
    }
}

#[async_trait::async_trait]
impl Transport for FakeAzure {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        self.requests.lock().unwrap().push(request.clone());

        Ok(match request.url.host_str() {
            Some("arm.test") => self.serve_arm(&request),
            Some("la.test") | Some("ai.test") => self.serve_query(&request),
            _ => json(StatusCode::NOT_FOUND, error_body("UnknownHost", request.url.as_str())),
        })
    }
}

fn json(status: StatusCode, body: serde_json::Value) -> Response {
    Response::new(status, body.to_string())
}

fn error_body(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

pub fn workspace(n: usize) -> ResourceIdentifier {
    ResourceIdentifier::resource(ResourceType::LogAnalytics, "sub", "rg", format!("ws-{n}")).unwrap()
}

pub fn application(n: usize) -> ResourceIdentifier {
    ResourceIdentifier::resource(ResourceType::ApplicationInsights, "sub", "rg", format!("app-{n}"))
        .unwrap()
}

pub fn config() -> ClientConfig {
    ClientConfig {
        arm_endpoint: url::Url::parse("https://arm.test/").unwrap(),
        log_analytics_endpoint: url::Url::parse("https://la.test/").unwrap(),
        application_insights_endpoint: url::Url::parse("https://ai.test/").unwrap(),
        ..Default::default()
    }
}

pub fn credentials() -> StaticTokenProvider {
    StaticTokenProvider::new("token")
        .with_audience(Audience::ResourceManager, "arm-token")
        .with_audience(Audience::LogAnalytics, "la-token")
        .with_audience(Audience::ApplicationInsights, "ai-token")
}

pub fn policy(dependency: &str, config: &ClientConfig) -> Arc<RetryPolicy> {
    Arc::new(RetryPolicy::new(
        dependency,
        &config.retry,
        Arc::new(TracingTracker),
        Arc::new(FixedClock::new(*TEST_EPOCH)),
    ))
}

pub fn arm_client(transport: Arc<dyn Transport>) -> ResourceManagerClient {
    let config = config();

    ResourceManagerClient::new(
        HttpClient::new(transport, config.request_timeout),
        Arc::new(credentials()),
        config.arm_endpoint.clone(),
        policy("AzureResourceManager", &config),
        Arc::new(ApiVersionCache::default()),
    )
}

pub fn query_client(
    transport: Arc<dyn Transport>,
    config: &ClientConfig,
    db_type: TelemetryDbType,
    resources: Vec<ResourceIdentifier>,
) -> TelemetryQueryClient {
    let dependency = match db_type {
        TelemetryDbType::LogAnalytics => "LogAnalytics",
        TelemetryDbType::ApplicationInsights => "ApplicationInsights",
    };

    TelemetryQueryClient::new(
        config,
        db_type,
        resources,
        HttpClient::new(transport.clone(), config.request_timeout),
        Arc::new(credentials()),
        arm_client(transport),
        policy(dependency, config),
    )
}
