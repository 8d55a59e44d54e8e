use super::{wire, TelemetryResourceResolver};
use crate::{
    arm::ResourceManagerClient, config::ClientConfig, credentials::Audience, http::HttpClient,
    retry::RetryPolicy, CancellationToken, Error, Request, Response, TelemetryDataError,
    TokenProvider,
};
use detector_models::{merge_table_sets, DataTable, ResourceIdentifier, TelemetryDbType};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// TelemetryQueryClient runs queries of a Log Analytics or Application Insights
/// backend across an ordered list of its resources. The resources are split into
/// contiguous batches which are queried one after another, and the tables of
/// every batch are merged into a single result.
#[derive(Clone)]
pub struct TelemetryQueryClient {
    db_type: TelemetryDbType,
    resources: Vec<ResourceIdentifier>,
    endpoint: url::Url,
    app_name: String,
    batch_size: usize,
    http: HttpClient,
    credentials: Arc<dyn TokenProvider>,
    resolver: TelemetryResourceResolver,
    retry: Arc<RetryPolicy>,
}

impl TelemetryQueryClient {
    /// Build a client over `resources`. Resources beyond the configured
    /// maximum are dropped.
    pub fn new(
        config: &ClientConfig,
        db_type: TelemetryDbType,
        mut resources: Vec<ResourceIdentifier>,
        http: HttpClient,
        credentials: Arc<dyn TokenProvider>,
        arm: ResourceManagerClient,
        retry: Arc<RetryPolicy>,
    ) -> Self {
        if resources.len() > config.max_resources {
            tracing::warn!(
                %db_type,
                requested = resources.len(),
                max = config.max_resources,
                "too many telemetry resources; surplus resources are dropped"
            );
            resources.truncate(config.max_resources);
        }

        let endpoint = match db_type {
            TelemetryDbType::LogAnalytics => config.log_analytics_endpoint.clone(),
            TelemetryDbType::ApplicationInsights => config.application_insights_endpoint.clone(),
        };

        Self {
            db_type,
            resources,
            endpoint,
            app_name: config.app_name.clone(),
            batch_size: config.batch_size.max(1),
            http,
            credentials,
            resolver: TelemetryResourceResolver::new(arm),
            retry,
        }
    }

    pub fn db_type(&self) -> TelemetryDbType {
        self.db_type
    }

    pub fn resources(&self) -> &[ResourceIdentifier] {
        &self.resources
    }

    /// Run `query` over the data of the last `data_time_span`, or over all data
    /// if None. The call succeeds with the merged tables of every batch, or fails
    /// as a whole.
    #[tracing::instrument(
        skip(self, query, cancel),
        fields(db_type = %self.db_type, resources = self.resources.len()),
        err,
    )]
    pub async fn run_query(
        &self,
        query: &str,
        data_time_span: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataTable>, Error> {
        if self.resources.is_empty() {
            return Err(Error::NoResources);
        }

        let batches = self
            .resources
            .chunks(self.batch_size)
            .map(<[ResourceIdentifier]>::to_vec)
            .collect::<Vec<_>>();
        let num_batches = batches.len();

        let mut tables = Vec::new();
        for (index, mut batch) in batches.into_iter().enumerate() {
            let Some(telemetry_id) = self
                .resolver
                .get_single_telemetry_id(self.db_type, &mut batch, cancel)
                .await?
            else {
                // A trailing batch holds few resources, which may well all have
                // been deleted. Don't fail a query which otherwise succeeded.
                if num_batches > 1 && index + 1 == num_batches {
                    tracing::warn!(batch = index, "no resource of the last batch was found; skipping it");
                    continue;
                }
                return Err(Error::NoTelemetryResourcesFound);
            };

            let batch_tables = self
                .query_batch(query, data_time_span, &telemetry_id, batch, cancel)
                .await?;
            tracing::debug!(batch = index, tables = batch_tables.len(), "queried batch");

            merge_table_sets(&mut tables, batch_tables);
        }
        Ok(tables)
    }

    async fn query_batch(
        &self,
        query: &str,
        data_time_span: Option<Duration>,
        telemetry_id: &str,
        mut additional: Vec<ResourceIdentifier>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataTable>, Error> {
        let mut filtered = false;

        loop {
            let err = match self
                .post_query(query, data_time_span, telemetry_id, &additional, cancel)
                .await
            {
                Ok(response) => return wire::parse_tables(&response.body),
                Err(err) => err,
            };

            let (status, body) = match err {
                Error::Http { status, body, .. } => (status, body),
                // Transient failures which outlasted the retry policy.
                Error::Timeout { .. } => return Err(unreachable_backend("RequestTimeout", &err)),
                Error::Transport { .. } => {
                    return Err(unreachable_backend("ServiceUnreachable", &err))
                }
                err => return Err(err),
            };

            // A bad request may be caused by additional resources which were
            // deleted. If any were, query once more without them.
            if status == StatusCode::BAD_REQUEST && !filtered {
                let before = additional.len();
                additional = self.resolver.filter_existing(additional, cancel).await?;

                if additional.len() != before {
                    tracing::warn!(
                        removed = before - additional.len(),
                        "query was rejected and some of its resources were deleted; retrying without them"
                    );
                    filtered = true;
                    continue;
                }
            }
            return Err(wire::parse_error(status, body.as_bytes()).into());
        }
    }

    async fn post_query(
        &self,
        query: &str,
        data_time_span: Option<Duration>,
        telemetry_id: &str,
        additional: &[ResourceIdentifier],
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        let (segment, audience) = match self.db_type {
            TelemetryDbType::LogAnalytics => ("workspaces", Audience::LogAnalytics),
            TelemetryDbType::ApplicationInsights => ("apps", Audience::ApplicationInsights),
        };
        let path = format!("v1/{segment}/{telemetry_id}/query");
        let url = self
            .endpoint
            .join(&path)
            .map_err(|err| Error::InvalidUrl(path.clone(), err))?;

        let body = serde_json::to_value(wire::QueryRequest::new(
            self.db_type,
            query,
            data_time_span,
            additional.iter().map(ToString::to_string).collect(),
        ))
        .map_err(|source| Error::Parse {
            context: "telemetry query request".to_string(),
            source,
        })?;

        let prefer = format!(
            "wait={}, ai.include-error-payload=true",
            self.http.timeout().as_secs()
        );
        let command = format!("POST {}", url.path());

        self.retry
            .execute(&command, cancel, || async {
                let token = self.credentials.token(audience).await?;
                let request = Request::post(url.clone(), body.clone())
                    .bearer_auth(&token)
                    .header("Prefer", prefer.as_str())
                    .header("x-ms-app", self.app_name.as_str())
                    .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string());

                self.http.send_checked(request, cancel).await
            })
            .await
    }
}

fn unreachable_backend(code: &str, err: &Error) -> Error {
    let mut message = err.to_string();
    if let Some(source) = std::error::Error::source(err) {
        message = format!("{message}: {source}");
    }
    TelemetryDataError {
        code: code.to_string(),
        message,
        inner: None,
    }
    .into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{self, FakeAzure};
    use crate::Transport;
    use detector_models::Value;

    fn names(tables: &[DataTable]) -> Vec<String> {
        assert_eq!(tables.len(), 1);
        tables[0]
            .rows
            .iter()
            .map(|row| match &row[0] {
                Value::String(name) => name.clone(),
                other => panic!("unexpected cell {other:?}"),
            })
            .collect()
    }

    fn workspaces(count: usize) -> Vec<ResourceIdentifier> {
        (1..=count).map(testing::workspace).collect()
    }

    #[tokio::test]
    async fn test_one_request_per_batch() {
        for (count, expect_posts) in [(1, 1), (15, 1), (16, 2), (30, 2), (31, 3), (45, 3)] {
            let fake = Arc::new(FakeAzure::new());
            let client = testing::query_client(
                fake.clone(),
                &testing::config(),
                TelemetryDbType::LogAnalytics,
                workspaces(count),
            );

            let tables = client
                .run_query("Heartbeat", None, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(fake.query_requests().len(), expect_posts, "{count} resources");
            assert_eq!(names(&tables).len(), count);
        }
    }

    #[tokio::test]
    async fn test_deleted_resources_are_ignored() {
        let fake = Arc::new(FakeAzure::new().with_deleted([1, 2, 25, 31]));
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(31),
        );

        let tables = client
            .run_query("Heartbeat | distinct Computer", None, &CancellationToken::new())
            .await
            .unwrap();

        // The first batch resolves ws-3 as its primary. The second batch is
        // rejected for including ws-25 and retried without it. The last batch
        // holds only ws-31, which is skipped.
        assert_eq!(fake.query_requests().len(), 3);

        let expect: Vec<String> = (3..=30)
            .filter(|n| *n != 25)
            .map(|n| format!("ws-{n}"))
            .collect();
        assert_eq!(names(&tables), expect);
    }

    #[tokio::test]
    async fn test_single_batch_without_resources_fails() {
        let fake = Arc::new(FakeAzure::new().with_deleted([1, 2, 3]));
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(3),
        );

        let err = client
            .run_query("Heartbeat", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoTelemetryResourcesFound));
        assert!(fake.query_requests().is_empty());
    }

    #[tokio::test]
    async fn test_non_last_batch_without_resources_fails() {
        let fake = Arc::new(FakeAzure::new().with_deleted(1..=15));
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(20),
        );

        let err = client
            .run_query("Heartbeat", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoTelemetryResourcesFound));
        assert!(fake.query_requests().is_empty());
    }

    #[tokio::test]
    async fn test_bad_request_not_caused_by_deletion() {
        let fake = Arc::new(FakeAzure::new().with_query_responses(vec![Response::new(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"BadArgumentError","message":"The request had some invalid properties","innererror":{"code":"SyntaxError","message":"Query could not be parsed at '|'"}}}"#,
        )]));
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::ApplicationInsights,
            (1..=3).map(testing::application).collect(),
        );

        let err = client
            .run_query("requests | | count", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(fake.query_requests().len(), 1);
        assert_eq!(
            err.to_string(),
            "[BadArgumentError] The request had some invalid properties"
        );
        let Error::TelemetryData(err) = err else {
            panic!("expected a telemetry data error")
        };
        assert_eq!(
            err.inner.map(|inner| inner.to_string()).as_deref(),
            Some("[SyntaxError] Query could not be parsed at '|'")
        );
    }

    #[tokio::test]
    async fn test_bad_request_after_filtering_is_fatal() {
        let bad_request = |message: &str| {
            Response::new(
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": {"code": "BadArgumentError", "message": message}})
                    .to_string(),
            )
        };
        let fake = Arc::new(
            FakeAzure::new()
                .with_deleted([2])
                .with_query_responses(vec![
                    bad_request("resource ws-2 does not exist"),
                    bad_request("Query could not be parsed"),
                ]),
        );
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(3),
        );

        let err = client
            .run_query("Heartbeat |", None, &CancellationToken::new())
            .await
            .unwrap_err();

        // One filtered retry, and no more.
        let posts = fake.query_requests();
        assert_eq!(posts.len(), 2);
        assert_eq!(
            posts[1].body.as_ref().unwrap()["workspaces"],
            serde_json::json!([testing::workspace(3).to_string()])
        );

        let Error::TelemetryData(err) = err else {
            panic!("expected a telemetry data error")
        };
        assert_eq!(err.to_string(), "[BadArgumentError] Query could not be parsed");
    }

    /// Cancels `cancel` upon the `nth` query POST (counted from zero), which
    /// then never completes.
    struct CancelOnQuery {
        inner: Arc<FakeAzure>,
        cancel: CancellationToken,
        nth: usize,
        posts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Transport for CancelOnQuery {
        async fn send(&self, request: Request) -> Result<Response, Error> {
            if request.method == reqwest::Method::POST
                && self.posts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == self.nth
            {
                self.cancel.cancel();
                std::future::pending::<()>().await;
            }
            self.inner.send(request).await
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_batches_discards_results() {
        let fake = Arc::new(FakeAzure::new());
        let cancel = CancellationToken::new();
        let transport = Arc::new(CancelOnQuery {
            inner: fake.clone(),
            cancel: cancel.clone(),
            nth: 1,
            posts: Default::default(),
        });
        let client = testing::query_client(
            transport,
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(16),
        );

        let err = client.run_query("Heartbeat", None, &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        // The first batch completed before the second was cancelled.
        assert_eq!(fake.query_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_then_fail() {
        let unavailable = || {
            Response::new(
                StatusCode::SERVICE_UNAVAILABLE,
                r#"{"error":{"code":"ServiceUnavailable","message":"Try again later"}}"#,
            )
        };
        let fake = Arc::new(FakeAzure::new().with_query_responses(vec![
            unavailable(),
            unavailable(),
            unavailable(),
        ]));
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(2),
        );

        let err = client
            .run_query("Heartbeat", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(fake.query_requests().len(), 3);
        assert_eq!(err.to_string(), "[ServiceUnavailable] Try again later");
    }

    /// Forwards requests to `inner`, except query POSTs which never complete.
    struct StalledQueries {
        inner: Arc<FakeAzure>,
        posts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Transport for StalledQueries {
        async fn send(&self, request: Request) -> Result<Response, Error> {
            if request.method == reqwest::Method::POST {
                self.posts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                std::future::pending::<()>().await;
            }
            self.inner.send(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried_then_fail() {
        let transport = Arc::new(StalledQueries {
            inner: Arc::new(FakeAzure::new()),
            posts: Default::default(),
        });
        let client = testing::query_client(
            transport.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(2),
        );

        let err = client
            .run_query("Heartbeat", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.posts.load(std::sync::atomic::Ordering::SeqCst), 3);
        let Error::TelemetryData(err) = err else {
            panic!("expected a telemetry data error")
        };
        assert_eq!(err.code, "RequestTimeout");
        assert_eq!(
            err.message,
            "POST https://la.test/v1/workspaces/id-ws-1/query timed out after 100s"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let fake = Arc::new(FakeAzure::new().with_query_responses(vec![Response::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom",
        )]));
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(2),
        );

        let tables = client
            .run_query("Heartbeat", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fake.query_requests().len(), 2);
        assert_eq!(names(&tables), vec!["ws-1", "ws-2"]);

        // Each attempt carries its own request ID.
        let ids: Vec<_> = fake
            .query_requests()
            .iter()
            .map(|r| r.header_value("x-ms-client-request-id").unwrap().to_string())
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_resources_are_capped() {
        let fake = Arc::new(FakeAzure::new());
        let config = ClientConfig {
            max_resources: 20,
            ..testing::config()
        };
        let client = testing::query_client(
            fake.clone(),
            &config,
            TelemetryDbType::LogAnalytics,
            workspaces(25),
        );
        assert_eq!(client.resources().len(), 20);

        let tables = client
            .run_query("Heartbeat", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fake.query_requests().len(), 2);
        assert_eq!(names(&tables).len(), 20);

        for request in fake.requests() {
            let text = format!("{} {:?}", request.url, request.body);
            for n in 21..=25 {
                assert!(!text.contains(&format!("ws-{n}\"")), "{text}");
                assert!(!request.url.path().ends_with(&format!("/ws-{n}")), "{text}");
            }
        }
    }

    #[tokio::test]
    async fn test_request_wire_format() {
        let fake = Arc::new(FakeAzure::new());
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(2),
        );

        client
            .run_query(
                "Perf | summarize avg(CounterValue)",
                Some(Duration::from_secs(3600)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let requests = fake.query_requests();
        let request = &requests[0];

        assert_eq!(request.url.as_str(), "https://la.test/v1/workspaces/id-ws-1/query");
        assert_eq!(request.header_value("Authorization"), Some("Bearer la-token"));
        assert_eq!(
            request.header_value("Prefer"),
            Some("wait=100, ai.include-error-payload=true")
        );
        assert_eq!(request.header_value("x-ms-app"), Some("SmartDetectorsRuntime"));
        assert!(uuid::Uuid::parse_str(request.header_value("x-ms-client-request-id").unwrap()).is_ok());

        insta::assert_json_snapshot!(request.body, @r###"
        {
          "query": "Perf | summarize avg(CounterValue)",
          "timespan": "PT1H",
          "workspaces": [
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.OperationalInsights/workspaces/ws-2"
          ]
        }
        "###);
    }

    #[tokio::test]
    async fn test_column_sets_of_batches_are_unioned() {
        let table = |columns: serde_json::Value, rows: serde_json::Value| {
            Response::new(
                StatusCode::OK,
                serde_json::json!({"tables": [{"name": "PrimaryResult", "columns": columns, "rows": rows}]})
                    .to_string(),
            )
        };
        let fake = Arc::new(FakeAzure::new().with_query_responses(vec![
            table(
                serde_json::json!([{"name": "Category", "type": "string"}, {"name": "count_", "type": "long"}]),
                serde_json::json!([["Error", 3]]),
            ),
            table(
                serde_json::json!([
                    {"name": "Category", "type": "string"},
                    {"name": "count_", "type": "long"},
                    {"name": "Subcategory", "type": "string"},
                ]),
                serde_json::json!([["Error", 3, "Disk"], ["Warning", 1, null]]),
            ),
        ]));
        let config = ClientConfig {
            batch_size: 1,
            ..testing::config()
        };
        let client = testing::query_client(
            fake.clone(),
            &config,
            TelemetryDbType::LogAnalytics,
            workspaces(2),
        );

        let tables = client
            .run_query("Events | summarize count() by Category", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fake.query_requests().len(), 2);

        insta::assert_json_snapshot!(tables, @r###"
        [
          {
            "name": "PrimaryResult",
            "columns": [
              {
                "name": "Category",
                "type": "string"
              },
              {
                "name": "count_",
                "type": "long"
              },
              {
                "name": "Subcategory",
                "type": "string"
              }
            ],
            "rows": [
              [
                "Error",
                3,
                null
              ],
              [
                "Error",
                3,
                "Disk"
              ],
              [
                "Warning",
                1,
                null
              ]
            ]
          }
        ]
        "###);
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let fake = Arc::new(FakeAzure::new());
        let client = testing::query_client(
            fake.clone(),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            workspaces(2),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.run_query("Heartbeat", None, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_no_resources() {
        let client = testing::query_client(
            Arc::new(FakeAzure::new()),
            &testing::config(),
            TelemetryDbType::LogAnalytics,
            Vec::new(),
        );
        assert!(matches!(
            client.run_query("Heartbeat", None, &CancellationToken::new()).await,
            Err(Error::NoResources)
        ));
    }
}
