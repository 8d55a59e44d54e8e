use crate::{arm::ResourceManagerClient, CancellationToken, Error};
use chrono::{DateTime, Utc};
use detector_models::{Clock, ResourceIdentifier};
use std::collections::BTreeMap;
use std::sync::Arc;

const METRICS_API_VERSION: &str = "2018-01-01";

/// Aggregation of metric values within an interval.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Aggregation {
    Average,
    Minimum,
    Maximum,
    Total,
    Count,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Minimum => "Minimum",
            Aggregation::Maximum => "Maximum",
            Aggregation::Total => "Total",
            Aggregation::Count => "Count",
        }
    }
}

/// MetricQuery selects the values of one or more metrics of a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricQuery {
    pub metric_names: Vec<String>,
    pub metric_namespace: Option<String>,
    /// Start and end of the queried span. Defaults to the last day.
    pub time_span: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Interval of data points.
    pub interval: Option<std::time::Duration>,
    pub aggregations: Vec<Aggregation>,
    /// OData filter over metric dimensions, e.g. `ApiName eq '*'`.
    pub filter: Option<String>,
    /// Maximum number of time series returned when filtering by dimensions.
    pub top: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub namespace: Option<String>,
    pub unit: String,
    pub primary_aggregation: Option<String>,
    pub dimensions: Vec<String>,
}

/// A time series of a metric, identified by its dimension values.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub unit: String,
    pub dimensions: BTreeMap<String, String>,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub total: Option<f64>,
    pub count: Option<f64>,
}

/// MetricsClient reads Azure Monitor metrics of resources.
#[derive(Clone)]
pub struct MetricsClient {
    arm: ResourceManagerClient,
    clock: Arc<dyn Clock>,
}

impl MetricsClient {
    pub fn new(arm: ResourceManagerClient, clock: Arc<dyn Clock>) -> Self {
        Self { arm, clock }
    }

    /// List the metrics which `resource` emits.
    pub async fn metric_definitions(
        &self,
        resource: &ResourceIdentifier,
        metric_namespace: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricDefinition>, Error> {
        let mut url = self
            .arm
            .resolve_url(&format!("{resource}/providers/Microsoft.Insights/metricDefinitions"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", METRICS_API_VERSION);
            if let Some(namespace) = metric_namespace {
                query.append_pair("metricnamespace", namespace);
            }
        }

        let items = self.arm.execute_query(url.as_str(), cancel).await?;

        items
            .into_iter()
            .map(|item| -> Result<MetricDefinition, Error> {
                let wire::Definition {
                    name,
                    namespace,
                    unit,
                    primary_aggregation_type,
                    dimensions,
                } = serde_json::from_value(item).map_err(|source| Error::Parse {
                    context: format!("metric definitions of {resource}"),
                    source,
                })?;

                Ok(MetricDefinition {
                    name: name.value,
                    namespace,
                    unit,
                    primary_aggregation: primary_aggregation_type,
                    dimensions: dimensions.into_iter().map(|d| d.value).collect(),
                })
            })
            .collect()
    }

    /// Read metric values of `resource`, flattened into one series per
    /// metric and combination of dimension values.
    #[tracing::instrument(skip(self, query, cancel), fields(%resource, metrics = ?query.metric_names), err)]
    pub async fn metric_values(
        &self,
        resource: &ResourceIdentifier,
        query: &MetricQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricSeries>, Error> {
        let (start, end) = query.time_span.unwrap_or_else(|| {
            let now = self.clock.now();
            (now - chrono::Duration::days(1), now)
        });

        let mut url = self
            .arm
            .resolve_url(&format!("{resource}/providers/Microsoft.Insights/metrics"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api-version", METRICS_API_VERSION);
            pairs.append_pair(
                "timespan",
                &format!(
                    "{}/{}",
                    start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ),
            );
            if !query.metric_names.is_empty() {
                pairs.append_pair("metricnames", &query.metric_names.join(","));
            }
            if let Some(namespace) = &query.metric_namespace {
                pairs.append_pair("metricnamespace", namespace);
            }
            if let Some(interval) = query.interval {
                pairs.append_pair("interval", &crate::telemetry::iso8601_duration(interval));
            }
            if !query.aggregations.is_empty() {
                let aggregations = query
                    .aggregations
                    .iter()
                    .map(Aggregation::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.append_pair("aggregation", &aggregations);
            }
            if let Some(filter) = &query.filter {
                pairs.append_pair("$filter", filter);
            }
            if let Some(top) = query.top {
                pairs.append_pair("top", &top.to_string());
            }
        }

        let items = self.arm.execute_query(url.as_str(), cancel).await?;

        let mut series = Vec::new();
        for item in items {
            let wire::Metric {
                name,
                unit,
                timeseries,
            } = serde_json::from_value(item).map_err(|source| Error::Parse {
                context: format!("metrics of {resource}"),
                source,
            })?;

            for wire::TimeSeries { metadatavalues, data } in timeseries {
                series.push(MetricSeries {
                    name: name.value.clone(),
                    unit: unit.clone(),
                    dimensions: metadatavalues
                        .into_iter()
                        .map(|m| (m.name.value, m.value))
                        .collect(),
                    points: data
                        .into_iter()
                        .map(|d| MetricPoint {
                            timestamp: d.time_stamp,
                            average: d.average,
                            minimum: d.minimum,
                            maximum: d.maximum,
                            total: d.total,
                            count: d.count,
                        })
                        .collect(),
                });
            }
        }
        Ok(series)
    }
}

mod wire {
    use chrono::{DateTime, Utc};

    #[derive(serde::Deserialize)]
    pub struct LocalizableString {
        pub value: String,
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Definition {
        pub name: LocalizableString,
        #[serde(default)]
        pub namespace: Option<String>,
        #[serde(default)]
        pub unit: String,
        #[serde(default)]
        pub primary_aggregation_type: Option<String>,
        #[serde(default)]
        pub dimensions: Vec<LocalizableString>,
    }

    #[derive(serde::Deserialize)]
    pub struct Metric {
        pub name: LocalizableString,
        #[serde(default)]
        pub unit: String,
        #[serde(default)]
        pub timeseries: Vec<TimeSeries>,
    }

    #[derive(serde::Deserialize)]
    pub struct TimeSeries {
        #[serde(default)]
        pub metadatavalues: Vec<MetadataValue>,
        #[serde(default)]
        pub data: Vec<DataPoint>,
    }

    #[derive(serde::Deserialize)]
    pub struct MetadataValue {
        pub name: LocalizableString,
        pub value: String,
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DataPoint {
        pub time_stamp: DateTime<Utc>,
        pub average: Option<f64>,
        pub minimum: Option<f64>,
        pub maximum: Option<f64>,
        pub total: Option<f64>,
        pub count: Option<f64>,
    }
}
