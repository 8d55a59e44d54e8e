use crate::{output, CliContext};
use detector_clients::{
    metrics::{Aggregation, MetricQuery, MetricSeries},
    CancellationToken,
};
use detector_models::ResourceIdentifier;
use std::time::Duration;

/// Read Azure Monitor metrics of a resource.
#[derive(Debug, clap::Args)]
pub struct Metrics {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// List the metrics which a resource emits.
    Definitions {
        /// ARM ID of the resource.
        resource: ResourceIdentifier,
        /// Namespace of listed metrics.
        #[clap(long)]
        namespace: Option<String>,
    },
    /// Read values of metrics of a resource.
    Values(Values),
}

#[derive(Debug, clap::Args)]
struct Values {
    /// ARM ID of the resource.
    resource: ResourceIdentifier,
    /// Name of a read metric. May be repeated.
    #[clap(long = "metric", required = true)]
    metrics: Vec<String>,
    /// Namespace of the metrics.
    #[clap(long)]
    namespace: Option<String>,
    /// Span of read data, ending now, such as "6h". Defaults to one day.
    #[clap(long, value_parser = humantime::parse_duration)]
    since: Option<Duration>,
    /// Interval of data points, such as "5m" or "1h".
    #[clap(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Aggregation of data points. May be repeated.
    #[clap(long = "aggregation", value_enum)]
    aggregations: Vec<AggregationArg>,
    /// OData filter over metric dimensions, such as "ApiName eq '*'".
    #[clap(long)]
    filter: Option<String>,
    /// Maximum number of time series when filtering by dimensions.
    #[clap(long)]
    top: Option<u32>,
}

#[derive(clap::ValueEnum, Debug, Copy, Clone)]
enum AggregationArg {
    Average,
    Minimum,
    Maximum,
    Total,
    Count,
}

impl From<AggregationArg> for Aggregation {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::Average => Aggregation::Average,
            AggregationArg::Minimum => Aggregation::Minimum,
            AggregationArg::Maximum => Aggregation::Maximum,
            AggregationArg::Total => Aggregation::Total,
            AggregationArg::Count => Aggregation::Count,
        }
    }
}

impl Metrics {
    pub async fn run(&self, ctx: &CliContext, cancel: &CancellationToken) -> anyhow::Result<()> {
        let client = ctx.factory.metrics_client();

        match &self.cmd {
            Command::Definitions {
                resource,
                namespace,
            } => {
                let definitions = client
                    .metric_definitions(resource, namespace.as_deref(), cancel)
                    .await?;

                ctx.output.print(&definitions, |definitions| {
                    let mut table =
                        output::new_table(vec!["Name", "Unit", "Aggregation", "Dimensions"]);
                    for d in definitions {
                        table.add_row(vec![
                            d.name.clone(),
                            d.unit.clone(),
                            d.primary_aggregation.clone().unwrap_or_default(),
                            d.dimensions.join(", "),
                        ]);
                    }
                    table
                })
            }
            Command::Values(values) => {
                let query = values.query()?;
                let series = client
                    .metric_values(&values.resource, &query, cancel)
                    .await?;

                ctx.output.print(&series, series_table)
            }
        }
    }
}

impl Values {
    fn query(&self) -> anyhow::Result<MetricQuery> {
        let time_span = match self.since {
            Some(since) => {
                let end = chrono::Utc::now();
                Some((end - chrono::Duration::from_std(since)?, end))
            }
            // The client defaults to the last day.
            None => None,
        };

        Ok(MetricQuery {
            metric_names: self.metrics.clone(),
            metric_namespace: self.namespace.clone(),
            time_span,
            interval: self.interval,
            aggregations: self.aggregations.iter().copied().map(Into::into).collect(),
            filter: self.filter.clone(),
            top: self.top,
        })
    }
}

fn series_table(series: &[MetricSeries]) -> comfy_table::Table {
    let mut table = output::new_table(vec![
        "Metric",
        "Dimensions",
        "Timestamp",
        "Average",
        "Minimum",
        "Maximum",
        "Total",
        "Count",
    ]);
    let num = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    for s in series {
        let dimensions = s
            .dimensions
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");

        for point in &s.points {
            table.add_row(vec![
                format!("{} ({})", s.name, s.unit),
                dimensions.clone(),
                point.timestamp.to_rfc3339(),
                num(point.average),
                num(point.minimum),
                num(point.maximum),
                num(point.total),
                num(point.count),
            ]);
        }
    }
    table
}
