use crate::CliContext;
use anyhow::Context;
use detector_clients::CancellationToken;
use detector_models::ResourceIdentifier;
use std::time::Duration;

/// Run a telemetry query over the telemetry of target resources.
#[derive(Debug, clap::Args)]
pub struct Query {
    /// Target resource of the query, as an ARM resource ID. May be repeated.
    ///
    /// Application Insights applications and Log Analytics workspaces are
    /// queried directly. Other resources are queried through every Log
    /// Analytics workspace of their subscriptions.
    #[clap(long = "resource", required = true)]
    pub(crate) resources: Vec<ResourceIdentifier>,
    /// Text of the query.
    #[clap(long)]
    pub(crate) query: String,
    /// Span of queried data, ending now, such as "1h" or "7days".
    /// All retained data is queried if unset.
    #[clap(long, value_parser = humantime::parse_duration)]
    pub(crate) timespan: Option<Duration>,
}

/// Print the telemetry backend and resources which service queries of target resources.
#[derive(Debug, clap::Args)]
pub struct RunInfo {
    /// Target resource, as an ARM resource ID. May be repeated.
    #[clap(long = "resource", required = true)]
    resources: Vec<ResourceIdentifier>,
}

impl Query {
    pub async fn run(&self, ctx: &CliContext, cancel: &CancellationToken) -> anyhow::Result<()> {
        let client = ctx
            .factory
            .telemetry_query_client(&self.resources, cancel)
            .await
            .context("resolving telemetry resources of the query")?;

        tracing::info!(
            db_type = %client.db_type(),
            resources = client.resources().len(),
            "running query"
        );

        let tables = client
            .run_query(&self.query, self.timespan, cancel)
            .await
            .context("running telemetry query")?;

        ctx.output.print_data_tables(&tables)
    }
}

impl RunInfo {
    pub async fn run(&self, ctx: &CliContext, cancel: &CancellationToken) -> anyhow::Result<()> {
        let run_info = ctx
            .factory
            .query_run_info_provider()
            .query_run_info(&self.resources, cancel)
            .await?;

        ctx.output.print(&[run_info], |infos| {
            let mut table = crate::output::new_table(vec!["Telemetry", "Resource"]);
            for info in infos {
                for resource in &info.resource_ids {
                    table.add_row(vec![info.db_type.to_string(), resource.to_string()]);
                }
            }
            table
        })
    }
}
