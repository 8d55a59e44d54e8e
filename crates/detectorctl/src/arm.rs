use crate::{output, CliContext};
use detector_clients::CancellationToken;
use detector_models::{ResourceIdentifier, ResourceType};

/// Read resources of Azure Resource Manager.
#[derive(Debug, clap::Args)]
pub struct Arm {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// GET a path or URL, following pagination of listings.
    Get {
        /// Path relative to the ARM endpoint, including its api-version.
        path: String,
    },
    /// List the resource groups of a subscription.
    ResourceGroups {
        /// Subscription ID.
        subscription: String,
    },
    /// List resources of a subscription or resource group.
    Resources {
        /// ARM ID of the subscription or resource group.
        scope: ResourceIdentifier,
        /// ARM type of listed resources, such as
        /// "Microsoft.OperationalInsights/workspaces". May be repeated.
        #[clap(long = "type", value_parser = ResourceType::from_arm_type)]
        types: Vec<ResourceType>,
    },
    /// Print the telemetry ID of an Application Insights application
    /// or Log Analytics workspace.
    TelemetryId {
        /// ARM ID of the resource.
        resource: ResourceIdentifier,
    },
}

impl Arm {
    pub async fn run(&self, ctx: &CliContext, cancel: &CancellationToken) -> anyhow::Result<()> {
        let client = ctx.factory.resource_manager_client();

        match &self.cmd {
            Command::Get { path } => {
                let items = client.execute_query(path, cancel).await?;
                ctx.output.print(&items, |items| {
                    let mut table = output::new_table(vec!["id", "name", "type"]);
                    for item in items {
                        table.add_row(vec![
                            output::json_cell(item, "/id"),
                            output::json_cell(item, "/name"),
                            output::json_cell(item, "/type"),
                        ]);
                    }
                    table
                })
            }
            Command::ResourceGroups { subscription } => {
                let groups = client.list_resource_groups(subscription, cancel).await?;
                print_resources(ctx, &groups)
            }
            Command::Resources { scope, types } => {
                let resources = client.list_resources(scope, types, cancel).await?;
                print_resources(ctx, &resources)
            }
            Command::TelemetryId { resource } => {
                let db_type = match resource.resource_type() {
                    ResourceType::ApplicationInsights => {
                        detector_models::TelemetryDbType::ApplicationInsights
                    }
                    ResourceType::LogAnalytics => detector_models::TelemetryDbType::LogAnalytics,
                    other => anyhow::bail!("{resource} is a {other:?}, not a telemetry resource"),
                };
                let id = client.telemetry_id(db_type, resource, cancel).await?;
                println!("{id}");
                Ok(())
            }
        }
    }
}

fn print_resources(ctx: &CliContext, resources: &[ResourceIdentifier]) -> anyhow::Result<()> {
    ctx.output.print(resources, |resources| {
        let mut table = output::new_table(vec!["Name", "Type", "Resource Group"]);
        for resource in resources {
            table.add_row(vec![
                resource
                    .resource_name()
                    .or(resource.resource_group_name())
                    .unwrap_or(resource.subscription_id())
                    .to_string(),
                resource.resource_type().arm_type().unwrap_or("").to_string(),
                resource.resource_group_name().unwrap_or("").to_string(),
            ]);
        }
        table
    })
}
