use crate::{arm::ResourceManagerClient, CancellationToken, Error};
use detector_models::{QueryRunInfo, ResourceIdentifier, ResourceType, TelemetryDbType};

/// QueryRunInfoProvider decides which telemetry backend and resources
/// service the queries of an analysis of the given target resources.
#[derive(Clone)]
pub struct QueryRunInfoProvider {
    arm: ResourceManagerClient,
    max_resources: usize,
}

impl QueryRunInfoProvider {
    pub fn new(arm: ResourceManagerClient, max_resources: usize) -> Self {
        Self { arm, max_resources }
    }

    /// Targets which are all Application Insights applications, or all Log
    /// Analytics workspaces, are queried directly. Other targets are queried
    /// through every workspace of their subscriptions.
    #[tracing::instrument(skip_all, fields(targets = targets.len()), err)]
    pub async fn query_run_info(
        &self,
        targets: &[ResourceIdentifier],
        cancel: &CancellationToken,
    ) -> Result<QueryRunInfo, Error> {
        if targets.is_empty() {
            return Err(Error::NoResources);
        }

        let is_app = |r: &ResourceIdentifier| r.resource_type() == ResourceType::ApplicationInsights;
        let is_workspace = |r: &ResourceIdentifier| r.resource_type() == ResourceType::LogAnalytics;

        let apps = targets.iter().filter(|r| is_app(r)).count();
        let workspaces = targets.iter().filter(|r| is_workspace(r)).count();

        let run_info = if apps == targets.len() {
            QueryRunInfo {
                db_type: TelemetryDbType::ApplicationInsights,
                resource_ids: targets.to_vec(),
            }
        } else if workspaces == targets.len() {
            QueryRunInfo {
                db_type: TelemetryDbType::LogAnalytics,
                resource_ids: targets.to_vec(),
            }
        } else if apps != 0 || workspaces != 0 {
            let listed = targets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::MixedTelemetryResources(listed));
        } else {
            QueryRunInfo {
                db_type: TelemetryDbType::LogAnalytics,
                resource_ids: self.subscription_workspaces(targets, cancel).await?,
            }
        };

        if run_info.resource_ids.len() > self.max_resources {
            return Err(Error::TooManyResources {
                requested: run_info.resource_ids.len(),
                max: self.max_resources,
            });
        }
        tracing::debug!(db_type = %run_info.db_type, resources = run_info.resource_ids.len(), "resolved query run info");

        Ok(run_info)
    }

    async fn subscription_workspaces(
        &self,
        targets: &[ResourceIdentifier],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, Error> {
        let mut subscriptions: Vec<ResourceIdentifier> = Vec::new();
        for target in targets {
            let subscription = target.to_subscription();
            if !subscriptions.contains(&subscription) {
                subscriptions.push(subscription);
            }
        }

        let mut workspaces = Vec::new();
        for subscription in &subscriptions {
            workspaces.extend(
                self.arm
                    .list_resources(subscription, &[ResourceType::LogAnalytics], cancel)
                    .await?,
            );
        }

        if workspaces.is_empty() {
            return Err(Error::NoWorkspacesFound);
        }
        Ok(workspaces)
    }
}
