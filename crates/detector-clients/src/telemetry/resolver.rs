use crate::{arm::ResourceManagerClient, CancellationToken, Error};
use detector_models::{ResourceIdentifier, TelemetryDbType};

/// TelemetryResourceResolver maps telemetry resources to the IDs their
/// backend queries are addressed by, tolerating resources which were deleted.
#[derive(Clone)]
pub struct TelemetryResourceResolver {
    arm: ResourceManagerClient,
}

impl TelemetryResourceResolver {
    pub fn new(arm: ResourceManagerClient) -> Self {
        Self { arm }
    }

    /// Resolve the telemetry ID of the first resolvable resource of `candidates`.
    ///
    /// Candidates are consumed from the front. A candidate which isn't found
    /// is discarded and the next one is tried, while any other failure is
    /// returned. On success `candidates` holds the resources following the
    /// resolved one. `None` is returned if no candidate resolved.
    pub async fn get_single_telemetry_id(
        &self,
        db_type: TelemetryDbType,
        candidates: &mut Vec<ResourceIdentifier>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, Error> {
        while !candidates.is_empty() {
            let candidate = candidates.remove(0);

            match self.arm.telemetry_id(db_type, &candidate, cancel).await {
                Ok(id) => {
                    tracing::debug!(resource = %candidate, %id, "resolved telemetry resource");
                    return Ok(Some(id));
                }
                Err(err) if err.is_not_found() => {
                    tracing::warn!(resource = %candidate, %db_type, "telemetry resource was not found and is skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Filter `resources` to those which still exist, preserving their order.
    pub async fn filter_existing(
        &self,
        resources: Vec<ResourceIdentifier>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, Error> {
        let mut existing = Vec::with_capacity(resources.len());

        for resource in resources {
            match self.arm.resource_properties(&resource, cancel).await {
                Ok(_) => existing.push(resource),
                Err(err) if err.is_not_found() => {
                    tracing::warn!(%resource, "telemetry resource was not found and is removed from the query");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(existing)
    }
}
