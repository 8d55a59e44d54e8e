use crate::{
    credentials::Audience, http::HttpClient, pagination::PageRequest, retry::RetryPolicy,
    CancellationToken, Error, Request, TokenProvider,
};
use detector_models::{ResourceIdentifier, ResourceType, TelemetryDbType};
use futures::TryStreamExt;
use page_turner::PageTurner;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// API version of the ARM resources and providers endpoints.
const RESOURCES_API_VERSION: &str = "2019-05-01";

/// ApiVersionCache maps resource types (`{namespace}/{type}`, lowercase)
/// to the API version used to read them. It's shared by every clone of a
/// ResourceManagerClient and may be read and filled concurrently.
#[derive(Debug, Default)]
pub struct ApiVersionCache(RwLock<HashMap<String, String>>);

impl ApiVersionCache {
    pub fn get(&self, arm_type: &str) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&arm_type.to_ascii_lowercase())
            .cloned()
    }

    pub fn insert(&self, arm_type: &str, api_version: String) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(arm_type.to_ascii_lowercase(), api_version);
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ResourceManagerClient reads resource metadata from Azure Resource Manager.
#[derive(Clone)]
pub struct ResourceManagerClient {
    http: HttpClient,
    credentials: Arc<dyn TokenProvider>,
    endpoint: url::Url,
    retry: Arc<RetryPolicy>,
    api_versions: Arc<ApiVersionCache>,
}

impl ResourceManagerClient {
    pub fn new(
        http: HttpClient,
        credentials: Arc<dyn TokenProvider>,
        endpoint: url::Url,
        retry: Arc<RetryPolicy>,
        api_versions: Arc<ApiVersionCache>,
    ) -> Self {
        Self {
            http,
            credentials,
            endpoint,
            retry,
            api_versions,
        }
    }

    /// Clone this client, making its calls through another RetryPolicy.
    pub fn with_retry_policy(&self, retry: Arc<RetryPolicy>) -> Self {
        Self {
            retry,
            ..self.clone()
        }
    }

    pub fn api_versions(&self) -> &ApiVersionCache {
        &self.api_versions
    }

    /// Resolve a path relative to the ARM endpoint, or an absolute URL.
    pub fn resolve_url(&self, path_or_url: &str) -> Result<url::Url, Error> {
        self.endpoint
            .join(path_or_url)
            .map_err(|err| Error::InvalidUrl(path_or_url.to_string(), err))
    }

    /// Execute a GET of `path_or_url` and follow its `nextLink` pagination,
    /// returning the items of every page. A response which isn't a
    /// `value` listing contributes its whole body as one item.
    #[tracing::instrument(skip(self, cancel), err)]
    pub async fn execute_query(
        &self,
        path_or_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<serde_json::Value>, Error> {
        let url = self.resolve_url(path_or_url)?;

        let items = self
            .clone()
            .into_pages(PageRequest {
                url,
                cancel: cancel.clone(),
            })
            .items()
            .try_collect::<Vec<_>>();

        tokio::select! {
            biased;

            () = cancel.cancelled() => Err(Error::Cancelled),
            items = items => items,
        }
    }

    /// GET a single JSON document through the retry policy.
    pub(crate) async fn get_json(
        &self,
        url: url::Url,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, Error> {
        let command = format!("GET {}", url.path());

        self.retry
            .execute(&command, cancel, || async {
                let token = self.credentials.token(Audience::ResourceManager).await?;
                let request = Request::get(url.clone()).bearer_auth(&token);
                self.http.send_checked(request, cancel).await?.json(&command)
            })
            .await
    }

    /// Resolve the API version to use when reading resources of `resource_type`.
    /// Versions of every type of the provider namespace are cached on first use.
    pub async fn provider_api_version(
        &self,
        subscription_id: &str,
        resource_type: ResourceType,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let (Some(arm_type), Some(namespace)) =
            (resource_type.arm_type(), resource_type.provider_namespace())
        else {
            return Ok(RESOURCES_API_VERSION.to_string());
        };
        if let Some(version) = self.api_versions.get(arm_type) {
            return Ok(version);
        }

        let mut url = self.resolve_url(&format!(
            "/subscriptions/{subscription_id}/providers/{namespace}"
        ))?;
        url.query_pairs_mut()
            .append_pair("api-version", RESOURCES_API_VERSION);

        let provider: wire::Provider =
            serde_json::from_value(self.get_json(url, cancel).await?).map_err(|source| {
                Error::Parse {
                    context: format!("provider {namespace}"),
                    source,
                }
            })?;

        for wire::ProviderResourceType {
            resource_type: type_name,
            api_versions,
        } in provider.resource_types
        {
            // Versions are listed newest first. Prefer stable versions.
            let version = api_versions
                .iter()
                .find(|v| !v.ends_with("-preview"))
                .or(api_versions.first());

            if let Some(version) = version {
                self.api_versions
                    .insert(&format!("{namespace}/{type_name}"), version.clone());
            }
        }

        self.api_versions.get(arm_type).ok_or_else(|| Error::Malformed {
            context: format!("provider {namespace}"),
            detail: format!("no API version is listed for {arm_type}"),
        })
    }

    /// Fetch the `properties` of a resource.
    /// A resource which doesn't exist fails with Error::NotFound.
    #[tracing::instrument(skip(self, cancel), fields(%resource), err)]
    pub async fn resource_properties(
        &self,
        resource: &ResourceIdentifier,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, Error> {
        let api_version = self
            .provider_api_version(resource.subscription_id(), resource.resource_type(), cancel)
            .await?;

        let mut url = self.resolve_url(&resource.to_string())?;
        url.query_pairs_mut().append_pair("api-version", &api_version);

        match self.get_json(url, cancel).await {
            Ok(mut body) => Ok(body
                .get_mut("properties")
                .map(serde_json::Value::take)
                .unwrap_or_default()),
            Err(err) if err.is_not_found() => Err(Error::NotFound(resource.to_string())),
            Err(err) => Err(err),
        }
    }

    /// Resolve the telemetry ID of a Log Analytics workspace (its customer ID)
    /// or of an Application Insights application (its application ID).
    pub async fn telemetry_id(
        &self,
        db_type: TelemetryDbType,
        resource: &ResourceIdentifier,
        cancel: &CancellationToken,
    ) -> Result<String, Error> {
        let (expected, property) = match db_type {
            TelemetryDbType::LogAnalytics => (ResourceType::LogAnalytics, "customerId"),
            TelemetryDbType::ApplicationInsights => (ResourceType::ApplicationInsights, "AppId"),
        };
        if resource.resource_type() != expected {
            return Err(Error::UnexpectedResourceType {
                resource: resource.to_string(),
                expected,
            });
        }

        let properties = self.resource_properties(resource, cancel).await?;

        properties
            .get(property)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Malformed {
                context: resource.to_string(),
                detail: format!("properties have no {property}"),
            })
    }

    /// List the resource groups of a subscription.
    pub async fn list_resource_groups(
        &self,
        subscription_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, Error> {
        let path = format!(
            "/subscriptions/{subscription_id}/resourcegroups?api-version={RESOURCES_API_VERSION}"
        );
        let items = self.execute_query(&path, cancel).await?;

        items
            .iter()
            .map(|item| parse_item_id(item, &path))
            .collect()
    }

    /// List resources of the given `types` within a subscription or resource group.
    /// Listed resources of types which aren't modeled are skipped.
    pub async fn list_resources(
        &self,
        scope: &ResourceIdentifier,
        types: &[ResourceType],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, Error> {
        if !matches!(
            scope.resource_type(),
            ResourceType::Subscription | ResourceType::ResourceGroup
        ) {
            return Err(Error::UnexpectedResourceType {
                resource: scope.to_string(),
                expected: ResourceType::ResourceGroup,
            });
        }

        let mut url = self.resolve_url(&format!("{scope}/resources"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", RESOURCES_API_VERSION);

            let filter = types
                .iter()
                .filter_map(ResourceType::arm_type)
                .map(|arm_type| format!("resourceType eq '{arm_type}'"))
                .collect::<Vec<_>>()
                .join(" or ");
            if !filter.is_empty() {
                query.append_pair("$filter", &filter);
            }
        }
        let items = self.execute_query(url.as_str(), cancel).await?;

        let mut resources = Vec::with_capacity(items.len());
        for item in &items {
            match parse_item_id(item, url.path()) {
                Ok(resource) if types.is_empty() || types.contains(&resource.resource_type()) => {
                    resources.push(resource)
                }
                Ok(_) => (),
                Err(Error::Model(detector_models::Error::UnsupportedResourceType(arm_type))) => {
                    tracing::debug!(%arm_type, "skipping listed resource of unmodeled type");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(resources)
    }
}

fn parse_item_id(item: &serde_json::Value, context: &str) -> Result<ResourceIdentifier, Error> {
    let Some(id) = item.get("id").and_then(serde_json::Value::as_str) else {
        return Err(Error::Malformed {
            context: context.to_string(),
            detail: "listed item has no id".to_string(),
        });
    };
    Ok(id.parse()?)
}

mod wire {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Provider {
        #[serde(default)]
        pub resource_types: Vec<ProviderResourceType>,
    }

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProviderResourceType {
        pub resource_type: String,
        #[serde(default)]
        pub api_versions: Vec<String>,
    }
}
