use crate::Error;
use regex::Regex;
use std::hash::{Hash, Hasher};

/// The kind of Azure resource a ResourceIdentifier names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Subscription,
    ResourceGroup,
    VirtualMachine,
    VirtualMachineScaleSet,
    ApplicationInsights,
    LogAnalytics,
    AzureStorage,
    CosmosDb,
    KeyVault,
    SqlServer,
    AppServicePlan,
    WebSite,
    KubernetesService,
}

// Resource-level types and their ARM `{namespace}/{type}` names.
const ARM_TYPES: &[(ResourceType, &str)] = &[
    (ResourceType::VirtualMachine, "Microsoft.Compute/virtualMachines"),
    (
        ResourceType::VirtualMachineScaleSet,
        "Microsoft.Compute/virtualMachineScaleSets",
    ),
    (ResourceType::ApplicationInsights, "Microsoft.Insights/components"),
    (ResourceType::LogAnalytics, "Microsoft.OperationalInsights/workspaces"),
    (ResourceType::AzureStorage, "Microsoft.Storage/storageAccounts"),
    (ResourceType::CosmosDb, "Microsoft.DocumentDB/databaseAccounts"),
    (ResourceType::KeyVault, "Microsoft.KeyVault/vaults"),
    (ResourceType::SqlServer, "Microsoft.Sql/servers"),
    (ResourceType::AppServicePlan, "Microsoft.Web/serverFarms"),
    (ResourceType::WebSite, "Microsoft.Web/sites"),
    (
        ResourceType::KubernetesService,
        "Microsoft.ContainerService/managedClusters",
    ),
];

impl ResourceType {
    /// ARM `{namespace}/{type}` of a resource-level type, or None for
    /// subscriptions and resource groups.
    pub fn arm_type(&self) -> Option<&'static str> {
        ARM_TYPES
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, arm)| *arm)
    }

    /// Map an ARM `{namespace}/{type}` (matched case-insensitively) to its ResourceType.
    pub fn from_arm_type(arm_type: &str) -> Result<Self, Error> {
        ARM_TYPES
            .iter()
            .find(|(_, arm)| arm.eq_ignore_ascii_case(arm_type))
            .map(|(t, _)| *t)
            .ok_or_else(|| Error::UnsupportedResourceType(arm_type.to_string()))
    }

    /// Resource provider namespace of the type, e.g. `Microsoft.Compute`.
    pub fn provider_namespace(&self) -> Option<&'static str> {
        self.arm_type().and_then(|t| t.split_once('/')).map(|(ns, _)| ns)
    }

    /// Type name within the provider namespace, e.g. `virtualMachines`.
    pub fn type_name(&self) -> Option<&'static str> {
        self.arm_type().and_then(|t| t.split_once('/')).map(|(_, name)| name)
    }
}

lazy_static::lazy_static! {
    static ref RESOURCE_ID_RE: Regex = Regex::new(
        r"(?i)^/subscriptions/([^/]+)(?:/resourceGroups/([^/]+)(?:/providers/([^/]+/[^/]+)/([^/]+))?)?/?$"
    ).unwrap();
}

/// ResourceIdentifier names an Azure subscription, resource group, or resource.
///
/// Which of the group and resource names are present is fixed by the
/// identifier's ResourceType, and is checked on construction.
/// Comparison and hashing are case-insensitive, as they are in ARM.
#[derive(Clone, Debug)]
pub struct ResourceIdentifier {
    resource_type: ResourceType,
    subscription_id: String,
    resource_group_name: Option<String>,
    resource_name: Option<String>,
}

impl ResourceIdentifier {
    pub fn new(
        resource_type: ResourceType,
        subscription_id: impl Into<String>,
        resource_group_name: Option<String>,
        resource_name: Option<String>,
    ) -> Result<Self, Error> {
        let subscription_id = subscription_id.into();

        let invalid = |reason| Error::InvalidResourceParts {
            resource_type,
            reason,
        };
        if subscription_id.is_empty() {
            return Err(invalid("requires a subscription id"));
        }
        if matches!(&resource_group_name, Some(g) if g.is_empty())
            || matches!(&resource_name, Some(n) if n.is_empty())
        {
            return Err(invalid("has an empty name part"));
        }

        match (resource_type, &resource_group_name, &resource_name) {
            (ResourceType::Subscription, None, None) => (),
            (ResourceType::Subscription, _, _) => {
                return Err(invalid("must not have a resource group or resource name"))
            }
            (ResourceType::ResourceGroup, Some(_), None) => (),
            (ResourceType::ResourceGroup, None, _) => {
                return Err(invalid("requires a resource group name"))
            }
            (ResourceType::ResourceGroup, Some(_), Some(_)) => {
                return Err(invalid("must not have a resource name"))
            }
            (_, Some(_), Some(_)) => (),
            (_, _, _) => return Err(invalid("requires a resource group and resource name")),
        }

        Ok(Self {
            resource_type,
            subscription_id,
            resource_group_name,
            resource_name,
        })
    }

    pub fn subscription(subscription_id: impl Into<String>) -> Result<Self, Error> {
        Self::new(ResourceType::Subscription, subscription_id, None, None)
    }

    pub fn resource_group(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::new(
            ResourceType::ResourceGroup,
            subscription_id,
            Some(resource_group_name.into()),
            None,
        )
    }

    pub fn resource(
        resource_type: ResourceType,
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::new(
            resource_type,
            subscription_id,
            Some(resource_group_name.into()),
            Some(resource_name.into()),
        )
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
    pub fn resource_group_name(&self) -> Option<&str> {
        self.resource_group_name.as_deref()
    }
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// Identifier of the subscription containing this resource.
    pub fn to_subscription(&self) -> Self {
        Self {
            resource_type: ResourceType::Subscription,
            subscription_id: self.subscription_id.clone(),
            resource_group_name: None,
            resource_name: None,
        }
    }

    /// Identifier of the resource group containing this resource,
    /// or None if this is a subscription.
    pub fn to_resource_group(&self) -> Option<Self> {
        let group = self.resource_group_name.clone()?;
        Some(Self {
            resource_type: ResourceType::ResourceGroup,
            subscription_id: self.subscription_id.clone(),
            resource_group_name: Some(group),
            resource_name: None,
        })
    }

    fn lowered(&self) -> (String, Option<String>, Option<String>) {
        (
            self.subscription_id.to_ascii_lowercase(),
            self.resource_group_name
                .as_ref()
                .map(|s| s.to_ascii_lowercase()),
            self.resource_name.as_ref().map(|s| s.to_ascii_lowercase()),
        )
    }
}

impl std::str::FromStr for ResourceIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(caps) = RESOURCE_ID_RE.captures(s) else {
            return Err(Error::InvalidResourceId(s.to_string()));
        };
        let subscription = caps[1].to_string();
        let group = caps.get(2).map(|m| m.as_str().to_string());

        match (group, caps.get(3), caps.get(4)) {
            (None, _, _) => Self::subscription(subscription),
            (Some(group), None, _) => Self::resource_group(subscription, group),
            (Some(group), Some(arm_type), Some(name)) => Self::resource(
                ResourceType::from_arm_type(arm_type.as_str())?,
                subscription,
                group,
                name.as_str(),
            ),
            (Some(_), Some(_), None) => Err(Error::InvalidResourceId(s.to_string())),
        }
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;

        if let Some(group) = &self.resource_group_name {
            write!(f, "/resourceGroups/{group}")?;
        }
        if let (Some(arm_type), Some(name)) = (self.resource_type.arm_type(), &self.resource_name)
        {
            write!(f, "/providers/{arm_type}/{name}")?;
        }
        Ok(())
    }
}

impl PartialEq for ResourceIdentifier {
    fn eq(&self, other: &Self) -> bool {
        fn eq_opt(l: &Option<String>, r: &Option<String>) -> bool {
            match (l, r) {
                (Some(l), Some(r)) => l.eq_ignore_ascii_case(r),
                (None, None) => true,
                _ => false,
            }
        }
        self.resource_type == other.resource_type
            && self.subscription_id.eq_ignore_ascii_case(&other.subscription_id)
            && eq_opt(&self.resource_group_name, &other.resource_group_name)
            && eq_opt(&self.resource_name, &other.resource_name)
    }
}

impl Eq for ResourceIdentifier {}

impl Hash for ResourceIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_type.hash(state);
        self.lowered().hash(state);
    }
}

impl serde::Serialize for ResourceIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
