use crate::Error;

/// Audience is the service an access token is issued for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Audience {
    ResourceManager,
    LogAnalytics,
    ApplicationInsights,
}

impl Audience {
    /// OAuth resource URI of the audience.
    pub fn resource_uri(&self) -> &'static str {
        match self {
            Audience::ResourceManager => "https://management.azure.com/",
            Audience::LogAnalytics => "https://api.loganalytics.io/",
            Audience::ApplicationInsights => "https://api.applicationinsights.io/",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.resource_uri())
    }
}

/// TokenProvider hands out bearer tokens of the running identity.
/// Implementations are expected to cache and refresh tokens as needed.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, audience: Audience) -> Result<String, Error>;
}

/// A TokenProvider of fixed tokens, for all audiences or per audience.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    default: Option<String>,
    overrides: Vec<(Audience, String)>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            default: Some(token.into()),
            overrides: Vec::new(),
        }
    }

    pub fn with_audience(mut self, audience: Audience, token: impl Into<String>) -> Self {
        self.overrides.push((audience, token.into()));
        self
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, audience: Audience) -> Result<String, Error> {
        self.overrides
            .iter()
            .find(|(a, _)| *a == audience)
            .map(|(_, token)| token)
            .or(self.default.as_ref())
            .cloned()
            .ok_or(Error::Credentials {
                audience,
                detail: "no token is configured".to_string(),
            })
    }
}
