use anyhow::Context;
use detector_clients::ClientConfig;
use std::path::Path;

/// Load client configuration from a YAML or JSON file, or use the default
/// configuration if no file is given.
pub fn load(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    let Some(path) = path else {
        tracing::debug!("no config file was given; using defaults");
        return Ok(ClientConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

    parse(&contents, is_json).with_context(|| format!("invalid config file {}", path.display()))
}

fn parse(contents: &str, is_json: bool) -> anyhow::Result<ClientConfig> {
    let config: ClientConfig = if is_json {
        serde_json::from_str(contents)?
    } else {
        serde_yaml::from_str(contents)?
    };
    config.validate()?;

    Ok(config)
}
