use anyhow::Context;
use detector_clients::{
    AnalysisServicesFactory, CancellationToken, ClientConfig, StaticTokenProvider,
};
use std::path::PathBuf;
use std::sync::Arc;

mod arm;
mod config;
pub mod logging;
mod metrics;
mod output;
mod query;

/// A command-line tool for querying the services which Smart Detectors analyze:
/// Log Analytics, Application Insights, Azure Monitor metrics and Azure Resource Manager.
#[derive(Debug, clap::Parser)]
#[clap(author, about, version)]
pub struct Cli {
    /// Path to a YAML or JSON file of client configuration.
    /// Defaults are used if unset.
    #[clap(long, env = "DETECTOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Bearer token presented to every service.
    #[clap(long, env = "DETECTOR_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    #[clap(subcommand)]
    cmd: Command,

    #[clap(flatten)]
    log: logging::LogArgs,

    #[clap(flatten)]
    output: output::Output,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Run a query over the telemetry of target resources.
    Query(query::Query),
    /// Print the telemetry resources which service queries of target resources.
    RunInfo(query::RunInfo),
    /// Read resources of Azure Resource Manager.
    Arm(arm::Arm),
    /// Read Azure Monitor metrics of a resource.
    Metrics(metrics::Metrics),
    /// Print the effective client configuration.
    Config,
}

pub struct CliContext {
    factory: AnalysisServicesFactory,
    output: output::Output,
}

impl Cli {
    pub fn log_args(&self) -> &logging::LogArgs {
        &self.log
    }

    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let config = config::load(self.config.as_deref())?;

        match &self.cmd {
            Command::Config => output::print_yaml(&[config]),
            Command::Query(query) => query.run(&self.context(config)?, &cancel).await,
            Command::RunInfo(run_info) => run_info.run(&self.context(config)?, &cancel).await,
            Command::Arm(arm) => arm.run(&self.context(config)?, &cancel).await,
            Command::Metrics(metrics) => metrics.run(&self.context(config)?, &cancel).await,
        }
    }

    fn context(&self, config: ClientConfig) -> anyhow::Result<CliContext> {
        let token = self.access_token.clone().context(
            "an access token is required: set --access-token or DETECTOR_ACCESS_TOKEN",
        )?;
        let factory =
            AnalysisServicesFactory::from_config(config, Arc::new(StaticTokenProvider::new(token)))
                .context("building service clients")?;

        Ok(CliContext {
            factory,
            output: self.output.clone(),
        })
    }
}
