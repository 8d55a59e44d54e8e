use anyhow::Context;
use clap::Parser;
use detector_clients::CancellationToken;

fn main() -> Result<(), anyhow::Error> {
    let cli = detectorctl::Cli::parse();
    detectorctl::logging::init_logging(cli.log_args());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
        .context("failed to start runtime")?;

    // Cancel in-flight requests and backoffs on CTRL-C.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling");
            on_signal.cancel();
        }
    });

    let handle = runtime.spawn(async move { cli.run(cancel).await });
    let result = runtime.block_on(handle);

    // An incomplete spawned future could otherwise block shutdown indefinitely.
    runtime.shutdown_background();

    result?
}
