use std::path::Path;
use std::sync::Arc;

use module_engine::Result;
use module_engine::config::OperatorConfig;
use module_engine::core::Operator;
use module_engine::helm::HelmCli;
use module_engine::kube::KubectlClient;
use module_engine::metrics;
use module_engine::utils::file_io::open_file_for_append;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = OperatorConfig::new()?;

    // Initializing Logs
    let _guard = init_observability(&settings.dirs.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Build Operator
    let helm = Arc::new(HelmCli::new(&settings.helm));
    let kube = Arc::new(KubectlClient::new());
    let operator = Arc::new(Operator::new(
        Arc::new(settings.clone()),
        helm,
        kube,
        graceful_rx.clone(),
    ));

    if let Err(e) = operator.init().await {
        error!("INIT ModuleManager failed: {}", e);
        return Err(e);
    }

    if settings.monitoring.metrics_enable {
        tokio::spawn(metrics::start_server(
            settings.monitoring.metrics_port,
            operator.module_manager(),
            operator.monitors(),
            graceful_rx.clone(),
        ));
    }

    // Start queue consumers, monitors and the event loop.
    operator.start();

    info!("Operator started. Waiting for termination signal...");
    wait_for_termination().await;

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        module_engine::Error::Fatal(format!("Failed to send shutdown signal: {e}"))
    })?;

    info!("Shutdown completed");
    Ok(())
}

async fn wait_for_termination() {
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }
}

fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(&log_dir.join("operator.log"))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(guard)
}
