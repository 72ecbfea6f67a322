//! Background resource drift monitors.
//!
//! One monitor per active module checks every tick that the manifests
//! of the last release are still present in the cluster, and reports
//! the absent ones on a channel the dispatcher consumes.

mod manager;

pub use manager::ResourcesMonitorManager;


use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::Result;
use crate::helm::Manifest;
use crate::kube::KubeClient;

/// Emitted once per tick when some monitored manifests are gone.
#[derive(Clone, Debug)]
pub struct AbsentResourcesEvent {
    pub module_name: String,
    pub absent: Vec<Manifest>,
    pub default_namespace: String,
}

/// Checks which manifests have no live object behind them: a manifest
/// is absent iff listing its resource by `metadata.name` returns
/// nothing.
pub async fn absent_resources(
    kube: &dyn KubeClient,
    manifests: &[Manifest],
    default_namespace: &str,
) -> Result<Vec<Manifest>> {
    let mut res = Vec::new();

    for manifest in manifests {
        let api_resource = kube.api_resource(&manifest.api_version, &manifest.kind).await?;

        let namespace = api_resource.namespaced.then(|| manifest.namespace_or(default_namespace));
        let count = kube
            .count_objects_by_name(&api_resource, namespace, &manifest.name)
            .await?;

        if count == 0 {
            res.push(manifest.clone());
        }
    }

    Ok(res)
}

/// Per-module monitor state owned by the manager.
pub(crate) struct ResourcesMonitor {
    pub(crate) manifests: Vec<Manifest>,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ResourcesMonitor {
    pub(crate) fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub(crate) fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Spawns the monitor loop and returns its handle.
#[allow(clippy::too_many_arguments)]
pub(crate) fn start_resources_monitor(
    kube: Arc<dyn KubeClient>,
    module_name: String,
    manifests: Vec<Manifest>,
    default_namespace: String,
    tick: Duration,
    events_tx: mpsc::Sender<AbsentResourcesEvent>,
    shutdown: watch::Receiver<()>,
) -> ResourcesMonitor {
    let paused = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();

    let monitor = ResourcesMonitor {
        manifests: manifests.clone(),
        paused: paused.clone(),
        cancel: cancel.clone(),
    };

    tokio::spawn(run_monitor_loop(
        kube,
        module_name,
        manifests,
        default_namespace,
        tick,
        paused,
        cancel,
        events_tx,
        shutdown,
    ));

    monitor
}

#[allow(clippy::too_many_arguments)]
async fn run_monitor_loop(
    kube: Arc<dyn KubeClient>,
    module_name: String,
    manifests: Vec<Manifest>,
    default_namespace: String,
    tick: Duration,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<AbsentResourcesEvent>,
    mut shutdown: watch::Receiver<()>,
) {
    info!(module = %module_name, "resources monitor started");

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first interval tick fires immediately, the check starts one
    // tick later
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(module = %module_name, "resources monitor stopped");
                return;
            }

            _ = shutdown.changed() => {
                info!(module = %module_name, "resources monitor shutdown");
                return;
            }

            _ = ticker.tick() => {
                if paused.load(Ordering::SeqCst) {
                    continue;
                }

                match absent_resources(kube.as_ref(), &manifests, &default_namespace).await {
                    Ok(absent) => {
                        if absent.is_empty() {
                            trace!(module = %module_name, "no absent resources detected");
                            continue;
                        }

                        debug!(module = %module_name, count = absent.len(), "absent resources detected");
                        let event = AbsentResourcesEvent {
                            module_name: module_name.clone(),
                            absent,
                            default_namespace: default_namespace.clone(),
                        };
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!(module = %module_name, "cannot list helm resources: {}", e);
                    }
                }
            }
        }
    }
}
