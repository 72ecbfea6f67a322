use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;

use super::AbsentResourcesEvent;
use super::ResourcesMonitor;
use super::absent_resources;
use super::start_resources_monitor;
use crate::Result;
use crate::config::MonitorConfig;
use crate::helm::Manifest;
use crate::kube::KubeClient;

const ABSENT_EVENTS_BUFFER: usize = 16;

/// Owns one monitor per active module and the channel their absent
/// resource events arrive on.
pub struct ResourcesMonitorManager {
    kube: Arc<dyn KubeClient>,
    monitors: DashMap<String, ResourcesMonitor>,
    tick: Duration,
    default_namespace: String,
    events_tx: mpsc::Sender<AbsentResourcesEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<AbsentResourcesEvent>>>,
    shutdown: watch::Receiver<()>,
}

impl ResourcesMonitorManager {
    pub fn new(
        kube: Arc<dyn KubeClient>,
        config: &MonitorConfig,
        default_namespace: &str,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(ABSENT_EVENTS_BUFFER);

        Self {
            kube,
            monitors: DashMap::new(),
            tick: Duration::from_secs(config.tick_seconds),
            default_namespace: default_namespace.to_string(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown,
        }
    }

    /// The single consumer side of the absent resources channel. Taken
    /// once by the operator event loop.
    pub fn take_events_rx(&self) -> mpsc::Receiver<AbsentResourcesEvent> {
        self.events_rx.lock().take().expect("events receiver already taken")
    }

    /// Starts watching a manifest set for a module, replacing any
    /// previous monitor.
    pub fn start_monitor(
        &self,
        module_name: &str,
        manifests: Vec<Manifest>,
    ) {
        self.stop_monitor(module_name);

        debug!(module = module_name, manifests = manifests.len(), "start resources monitor");
        let monitor = start_resources_monitor(
            self.kube.clone(),
            module_name.to_string(),
            manifests,
            self.default_namespace.clone(),
            self.tick,
            self.events_tx.clone(),
            self.shutdown.clone(),
        );
        self.monitors.insert(module_name.to_string(), monitor);
    }

    pub fn stop_monitor(
        &self,
        module_name: &str,
    ) {
        if let Some((_, monitor)) = self.monitors.remove(module_name) {
            monitor.stop();
        }
    }

    /// Stops every monitor; used before a reload-all so hooks and
    /// discovery do not race the drift detection.
    pub fn stop_monitors(&self) {
        let names: Vec<String> = self.monitors.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.stop_monitor(&name);
        }
    }

    /// Suspends absence checks without cancelling the loop.
    pub fn pause_monitor(
        &self,
        module_name: &str,
    ) {
        if let Some(monitor) = self.monitors.get(module_name) {
            monitor.pause();
        }
    }

    pub fn resume_monitor(
        &self,
        module_name: &str,
    ) {
        if let Some(monitor) = self.monitors.get(module_name) {
            monitor.resume();
        }
    }

    pub fn has_monitor(
        &self,
        module_name: &str,
    ) -> bool {
        self.monitors.contains_key(module_name)
    }

    /// One-shot presence query used by the upgrade decision.
    pub async fn absent_resources(
        &self,
        manifests: &[Manifest],
    ) -> Result<Vec<Manifest>> {
        absent_resources(self.kube.as_ref(), manifests, &self.default_namespace).await
    }

    /// Monitored manifest ids per module, for the debug dump.
    pub fn monitored_ids(&self) -> HashMap<String, Vec<String>> {
        self.monitors
            .iter()
            .map(|entry| {
                let ids = entry.value().manifests.iter().map(Manifest::id).collect();
                (entry.key().clone(), ids)
            })
            .collect()
    }
}
