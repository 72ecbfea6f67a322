//! Stub collaborators and fixture helpers for integration scenarios.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use module_engine::HelmError;
use module_engine::Result;
use module_engine::config::OperatorConfig;
use module_engine::helm::HelmClient;
use module_engine::kube::ApiResource;
use module_engine::kube::KubeClient;
use module_engine::utils::checksum::calculate_checksum;
use module_engine::values::Values;
use parking_lot::Mutex;
use tokio::time::sleep;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct StubRelease {
    pub status: String,
    pub values: Values,
}

/// In-memory Helm keeping releases and recording calls.
pub struct StubHelmClient {
    pub releases: Mutex<HashMap<String, StubRelease>>,
    pub calls: Mutex<Vec<String>>,
}

impl StubHelmClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            releases: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn upgrade_count(
        &self,
        release_name: &str,
    ) -> usize {
        let marker = format!("upgrade:{release_name}");
        self.calls.lock().iter().filter(|c| **c == marker).count()
    }
}

#[async_trait]
impl HelmClient for StubHelmClient {
    async fn is_release_exists(
        &self,
        release_name: &str,
    ) -> Result<bool> {
        Ok(self.releases.lock().contains_key(release_name))
    }

    async fn last_release_status(
        &self,
        release_name: &str,
    ) -> Result<(String, String)> {
        let releases = self.releases.lock();
        let release = releases.get(release_name).ok_or_else(|| HelmError::Release {
            release: release_name.to_string(),
            reason: "empty history".to_string(),
        })?;
        Ok(("1".to_string(), release.status.clone()))
    }

    async fn get_release_values(
        &self,
        release_name: &str,
    ) -> Result<Values> {
        let releases = self.releases.lock();
        let release = releases.get(release_name).ok_or_else(|| HelmError::Release {
            release: release_name.to_string(),
            reason: "release not found".to_string(),
        })?;
        Ok(release.values.clone())
    }

    async fn list_releases(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.releases.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn render(
        &self,
        chart_path: &Path,
        values_paths: &[PathBuf],
        _set_values: &[String],
        _namespace: &str,
    ) -> Result<String> {
        let module_dir = chart_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let module_name = module_dir.split_once('-').map(|(_, m)| m).unwrap_or(&module_dir);

        let mut values_content = String::new();
        for path in values_paths {
            values_content.push_str(&fs::read_to_string(path).map_err(|e| {
                HelmError::Command(format!("read values file '{}': {e}", path.display()))
            })?);
        }

        Ok(format!(
            "# values hash: {}\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}-config\n",
            calculate_checksum(&values_content),
            module_name
        ))
    }

    async fn upgrade_release(
        &self,
        release_name: &str,
        _chart_path: &Path,
        _values_paths: &[PathBuf],
        set_values: &[String],
        _namespace: &str,
    ) -> Result<()> {
        self.calls.lock().push(format!("upgrade:{release_name}"));

        let mut map = serde_json::Map::new();
        for set in set_values {
            if let Some((key, value)) = set.split_once('=') {
                map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
        self.releases.lock().insert(
            release_name.to_string(),
            StubRelease {
                status: "DEPLOYED".to_string(),
                values: Values::from_json_value(serde_json::Value::Object(map)).expect("object input"),
            },
        );
        Ok(())
    }

    async fn delete_release(
        &self,
        release_name: &str,
    ) -> Result<()> {
        self.calls.lock().push(format!("delete:{release_name}"));
        self.releases.lock().remove(release_name);
        Ok(())
    }

    async fn delete_single_failed_revision(
        &self,
        _release_name: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// In-memory cluster: names of objects that exist.
pub struct StubKubeClient {
    pub present: Mutex<HashSet<String>>,
}

impl StubKubeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            present: Mutex::new(HashSet::new()),
        })
    }

    pub fn put_object(
        &self,
        name: &str,
    ) {
        self.present.lock().insert(name.to_string());
    }

    pub fn delete_object(
        &self,
        name: &str,
    ) {
        self.present.lock().remove(name);
    }
}

#[async_trait]
impl KubeClient for StubKubeClient {
    async fn api_resource(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ApiResource> {
        Ok(ApiResource {
            group: String::new(),
            version: api_version.to_string(),
            resource: format!("{}s", kind.to_lowercase()),
            namespaced: true,
        })
    }

    async fn count_objects_by_name<'a>(
        &self,
        _resource: &ApiResource,
        _namespace: Option<&'a str>,
        name: &str,
    ) -> Result<usize> {
        Ok(usize::from(self.present.lock().contains(name)))
    }
}

/// Config rooted in a fixture tree, with a fast monitor tick.
pub fn fixture_config(root: &Path) -> OperatorConfig {
    let mut config = OperatorConfig::default();
    config.dirs.modules_dir = root.join("modules");
    config.dirs.global_hooks_dir = root.join("global-hooks");
    config.dirs.temp_dir = root.join("tmp");
    config.dirs.log_dir = root.join("logs");
    config.monitor.tick_seconds = 1;
    config.queue.delay_on_failed_task_ms = 100;
    config.monitoring.metrics_enable = false;

    fs::create_dir_all(root.join("modules")).unwrap();
    fs::create_dir_all(root.join("global-hooks")).unwrap();
    config
}

pub fn write_executable(
    path: &Path,
    body: &str,
) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

pub fn write_module_chart(
    root: &Path,
    dir_name: &str,
) -> PathBuf {
    let dir = root.join("modules").join(dir_name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Chart.yaml"), "name: fixture\nversion: 0.1.0\n").unwrap();
    dir
}

/// A hook body answering the `--config` probe and appending a line to
/// a marker file on each run.
pub fn marker_hook_body(
    config_json: &str,
    marker_path: &Path,
) -> String {
    format!(
        r#"if [ "$1" = "--config" ]; then
  echo '{config_json}'
  exit 0
fi
echo ran >> "{}""#,
        marker_path.display()
    )
}

pub fn marker_lines(marker_path: &Path) -> usize {
    fs::read_to_string(marker_path).map(|s| s.lines().count()).unwrap_or(0)
}

/// Polls a condition until it holds or the deadline passes.
pub async fn wait_for<F>(
    what: &str,
    cond: F,
) where
    F: Fn() -> bool,
{
    timeout(Duration::from_secs(20), async {
        while !cond() {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
