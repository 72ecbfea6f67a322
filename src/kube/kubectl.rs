use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::process::Command;
use tracing::debug;

use super::ApiResource;
use super::KubeClient;
use crate::KubeError;
use crate::Result;

/// Kubernetes client backed by the `kubectl` binary with the standard
/// cluster credentials from the environment. Resource discovery results
/// are cached for the process lifetime; CRDs created later are found on
/// the retry that follows a cache miss.
pub struct KubectlClient {
    api_resources: RwLock<HashMap<(String, String), ApiResource>>,
}

impl KubectlClient {
    pub fn new() -> Self {
        Self {
            api_resources: RwLock::new(HashMap::new()),
        }
    }

    async fn run(args: &[&str]) -> Result<String> {
        debug!(?args, "run kubectl");

        let output = Command::new("kubectl")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| KubeError::Command(format!("spawn kubectl: {e}")))?;

        if !output.status.success() {
            return Err(KubeError::Command(format!(
                "kubectl {}: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn discover_api_resources(&self) -> Result<()> {
        let out = Self::run(&["api-resources", "--no-headers", "-o", "wide"]).await?;

        let mut cache = self.api_resources.write();
        for line in out.lines() {
            // NAME SHORTNAMES APIVERSION NAMESPACED KIND VERBS ...
            // SHORTNAMES may be missing, parse from the right-stable side
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }
            let (resource, api_version, namespaced, kind) = match fields.len() {
                4 => (fields[0], fields[1], fields[2], fields[3]),
                _ => {
                    // with shortnames the kind sits after NAMESPACED
                    let namespaced_idx = fields.iter().position(|f| *f == "true" || *f == "false");
                    match namespaced_idx {
                        Some(i) if i >= 1 && i + 1 < fields.len() => {
                            (fields[0], fields[i - 1], fields[i], fields[i + 1])
                        }
                        _ => continue,
                    }
                }
            };

            let (group, version) = match api_version.split_once('/') {
                Some((g, v)) => (g.to_string(), v.to_string()),
                None => (String::new(), api_version.to_string()),
            };

            cache.insert(
                (api_version.to_string(), kind.to_string()),
                ApiResource {
                    group,
                    version,
                    resource: resource.to_string(),
                    namespaced: namespaced == "true",
                },
            );
        }

        Ok(())
    }
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KubeClient for KubectlClient {
    async fn api_resource(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ApiResource> {
        let key = (api_version.to_string(), kind.to_string());

        if let Some(res) = self.api_resources.read().get(&key) {
            return Ok(res.clone());
        }

        self.discover_api_resources().await?;

        self.api_resources.read().get(&key).cloned().ok_or_else(|| {
            KubeError::ApiResource {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
                reason: "no such resource registered in the cluster".to_string(),
            }
            .into()
        })
    }

    async fn count_objects_by_name<'a>(
        &self,
        resource: &ApiResource,
        namespace: Option<&'a str>,
        name: &str,
    ) -> Result<usize> {
        let qualified = resource.qualified_resource();
        let selector = format!("metadata.name={name}");
        let mut args = vec![
            "get",
            &qualified,
            "--field-selector",
            &selector,
            "-o",
            "name",
            "--ignore-not-found",
        ];
        if let Some(ns) = namespace {
            args.push("--namespace");
            args.push(ns);
        }

        let out = Self::run(&args).await.map_err(|e| KubeError::List {
            resource: qualified.clone(),
            reason: e.to_string(),
        })?;

        Ok(out.lines().filter(|l| !l.is_empty()).count())
    }
}
