use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;
use tracing::info;

use super::HelmClient;
use super::RELEASE_STATUS_FAILED;
use crate::HelmError;
use crate::Result;
use crate::config::HelmConfig;
use crate::values::Values;

/// Helm client backed by the `helm` binary, the same way hooks and the
/// enabled script are driven as child processes.
pub struct HelmCli {
    namespace: String,
    history_max: u32,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    revision: u64,
    status: String,
}

impl HelmCli {
    pub fn new(config: &HelmConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            history_max: config.history_max,
        }
    }

    async fn run(
        &self,
        args: &[&str],
    ) -> Result<String> {
        debug!(?args, "run helm");

        let output = Command::new("helm")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HelmError::Command(format!("spawn helm: {e}")))?;

        if !output.status.success() {
            return Err(HelmError::Command(format!(
                "helm {}: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn history(
        &self,
        release_name: &str,
    ) -> Result<Vec<HistoryEntry>> {
        let out = self
            .run(&["history", release_name, "--namespace", &self.namespace, "-o", "json"])
            .await?;
        serde_json::from_str(&out).map_err(|e| HelmError::Command(format!("parse helm history: {e}")).into())
    }
}

#[async_trait]
impl HelmClient for HelmCli {
    async fn is_release_exists(
        &self,
        release_name: &str,
    ) -> Result<bool> {
        let releases = self.list_releases().await?;
        Ok(releases.iter().any(|r| r == release_name))
    }

    async fn last_release_status(
        &self,
        release_name: &str,
    ) -> Result<(String, String)> {
        let history = self.history(release_name).await?;
        let last = history.last().ok_or_else(|| HelmError::Release {
            release: release_name.to_string(),
            reason: "empty history".to_string(),
        })?;
        Ok((last.revision.to_string(), last.status.to_uppercase()))
    }

    async fn get_release_values(
        &self,
        release_name: &str,
    ) -> Result<Values> {
        let out = self
            .run(&[
                "get",
                "values",
                release_name,
                "--namespace",
                &self.namespace,
                "-o",
                "json",
            ])
            .await?;
        // `helm get values` prints "null" for a release without values
        Values::from_json(&out).map_err(Into::into)
    }

    async fn list_releases(&self) -> Result<Vec<String>> {
        let out = self
            .run(&["list", "-q", "--all", "--namespace", &self.namespace])
            .await?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    async fn render(
        &self,
        chart_path: &Path,
        values_paths: &[PathBuf],
        set_values: &[String],
        namespace: &str,
    ) -> Result<String> {
        let chart = chart_path.display().to_string();
        let mut args: Vec<&str> = vec!["template", &chart, "--namespace", namespace];

        let value_args: Vec<String> = values_paths.iter().map(|p| p.display().to_string()).collect();
        for path in &value_args {
            args.push("--values");
            args.push(path);
        }
        for set in set_values {
            args.push("--set");
            args.push(set);
        }

        self.run(&args).await
    }

    async fn upgrade_release(
        &self,
        release_name: &str,
        chart_path: &Path,
        values_paths: &[PathBuf],
        set_values: &[String],
        namespace: &str,
    ) -> Result<()> {
        let chart = chart_path.display().to_string();
        let history_max = self.history_max.to_string();
        let mut args: Vec<&str> = vec![
            "upgrade",
            "--install",
            release_name,
            &chart,
            "--namespace",
            namespace,
            "--history-max",
            &history_max,
        ];

        let value_args: Vec<String> = values_paths.iter().map(|p| p.display().to_string()).collect();
        for path in &value_args {
            args.push("--values");
            args.push(path);
        }
        for set in set_values {
            args.push("--set");
            args.push(set);
        }

        let out = self.run(&args).await?;
        info!(release = release_name, "helm upgrade output: {}", out.trim());
        Ok(())
    }

    async fn delete_release(
        &self,
        release_name: &str,
    ) -> Result<()> {
        self.run(&["uninstall", release_name, "--namespace", &self.namespace])
            .await?;
        info!(release = release_name, "helm release deleted");
        Ok(())
    }

    async fn delete_single_failed_revision(
        &self,
        release_name: &str,
    ) -> Result<()> {
        let history = match self.history(release_name).await {
            Ok(history) => history,
            // no release, nothing to clean up
            Err(_) => return Ok(()),
        };

        if history.len() == 1 && history[0].status.to_uppercase() == RELEASE_STATUS_FAILED {
            info!(
                release = release_name,
                "deleting single FAILED revision before install"
            );
            self.delete_release(release_name).await?;
        }
        Ok(())
    }
}
