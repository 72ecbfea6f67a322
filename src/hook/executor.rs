//! Child-process execution for hooks and enabled scripts.
//!
//! Hooks are invoked with an empty argv and environment variables
//! pointing at per-invocation tempfiles. Stdout and stderr are streamed
//! line by line into the logger while the process runs.

use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tracing::debug;
use tracing::error;
use tracing::info;
use uuid::Uuid;

use crate::HookError;
use crate::Result;
use crate::config::OperatorConfig;
use crate::utils::file_io;
use crate::values::Values;

#[derive(Clone, Debug)]
pub struct HookExecutor {
    temp_dir: PathBuf,
    keep_tmp_files: bool,
}

impl HookExecutor {
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            temp_dir: config.dirs.temp_dir.clone(),
            keep_tmp_files: config.debug.keep_tmp_files,
        }
    }

    /// Runs an executable with an empty argv and extra environment,
    /// streaming output lines into the logger.
    pub async fn run_and_log_lines(
        &self,
        path: &Path,
        envs: &[(String, String)],
        log_name: &str,
    ) -> Result<()> {
        self.run_internal(path, &[], envs, log_name).await
    }

    /// Probes a hook for its configuration by running it with
    /// `--config` and capturing stdout.
    pub async fn probe_config(
        &self,
        path: &Path,
        log_name: &str,
    ) -> Result<String> {
        debug!(hook = log_name, "probe hook config");

        let output = Command::new(path)
            .arg("--config")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HookError::Spawn {
                path: path.to_path_buf(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(HookError::BadConfig {
                hook: log_name.to_string(),
                reason: format!(
                    "--config probe failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_internal(
        &self,
        path: &Path,
        args: &[&str],
        envs: &[(String, String)],
        log_name: &str,
    ) -> Result<()> {
        let mut cmd = Command::new(path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| HookError::Spawn {
            path: path.to_path_buf(),
            source: e,
        })?;

        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");

        let out_name = log_name.to_string();
        let out_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(hook = %out_name, "{}", line);
            }
        });

        let err_name = log_name.to_string();
        let err_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                error!(hook = %err_name, "{}", line);
            }
        });

        let status = child.wait().await.map_err(|e| HookError::Spawn {
            path: path.to_path_buf(),
            source: e,
        })?;
        let _ = tokio::join!(out_task, err_task);

        if !status.success() {
            return Err(match status.code() {
                Some(code) => HookError::NonZeroExit {
                    hook: log_name.to_string(),
                    code,
                },
                None => HookError::Terminated {
                    hook: log_name.to_string(),
                },
            }
            .into());
        }

        Ok(())
    }

    /// Writes a values tree into a uniquely named JSON tempfile.
    pub fn prepare_json_tempfile(
        &self,
        safe_name: &str,
        kind: &str,
        values: &Values,
    ) -> Result<PathBuf> {
        let path = self.tempfile_path(safe_name, kind, "json");
        file_io::dump_data(&path, &values.json_bytes().map_err(crate::Error::from)?)?;
        Ok(path)
    }

    /// Writes a values tree into a uniquely named YAML tempfile, the
    /// format Helm consumes.
    pub fn prepare_yaml_tempfile(
        &self,
        safe_name: &str,
        kind: &str,
        values: &Values,
    ) -> Result<PathBuf> {
        let path = self.tempfile_path(safe_name, kind, "yaml");
        file_io::dump_data(&path, values.yaml_string().map_err(crate::Error::from)?.as_bytes())?;
        Ok(path)
    }

    /// Writes arbitrary bytes into a uniquely named tempfile.
    pub fn prepare_data_tempfile(
        &self,
        safe_name: &str,
        kind: &str,
        data: &[u8],
    ) -> Result<PathBuf> {
        let path = self.tempfile_path(safe_name, kind, "json");
        file_io::dump_data(&path, data)?;
        Ok(path)
    }

    /// Creates an empty writable tempfile a process reports back into.
    pub fn prepare_result_tempfile(
        &self,
        safe_name: &str,
        kind: &str,
    ) -> Result<PathBuf> {
        let path = self.tempfile_path(safe_name, kind, "out");
        file_io::create_empty_writable_file(&path)?;
        Ok(path)
    }

    /// Removes invocation tempfiles unless the debug flag keeps them.
    pub fn cleanup(
        &self,
        paths: &[PathBuf],
    ) {
        if self.keep_tmp_files {
            debug!(?paths, "keeping hook tmp files");
            return;
        }
        for path in paths {
            file_io::remove_file_logged(path);
        }
    }

    fn tempfile_path(
        &self,
        safe_name: &str,
        kind: &str,
        ext: &str,
    ) -> PathBuf {
        self.temp_dir
            .join(format!("{safe_name}.{kind}-{}.{ext}", Uuid::new_v4()))
    }
}

/// Replaces path separators and shell-unfriendly characters so a hook
/// path can be used in tempfile names.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
