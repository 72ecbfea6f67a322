//! Shell hook variant: an executable file driven through the hook
//! process contract.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::BindingContext;
use super::BindingType;
use super::Hook;
use super::HookConfig;
use super::HookExecutor;
use super::HookRunResult;
use super::executor::safe_name;
use crate::BINDING_CONTEXT_PATH_ENV;
use crate::CONFIG_VALUES_PATH_ENV;
use crate::HookError;
use crate::Result;
use crate::VALUES_JSON_PATCH_PATH_ENV;
use crate::VALUES_PATH_ENV;
use crate::utils::file_io::is_file_executable;
use crate::values::Values;
use crate::values::ValuesPatch;

pub struct ScriptHook {
    /// Hook name: the path relative to its hooks directory.
    name: String,
    path: PathBuf,
    config: HookConfig,
    executor: HookExecutor,
}

impl ScriptHook {
    /// Registers a hook file: probes its configuration with `--config`.
    pub async fn load(
        path: PathBuf,
        name: String,
        executor: HookExecutor,
    ) -> Result<Self> {
        let config_json = executor.probe_config(&path, &name).await?;
        let config: HookConfig = serde_json::from_str(&config_json).map_err(|e| HookError::BadConfig {
            hook: name.clone(),
            reason: e.to_string(),
        })?;

        debug!(hook = %name, ?config, "hook registered");

        Ok(Self {
            name,
            path,
            config,
            executor,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Hook for ScriptHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &HookConfig {
        &self.config
    }

    async fn run(
        &self,
        binding: BindingType,
        contexts: &[BindingContext],
        config_values: &Values,
        values: &Values,
    ) -> Result<HookRunResult> {
        let safe = safe_name(&self.name);

        let config_values_path = self.executor.prepare_json_tempfile(&safe, "hook-config-values", config_values)?;
        let values_path = self.executor.prepare_json_tempfile(&safe, "hook-values", values)?;
        let context_json =
            serde_json::to_vec(contexts).map_err(|e| crate::ValuesError::Json(e))?;
        let context_path = self.executor.prepare_data_tempfile(&safe, "binding-context", &context_json)?;
        let patch_path = self.executor.prepare_result_tempfile(&safe, "values-json-patch")?;

        let tmp_files = vec![
            config_values_path.clone(),
            values_path.clone(),
            context_path.clone(),
            patch_path.clone(),
        ];

        let envs = vec![
            (
                CONFIG_VALUES_PATH_ENV.to_string(),
                config_values_path.display().to_string(),
            ),
            (VALUES_PATH_ENV.to_string(), values_path.display().to_string()),
            (
                BINDING_CONTEXT_PATH_ENV.to_string(),
                context_path.display().to_string(),
            ),
            (
                VALUES_JSON_PATCH_PATH_ENV.to_string(),
                patch_path.display().to_string(),
            ),
        ];

        debug!(hook = %self.name, binding = binding.context_name(), "run hook");

        let run_result = self.executor.run_and_log_lines(&self.path, &envs, &self.name).await;

        let result = match run_result {
            Ok(()) => read_patch_file(&patch_path).map(|values_patch| HookRunResult { values_patch }),
            Err(e) => Err(e),
        };

        // tempfiles go away on every exit path
        self.executor.cleanup(&tmp_files);

        result
    }
}

fn read_patch_file(path: &Path) -> Result<Option<ValuesPatch>> {
    let data = fs::read(path).map_err(|e| crate::SystemError::Path {
        path: path.to_path_buf(),
        source: e,
    })?;
    ValuesPatch::from_bytes(&data).map_err(Into::into)
}

/// Walks a hooks directory recursively and returns executable files
/// sorted by path, which is the registration order. Non-executable
/// files are ignored (helper libraries live next to hooks).
pub fn search_hook_files(hooks_dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut found: Vec<PathBuf> = Vec::new();
    if !hooks_dir.exists() {
        return Ok(Vec::new());
    }

    collect_hook_files(hooks_dir, &mut found)?;
    found.sort();

    Ok(found
        .into_iter()
        .map(|path| {
            let name = path
                .strip_prefix(hooks_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            (path, name)
        })
        .collect())
}

fn collect_hook_files(
    dir: &Path,
    found: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| crate::SystemError::Path {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| crate::SystemError::Path {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_hook_files(&path, found)?;
        } else if is_file_executable(&path) {
            found.push(path);
        } else {
            debug!(path = %path.display(), "skip non-executable file in hooks dir");
        }
    }

    Ok(())
}
