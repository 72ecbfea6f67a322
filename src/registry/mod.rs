//! On-disk module discovery.
//!
//! A module is a directory named `NNN-<name>` under the modules
//! directory. The three digit prefix gives the load order; the rest is
//! the module name. Directories with any other name are a registration
//! error, not a skip.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::CHART_FILE_NAME;
use crate::RegistryError;
use crate::Result;
use crate::VALUES_FILE_NAME;
use crate::values::Values;


/// A module directory found on disk, before values loading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredModule {
    /// Kebab-cased name extracted from the directory name.
    pub name: String,
    /// Full path of the module directory.
    pub path: PathBuf,
}

impl DiscoveredModule {
    pub fn chart_path(&self) -> PathBuf {
        self.path.join(CHART_FILE_NAME)
    }

    pub fn has_chart(&self) -> bool {
        self.chart_path().exists()
    }
}

/// Lists module directories in load order (lexicographic directory
/// name). Fails when any subdirectory does not match `NNN-<name>`.
pub fn search_modules(modules_dir: &Path) -> Result<Vec<DiscoveredModule>> {
    let entries = fs::read_dir(modules_dir).map_err(|e| RegistryError::ListDir {
        path: modules_dir.to_path_buf(),
        source: e,
    })?;

    let mut dir_names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RegistryError::ListDir {
            path: modules_dir.to_path_buf(),
            source: e,
        })?;
        let file_type = entry.file_type().map_err(|e| RegistryError::ListDir {
            path: modules_dir.to_path_buf(),
            source: e,
        })?;
        if !file_type.is_dir() {
            continue;
        }
        dir_names.push(entry.file_name().to_string_lossy().into_owned());
    }
    dir_names.sort();

    let mut modules = Vec::new();
    let mut bad_dirs = Vec::new();

    for dir_name in dir_names {
        match parse_module_dir_name(&dir_name) {
            Some(name) => modules.push(DiscoveredModule {
                name: name.to_string(),
                path: modules_dir.join(&dir_name),
            }),
            None => bad_dirs.push(modules_dir.join(&dir_name).display().to_string()),
        }
    }

    if !bad_dirs.is_empty() {
        return Err(RegistryError::InvalidModuleDirs(bad_dirs.join(", ")).into());
    }

    debug!("Found {} modules", modules.len());
    Ok(modules)
}

/// `NNN-<name>`; the name may be empty.
fn parse_module_dir_name(dir_name: &str) -> Option<&str> {
    let (prefix, rest) = dir_name.split_at_checked(3)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.strip_prefix('-')
}

/// Loads `<modulesDir>/values.yaml` with shared static defaults. A
/// missing file means no shared defaults.
pub fn load_common_static_values(modules_dir: &Path) -> Result<Values> {
    let values_path = modules_dir.join(VALUES_FILE_NAME);
    if !values_path.exists() {
        debug!("No common static values file: {}", values_path.display());
        return Ok(Values::new());
    }

    let data = fs::read_to_string(&values_path).map_err(|e| RegistryError::ListDir {
        path: values_path.clone(),
        source: e,
    })?;

    Values::from_yaml(&data).map_err(|e| {
        RegistryError::CommonStaticValues {
            path: values_path,
            source: Box::new(e),
        }
        .into()
    })
}

/// Loads `<module>/values.yaml`. A missing file means the module exists
/// but carries no static values (statically disabled unless something
/// else toggles it). A file that does not parse is fatal.
pub fn load_module_static_values(module: &DiscoveredModule) -> Result<Values> {
    let values_path = module.path.join(VALUES_FILE_NAME);
    if !values_path.exists() {
        debug!(module = %module.name, "no values.yaml, module has no static values");
        return Ok(Values::new());
    }

    let data = fs::read_to_string(&values_path).map_err(|e| RegistryError::ListDir {
        path: values_path.clone(),
        source: e,
    })?;

    Values::from_yaml(&data).map_err(|e| {
        RegistryError::StaticValues {
            module: module.name.clone(),
            source: Box::new(e),
        }
        .into()
    })
}
