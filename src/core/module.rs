use std::path::Path;
use std::path::PathBuf;

use crate::CHART_FILE_NAME;
use crate::ENABLED_SCRIPT_NAME;
use crate::HOOKS_DIR_NAME;
use crate::helm::Manifest;
use crate::hook::safe_name;
use crate::utils::keys::module_name_to_values_key;

/// One deployable unit: a named directory with an optional chart,
/// hooks, static values and an enabled script. Mutated only by the
/// main queue consumer that owns the module's lifecycle tasks.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
    /// Manifests installed by the last successful release, recorded
    /// after each render.
    pub last_release_manifests: Vec<Manifest>,
}

impl Module {
    pub fn new(
        name: &str,
        path: PathBuf,
    ) -> Self {
        Self {
            name: name.to_string(),
            path,
            last_release_manifests: Vec::new(),
        }
    }

    /// Values section key: kebab-case name turned lowerCamel.
    pub fn values_key(&self) -> String {
        module_name_to_values_key(&self.name)
    }

    /// Name usable in tempfile names.
    pub fn safe_name(&self) -> String {
        safe_name(&self.name)
    }

    /// The release name is the module name, untransformed.
    pub fn release_name(&self) -> &str {
        &self.name
    }

    pub fn chart_path(&self) -> PathBuf {
        self.path.join(CHART_FILE_NAME)
    }

    pub fn has_chart(&self) -> bool {
        self.chart_path().exists()
    }

    pub fn enabled_script_path(&self) -> PathBuf {
        self.path.join(ENABLED_SCRIPT_NAME)
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.path.join(HOOKS_DIR_NAME)
    }

    pub fn dir(&self) -> &Path {
        &self.path
    }
}
