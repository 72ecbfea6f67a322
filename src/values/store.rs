//! Layered values store.
//!
//! Layers, later wins: static defaults (shared, then per module), the
//! configuration store, dynamic patches accumulated from hooks, and the
//! synthetic `global.enabledModules` list.

use std::collections::HashMap;

use serde_json::json;

use super::Values;
use super::ValuesPatch;
use super::compact_values_patches;
use super::merge_all;
use super::merge_values;
use crate::ENABLED_MODULES_KEY;
use crate::GLOBAL_VALUES_KEY;
use crate::ValuesError;
use crate::utils::keys::module_enabled_key;
use crate::utils::keys::module_name_to_values_key;

#[derive(Debug, Default)]
pub struct ValuesStore {
    /// Whole `<modulesDir>/values.yaml` tree: global section, module
    /// sections and `*Enabled` keys.
    common_static: Values,

    /// Per module bundle from `<module>/values.yaml`, filtered to the
    /// module's own section and enabled key.
    module_static: HashMap<String, Values>,

    /// `{global: ...}` tree from the configuration store.
    config_global: Values,

    /// Per module `{<modKey>: ..., <modKey>Enabled: ...}` trees from the
    /// configuration store.
    config_modules: HashMap<String, Values>,

    /// Compacted in-memory patches from global hooks.
    global_patches: Vec<ValuesPatch>,

    /// Compacted in-memory patches from module hooks, per module.
    module_patches: HashMap<String, Vec<ValuesPatch>>,

    /// Enabled modules in registration order, set after each discovery.
    enabled_modules: Vec<String>,
}

impl ValuesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_common_static(
        &mut self,
        values: Values,
    ) {
        self.common_static = values;
    }

    /// Registers the static values of one module. The raw tree is
    /// filtered down to the module's own section and enabled key.
    pub fn register_module_static(
        &mut self,
        module_name: &str,
        raw: Values,
    ) {
        let key = module_name_to_values_key(module_name);
        let enabled_key = module_enabled_key(module_name);
        let bundle = raw.filter_keys(|k| k == key || k == enabled_key);
        self.module_static.insert(module_name.to_string(), bundle);
    }

    /// Replaces the global section received from the configuration
    /// store; `values` is the `{global: ...}` tree.
    pub fn set_config_global(
        &mut self,
        values: Values,
    ) {
        self.config_global = values;
    }

    pub fn set_config_module(
        &mut self,
        module_name: &str,
        values: Values,
    ) {
        self.config_modules.insert(module_name.to_string(), values);
    }

    pub fn append_global_patch(
        &mut self,
        patch: ValuesPatch,
    ) {
        self.global_patches = compact_values_patches(&self.global_patches, patch);
    }

    pub fn append_module_patch(
        &mut self,
        module_name: &str,
        patch: ValuesPatch,
    ) {
        let patches = self.module_patches.entry(module_name.to_string()).or_default();
        *patches = compact_values_patches(patches, patch);
    }

    pub fn set_enabled_modules(
        &mut self,
        modules: Vec<String>,
    ) {
        self.enabled_modules = modules;
    }

    pub fn enabled_modules(&self) -> &[String] {
        &self.enabled_modules
    }

    /// Configuration-store view for one module: global and module
    /// sections only, no static defaults and no dynamic patches.
    pub fn config_values(
        &self,
        module_name: &str,
    ) -> Values {
        let key = module_name_to_values_key(module_name);
        merge_all([
            Values::empty_section(GLOBAL_VALUES_KEY),
            self.config_global.clone(),
            Values::empty_section(&key),
            self.config_modules.get(module_name).cloned().unwrap_or_default(),
        ])
    }

    /// Configuration-store view for global hooks.
    pub fn global_config_values(&self) -> Values {
        merge_values(Values::empty_section(GLOBAL_VALUES_KEY), self.config_global.clone())
    }

    /// Effective global values for global hooks, with the enabled
    /// modules list appended.
    pub fn global_values(&self) -> Result<Values, ValuesError> {
        let mut res = merge_all([
            Values::empty_section(GLOBAL_VALUES_KEY),
            self.common_static.global(),
            self.config_global.clone(),
        ]);

        for patch in &self.global_patches {
            let (next, _) = patch.apply(&res)?;
            res = next;
        }

        Ok(self.append_enabled_modules(res, &self.enabled_modules))
    }

    /// Effective values for one module's hooks and Helm release.
    pub fn module_values(
        &self,
        module_name: &str,
    ) -> Result<Values, ValuesError> {
        let res = self.construct_values(module_name)?;
        Ok(self.append_enabled_modules(res, &self.enabled_modules))
    }

    /// Effective values passed to an `enabled` script: the
    /// `enabledModules` list holds only the modules already decided
    /// enabled, in order.
    pub fn values_for_enabled_script(
        &self,
        module_name: &str,
        preceding_enabled: &[String],
    ) -> Result<Values, ValuesError> {
        let res = self.construct_values(module_name)?;
        Ok(self.append_enabled_modules(res, preceding_enabled))
    }

    /// Explicit `<modKey>Enabled` flag in the merged values, if any.
    pub fn module_enabled_flag(
        &self,
        module_name: &str,
    ) -> Result<Option<bool>, ValuesError> {
        let merged = self.construct_values(module_name)?;
        Ok(merged.get(&module_enabled_key(module_name)).and_then(|v| v.as_bool()))
    }

    fn construct_values(
        &self,
        module_name: &str,
    ) -> Result<Values, ValuesError> {
        let key = module_name_to_values_key(module_name);
        let enabled_key = module_enabled_key(module_name);

        let mut res = merge_all([
            Values::empty_section(GLOBAL_VALUES_KEY),
            self.common_static.global(),
            self.config_global.clone(),
            Values::empty_section(&key),
            self.common_static.filter_keys(|k| k == key || k == enabled_key),
            self.module_static.get(module_name).cloned().unwrap_or_default(),
            self.config_modules.get(module_name).cloned().unwrap_or_default(),
        ]);

        let module_patches = self.module_patches.get(module_name).into_iter().flatten();
        for patch in self.global_patches.iter().chain(module_patches) {
            // Patches that do not apply are rejected when appended, so a
            // failure here means the stored sequence is out of sync.
            let (next, _) = patch.apply(&res)?;
            res = next;
        }

        Ok(res)
    }

    fn append_enabled_modules(
        &self,
        values: Values,
        enabled: &[String],
    ) -> Values {
        merge_values(
            values,
            Values::wrap_section(GLOBAL_VALUES_KEY, json!({ ENABLED_MODULES_KEY: enabled })),
        )
    }
}
