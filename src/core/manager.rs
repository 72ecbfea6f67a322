//! The module manager: owns the module arena, the values store and the
//! hook registries, and drives the per-module lifecycle state machine.
//!
//! Modules never point back at the manager; every operation takes the
//! module name and borrows what it needs from the arena.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Module;
use super::ModulesState;
use crate::CONFIG_VALUES_PATH_ENV;
use crate::GLOBAL_VALUES_KEY;
use crate::HookError;
use crate::MODULE_CHECKSUM_VALUE_KEY;
use crate::MODULE_ENABLED_RESULT_ENV;
use crate::RegistryError;
use crate::Result;
use crate::SystemError;
use crate::VALUES_PATH_ENV;
use crate::config::OperatorConfig;
use crate::helm::HelmClient;
use crate::helm::Manifest;
use crate::helm::RELEASE_STATUS_FAILED;
use crate::helm::manifests_from_yaml_documents;
use crate::hook::BindingContext;
use crate::hook::BindingType;
use crate::hook::Hook;
use crate::hook::HookExecutor;
use crate::hook::ScheduleBinding;
use crate::hook::ScriptHook;
use crate::hook::search_hook_files;
use crate::monitor::ResourcesMonitorManager;
use crate::registry;
use crate::utils::checksum::calculate_checksum;
use crate::utils::file_io::is_file_executable;
use crate::utils::keys::module_name_to_values_key;
use crate::values::Values;
use crate::values::ValuesStore;
use crate::values::validate_hook_values_patch;

pub struct ModuleManager {
    config: Arc<OperatorConfig>,
    helm: Arc<dyn HelmClient>,
    monitors: Arc<ResourcesMonitorManager>,
    executor: HookExecutor,

    store: RwLock<ValuesStore>,
    modules: RwLock<HashMap<String, Module>>,
    module_names_in_order: RwLock<Vec<String>>,

    global_hooks: RwLock<Vec<Arc<ScriptHook>>>,
    /// Module hooks by module name; registered on startup or when a
    /// module becomes newly enabled.
    module_hooks: RwLock<HashMap<String, Vec<Arc<ScriptHook>>>>,
    /// Modules whose schedule and kubernetes bindings are muted. Hooks
    /// stay registered so AfterDeleteHelm can still run for them.
    disabled_bindings: RwLock<HashSet<String>>,
}

impl ModuleManager {
    pub fn new(
        config: Arc<OperatorConfig>,
        helm: Arc<dyn HelmClient>,
        monitors: Arc<ResourcesMonitorManager>,
    ) -> Self {
        let executor = HookExecutor::new(&config);
        Self {
            config,
            helm,
            monitors,
            executor,
            store: RwLock::new(ValuesStore::new()),
            modules: RwLock::new(HashMap::new()),
            module_names_in_order: RwLock::new(Vec::new()),
            global_hooks: RwLock::new(Vec::new()),
            module_hooks: RwLock::new(HashMap::new()),
            disabled_bindings: RwLock::new(HashSet::new()),
        }
    }

    /// Registers modules and global hooks. Any error here is permanent
    /// and prevents startup.
    pub async fn init(&self) -> Result<()> {
        self.register_modules()?;
        self.register_global_hooks().await?;
        Ok(())
    }

    fn register_modules(&self) -> Result<()> {
        debug!("Search and register modules");

        let modules_dir = &self.config.dirs.modules_dir;
        let discovered = registry::search_modules(modules_dir)?;

        let common_static = registry::load_common_static_values(modules_dir)?;
        self.store.write().set_common_static(common_static);

        for found in discovered {
            let static_values = registry::load_module_static_values(&found)?;
            self.store.write().register_module_static(&found.name, static_values);

            self.modules
                .write()
                .insert(found.name.clone(), Module::new(&found.name, found.path.clone()));
            self.module_names_in_order.write().push(found.name.clone());

            info!(module = %found.name, "Module is registered");
        }

        Ok(())
    }

    async fn register_global_hooks(&self) -> Result<()> {
        let hooks_dir = &self.config.dirs.global_hooks_dir;

        for (path, name) in search_hook_files(hooks_dir)? {
            let hook = ScriptHook::load(path, name, self.executor.clone()).await?;
            info!(hook = hook.name(), "Global hook is registered");
            self.global_hooks.write().push(Arc::new(hook));
        }

        Ok(())
    }

    /// Registers a module's hooks once; later calls are no-ops so
    /// OnStartup-time registration survives repeated ModuleRun tasks.
    pub async fn register_module_hooks(
        &self,
        module_name: &str,
    ) -> Result<()> {
        self.disabled_bindings.write().remove(module_name);

        if self.module_hooks.read().contains_key(module_name) {
            return Ok(());
        }

        let module = self.get_module(module_name)?;
        let mut hooks = Vec::new();

        for (path, rel_name) in search_hook_files(&module.hooks_dir())? {
            let name = format!("{module_name}/{rel_name}");
            let hook = ScriptHook::load(path, name, self.executor.clone()).await?;
            info!(hook = hook.name(), "Module hook is registered");
            hooks.push(Arc::new(hook));
        }

        self.module_hooks.write().insert(module_name.to_string(), hooks);
        Ok(())
    }

    /// Mutes a disabled module's schedule and kubernetes bindings so
    /// they stop producing tasks. The hooks stay registered: the
    /// pending ModuleDelete still runs AfterDeleteHelm through them.
    pub fn disable_module_hooks(
        &self,
        module_name: &str,
    ) {
        self.disabled_bindings.write().insert(module_name.to_string());
    }

    pub fn module_bindings_disabled(
        &self,
        module_name: &str,
    ) -> bool {
        self.disabled_bindings.read().contains(module_name)
    }

    // -
    // Accessors

    pub fn module_names_in_order(&self) -> Vec<String> {
        self.module_names_in_order.read().clone()
    }

    pub fn get_module(
        &self,
        module_name: &str,
    ) -> Result<Module> {
        self.modules
            .read()
            .get(module_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownModule(module_name.to_string()).into())
    }

    pub fn has_module(
        &self,
        module_name: &str,
    ) -> bool {
        self.modules.read().contains_key(module_name)
    }

    pub fn last_release_manifests(
        &self,
        module_name: &str,
    ) -> Vec<Manifest> {
        self.modules
            .read()
            .get(module_name)
            .map(|m| m.last_release_manifests.clone())
            .unwrap_or_default()
    }

    /// Global hook names subscribed to a binding, in registration order
    /// refined by the hooks' declared order weight.
    pub fn global_hooks_in_order(
        &self,
        binding: BindingType,
    ) -> Vec<String> {
        let hooks = self.global_hooks.read();
        let mut subscribed: Vec<(f64, String)> = hooks
            .iter()
            .filter_map(|h| h.config().order_for(binding).map(|order| (order, h.name().to_string())))
            .collect();
        subscribed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        subscribed.into_iter().map(|(_, name)| name).collect()
    }

    pub fn get_global_hook(
        &self,
        hook_name: &str,
    ) -> Result<Arc<ScriptHook>> {
        self.global_hooks
            .read()
            .iter()
            .find(|h| h.name() == hook_name)
            .cloned()
            .ok_or_else(|| HookError::UnknownHook(hook_name.to_string()).into())
    }

    pub fn module_hooks_in_order(
        &self,
        module_name: &str,
        binding: BindingType,
    ) -> Vec<Arc<ScriptHook>> {
        let registry = self.module_hooks.read();
        let Some(hooks) = registry.get(module_name) else {
            return Vec::new();
        };

        let mut subscribed: Vec<(f64, Arc<ScriptHook>)> = hooks
            .iter()
            .filter_map(|h| h.config().order_for(binding).map(|order| (order, h.clone())))
            .collect();
        subscribed.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.name().cmp(b.1.name()))
        });
        subscribed.into_iter().map(|(_, hook)| hook).collect()
    }

    /// Queue names declared by global hooks and registered module
    /// hooks; every one needs a running consumer.
    pub fn all_hook_queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for hook in self.global_hooks.read().iter() {
            names.extend(hook.config().queue_names());
        }
        for hooks in self.module_hooks.read().values() {
            for hook in hooks {
                names.extend(hook.config().queue_names());
            }
        }
        names.sort();
        names.dedup();
        names
    }

    /// Global hooks with a schedule binding on this crontab.
    pub fn global_hooks_with_schedule(
        &self,
        crontab: &str,
    ) -> Vec<(String, ScheduleBinding)> {
        let mut res = Vec::new();
        for hook in self.global_hooks.read().iter() {
            for binding in &hook.config().schedule {
                if binding.crontab == crontab {
                    res.push((hook.name().to_string(), binding.clone()));
                }
            }
        }
        res
    }

    /// Registered module hooks with a schedule binding on this
    /// crontab, in module registration order.
    pub fn module_hooks_with_schedule(
        &self,
        crontab: &str,
    ) -> Vec<(String, String, ScheduleBinding)> {
        let mut res = Vec::new();
        let registry = self.module_hooks.read();
        let disabled = self.disabled_bindings.read();

        for module_name in self.module_names_in_order.read().iter() {
            if disabled.contains(module_name) {
                continue;
            }
            let Some(hooks) = registry.get(module_name) else {
                continue;
            };
            for hook in hooks {
                for binding in &hook.config().schedule {
                    if binding.crontab == crontab {
                        res.push((module_name.clone(), hook.name().to_string(), binding.clone()));
                    }
                }
            }
        }
        res
    }

    pub fn get_module_hook(
        &self,
        hook_name: &str,
    ) -> Result<(String, Arc<ScriptHook>)> {
        let module_name = hook_name
            .split_once('/')
            .map(|(module, _)| module.to_string())
            .ok_or_else(|| HookError::UnknownHook(hook_name.to_string()))?;

        let registry = self.module_hooks.read();
        let hook = registry
            .get(&module_name)
            .and_then(|hooks| hooks.iter().find(|h| h.name() == hook_name))
            .cloned()
            .ok_or_else(|| HookError::UnknownHook(hook_name.to_string()))?;

        Ok((module_name, hook))
    }

    // -
    // Values access (debug surface and hooks)

    pub fn global_values(&self) -> Result<Values> {
        self.store.read().global_values().map_err(Into::into)
    }

    pub fn global_config_values(&self) -> Values {
        self.store.read().global_config_values()
    }

    pub fn module_values(
        &self,
        module_name: &str,
    ) -> Result<Values> {
        self.store.read().module_values(module_name).map_err(Into::into)
    }

    pub fn module_config_values(
        &self,
        module_name: &str,
    ) -> Values {
        self.store.read().config_values(module_name)
    }

    pub fn enabled_modules_in_order(&self) -> Vec<String> {
        self.store.read().enabled_modules().to_vec()
    }

    /// Configuration-store watcher seam: replaces the global section.
    pub fn update_config_global(
        &self,
        values: Values,
    ) {
        self.store.write().set_config_global(values);
    }

    /// Configuration-store watcher seam: replaces one module's section.
    pub fn update_config_module(
        &self,
        module_name: &str,
        values: Values,
    ) {
        self.store.write().set_config_module(module_name, values);
    }

    /// Called when discovery hit an ambiguous state and the retry task
    /// fires. State is rebuilt from the store and the cluster on the
    /// next discovery, so there is nothing to roll back here.
    pub fn retry(&self) {
        info!("module manager retry requested, state will be rebuilt by the next discovery");
    }

    // -
    // Hook execution

    /// Runs one global hook and returns the global values checksums
    /// sampled before and after it.
    pub async fn run_global_hook(
        &self,
        hook_name: &str,
        binding: BindingType,
        contexts: &[BindingContext],
    ) -> Result<(String, String)> {
        let hook = self.get_global_hook(hook_name)?;

        let (config_values, values) = {
            let store = self.store.read();
            (store.global_config_values(), store.global_values()?)
        };
        let before_checksum = values.checksum()?;

        let result = hook.run(binding, contexts, &config_values, &values).await?;

        if let Some(patch) = result.values_patch {
            if !patch.is_empty() {
                validate_hook_values_patch(&patch, GLOBAL_VALUES_KEY)?;

                let mut store = self.store.write();
                // reject a patch that cannot apply before storing it
                patch.apply(&store.global_values()?)?;
                store.append_global_patch(patch);
            }
        }

        let after_checksum = self.store.read().global_values()?.checksum()?;
        Ok((before_checksum, after_checksum))
    }

    /// Runs one module hook and applies its values patch to the
    /// module's dynamic patches.
    pub async fn run_module_hook(
        &self,
        hook_name: &str,
        binding: BindingType,
        contexts: &[BindingContext],
    ) -> Result<()> {
        let (module_name, hook) = self.get_module_hook(hook_name)?;
        self.run_module_hook_object(&module_name, &hook, binding, contexts).await
    }

    async fn run_module_hook_object(
        &self,
        module_name: &str,
        hook: &Arc<ScriptHook>,
        binding: BindingType,
        contexts: &[BindingContext],
    ) -> Result<()> {
        let (config_values, values) = {
            let store = self.store.read();
            (store.config_values(module_name), store.module_values(module_name)?)
        };

        let result = hook.run(binding, contexts, &config_values, &values).await?;

        if let Some(patch) = result.values_patch {
            if !patch.is_empty() {
                let values_key = module_name_to_values_key(module_name);
                validate_hook_values_patch(&patch, &values_key)?;

                let mut store = self.store.write();
                patch.apply(&store.module_values(module_name)?)?;
                store.append_module_patch(module_name, patch);
            }
        }

        Ok(())
    }

    /// Runs every module hook bound to a binding, in order. Snapshots
    /// are attached just before each invocation for the Helm bracket
    /// bindings.
    async fn run_hooks_by_binding(
        &self,
        module_name: &str,
        binding: BindingType,
    ) -> Result<()> {
        for hook in self.module_hooks_in_order(module_name, binding) {
            let context = self.binding_context_for(&hook, binding);
            self.run_module_hook_object(module_name, &hook, binding, &[context]).await?;
        }
        Ok(())
    }

    /// Same as [`Self::run_hooks_by_binding`], sampling the module
    /// values checksum around the batch. Returns whether values
    /// changed.
    async fn run_hooks_by_binding_and_check_values(
        &self,
        module_name: &str,
        binding: BindingType,
    ) -> Result<bool> {
        let before_checksum = self.store.read().module_values(module_name)?.checksum()?;

        self.run_hooks_by_binding(module_name, binding).await?;

        let after_checksum = self.store.read().module_values(module_name)?.checksum()?;
        Ok(before_checksum != after_checksum)
    }

    /// Snapshots come from the hook's kubernetes watch controller; the
    /// in-process default has no informers, so the Helm bracket
    /// bindings get an empty snapshot set.
    fn binding_context_for(
        &self,
        _hook: &Arc<ScriptHook>,
        binding: BindingType,
    ) -> BindingContext {
        let context = BindingContext::new(binding);
        if binding.includes_snapshots() {
            context.with_snapshots(json!([]))
        } else {
            context
        }
    }

    /// Synchronization contexts for a module's kubernetes bindings, run
    /// right after OnStartup hooks. Informers would start after these
    /// have executed, so their events always follow the
    /// synchronization runs.
    async fn enable_module_kubernetes_bindings(
        &self,
        module_name: &str,
    ) -> Result<()> {
        let hooks: Vec<Arc<ScriptHook>> = {
            let registry = self.module_hooks.read();
            registry.get(module_name).cloned().unwrap_or_default()
        };

        for hook in hooks {
            let bindings = hook.config().kubernetes.clone();
            for binding in &bindings {
                let context = BindingContext::synchronization(&binding.name);
                info!(hook = hook.name(), "Run module hook with type Synchronization");
                self.run_module_hook_object(
                    module_name,
                    &hook,
                    BindingType::OnKubernetesEvent,
                    &[context],
                )
                .await?;
            }
        }

        Ok(())
    }

    // -
    // Module lifecycle

    /// Runs one module: OnStartup hooks (optionally), BeforeHelm hooks,
    /// the Helm install decision and AfterHelm hooks. Returns whether
    /// AfterHelm hooks changed the module values.
    pub async fn run_module(
        &self,
        module_name: &str,
        on_startup_hooks: bool,
    ) -> Result<bool> {
        let module = self.get_module(module_name)?;
        info!(module = module_name, on_startup_hooks, "Run module");

        // Hooks can delete release resources, the monitor must not race
        // them.
        self.monitors.stop_monitor(module_name);

        self.helm_cleanup(&module).await?;

        if on_startup_hooks {
            self.run_hooks_by_binding(module_name, BindingType::OnStartup).await?;
            self.enable_module_kubernetes_bindings(module_name).await?;
        }

        self.run_hooks_by_binding(module_name, BindingType::BeforeHelm).await?;

        self.run_helm_install(&module).await?;

        self.run_hooks_by_binding_and_check_values(module_name, BindingType::AfterHelm)
            .await
    }

    /// Deletes a module's release (if any) and runs AfterDeleteHelm
    /// hooks regardless.
    pub async fn delete_module(
        &self,
        module_name: &str,
    ) -> Result<()> {
        let module = self.get_module(module_name)?;
        info!(module = module_name, "Delete module");

        self.monitors.stop_monitor(module_name);

        if module.has_chart() {
            let release_name = module.release_name();
            match self.helm.is_release_exists(release_name).await {
                Ok(true) => self.helm.delete_release(release_name).await?,
                Ok(false) => {
                    warn!(
                        "Cannot find helm release '{}' for module '{}'.",
                        release_name, module_name
                    );
                }
                Err(e) => {
                    warn!(
                        "Cannot find helm release '{}' for module '{}'. Helm error: {}",
                        release_name, module_name, e
                    );
                }
            }
        }

        self.run_hooks_by_binding(module_name, BindingType::AfterDeleteHelm).await
    }

    /// Removes a stale failed release so the install decision sees a
    /// clean history. Older failed revisions are pruned by helm itself:
    /// every upgrade carries `--history-max`.
    async fn helm_cleanup(
        &self,
        module: &Module,
    ) -> Result<()> {
        if !module.has_chart() {
            debug!(module = %module.name, "no Chart.yaml, cleanup is not needed");
            return Ok(());
        }

        self.helm.delete_single_failed_revision(module.release_name()).await?;
        Ok(())
    }

    async fn run_helm_install(
        &self,
        module: &Module,
    ) -> Result<()> {
        if !module.has_chart() {
            debug!(module = %module.name, "no Chart.yaml, helm is not needed");
            return Ok(());
        }

        let values = self.store.read().module_values(&module.name)?;
        debug!(module = %module.name, "prepared module values:\n{}", values.debug_string());
        let values_path = self
            .executor
            .prepare_yaml_tempfile(&module.safe_name(), "module-values", &values)?;

        let result = self.helm_install_with_values(module, &values_path).await;
        self.executor.cleanup(std::slice::from_ref(&values_path));
        result
    }

    async fn helm_install_with_values(
        &self,
        module: &Module,
        values_path: &PathBuf,
    ) -> Result<()> {
        let release_name = module.release_name();
        let namespace = &self.config.helm.namespace;
        let values_paths = vec![values_path.clone()];

        // Render first: the checksum of the rendered manifests is the
        // idempotence key that prevents excess helm runs.
        let rendered = self.helm.render(module.dir(), &values_paths, &[], namespace).await?;
        let checksum = calculate_checksum(&rendered);
        let manifests = manifests_from_yaml_documents(&rendered)?;

        if let Some(m) = self.modules.write().get_mut(&module.name) {
            m.last_release_manifests = manifests.clone();
        }

        let run_upgrade = self
            .should_run_helm_upgrade(release_name, &checksum, &manifests)
            .await?;

        if !run_upgrade {
            // The release is unchanged; make sure drift detection keeps
            // running over the recorded manifests.
            if !self.monitors.has_monitor(&module.name) {
                self.monitors.start_monitor(&module.name, manifests);
            }
            return Ok(());
        }

        self.helm
            .upgrade_release(
                release_name,
                module.dir(),
                &values_paths,
                &[format!("{MODULE_CHECKSUM_VALUE_KEY}={checksum}")],
                namespace,
            )
            .await?;

        self.monitors.start_monitor(&module.name, manifests);
        Ok(())
    }

    /// The five-clause upgrade decision: no release, FAILED status, no
    /// stored checksum, changed checksum, or absent resources.
    pub async fn should_run_helm_upgrade(
        &self,
        release_name: &str,
        checksum: &str,
        manifests: &[Manifest],
    ) -> Result<bool> {
        if !self.helm.is_release_exists(release_name).await? {
            debug!("helm release '{}' not exists: upgrade helm release", release_name);
            return Ok(true);
        }

        let (_, status) = self.helm.last_release_status(release_name).await?;
        if status == RELEASE_STATUS_FAILED {
            debug!("helm release '{}' has FAILED status: upgrade helm release", release_name);
            return Ok(true);
        }

        let release_values = self.helm.get_release_values(release_name).await?;
        let Some(recorded_checksum) = release_values.get(MODULE_CHECKSUM_VALUE_KEY) else {
            debug!(
                "helm release '{}' has no saved checksum of values: upgrade helm release",
                release_name
            );
            return Ok(true);
        };

        if let Some(recorded) = recorded_checksum.as_str() {
            if recorded != checksum {
                debug!(
                    "helm release '{}' checksum '{}' is changed to '{}': upgrade helm release",
                    release_name, recorded, checksum
                );
                return Ok(true);
            }
        }

        let absent = self.monitors.absent_resources(manifests).await?;
        if !absent.is_empty() {
            debug!(
                "helm release '{}' has {} absent resources: upgrade helm release",
                release_name,
                absent.len()
            );
            return Ok(true);
        }

        debug!("helm release '{}': skip upgrade helm release", release_name);
        Ok(false)
    }

    // -
    // Discovery

    /// Computes the enabled-modules state: explicit `*Enabled` flags
    /// beat the `enabled` script, a missing script means enabled.
    pub async fn discover_modules_state(&self) -> Result<ModulesState> {
        let module_names = self.module_names_in_order();
        let previously_enabled: Vec<String> = self.enabled_modules_in_order();

        let mut enabled: Vec<String> = Vec::new();
        for module_name in &module_names {
            let flag = self.store.read().module_enabled_flag(module_name)?;
            let is_enabled = match flag {
                Some(explicit) => explicit,
                None => self.check_is_enabled_by_script(module_name, &enabled).await?,
            };
            if is_enabled {
                enabled.push(module_name.clone());
            }
        }

        let releases = self.helm.list_releases().await?;
        let known: HashSet<&String> = module_names.iter().collect();

        let released_unknown_modules: Vec<String> =
            releases.iter().filter(|r| !known.contains(r)).cloned().collect();

        let modules_to_disable: Vec<String> = module_names
            .iter()
            .filter(|name| {
                !enabled.contains(*name)
                    && (previously_enabled.contains(*name) || releases.contains(*name))
            })
            .cloned()
            .collect();

        let newly_enabled_modules: Vec<String> = enabled
            .iter()
            .filter(|name| !previously_enabled.contains(*name))
            .cloned()
            .collect();

        self.store.write().set_enabled_modules(enabled.clone());

        let state = ModulesState {
            enabled_modules: enabled,
            newly_enabled_modules,
            modules_to_disable,
            released_unknown_modules,
        };
        debug!(?state, "modules state discovered");
        Ok(state)
    }

    /// Runs the optional `enabled` script. A missing script means
    /// enabled; a non-executable one is an error; the script must write
    /// exactly `true` or `false` into its result file.
    async fn check_is_enabled_by_script(
        &self,
        module_name: &str,
        preceding_enabled: &[String],
    ) -> Result<bool> {
        let module = self.get_module(module_name)?;
        let script_path = module.enabled_script_path();

        if !script_path.exists() {
            debug!(module = module_name, "module is enabled, no enabled script");
            return Ok(true);
        }
        if !is_file_executable(&script_path) {
            return Err(HookError::NonExecutable(script_path).into());
        }

        let (config_values, values) = {
            let store = self.store.read();
            (
                store.config_values(module_name),
                store.values_for_enabled_script(module_name, preceding_enabled)?,
            )
        };

        let safe = module.safe_name();
        let config_values_path =
            self.executor
                .prepare_json_tempfile(&safe, "module-config-values", &config_values)?;
        let values_path = self.executor.prepare_json_tempfile(&safe, "module-values", &values)?;
        let result_path = self.executor.prepare_result_tempfile(&safe, "module-enabled-result")?;

        let tmp_files = vec![config_values_path.clone(), values_path.clone(), result_path.clone()];

        let envs = vec![
            (
                CONFIG_VALUES_PATH_ENV.to_string(),
                config_values_path.display().to_string(),
            ),
            (VALUES_PATH_ENV.to_string(), values_path.display().to_string()),
            (MODULE_ENABLED_RESULT_ENV.to_string(), result_path.display().to_string()),
        ];

        debug!(
            module = module_name,
            ?preceding_enabled,
            "execute enabled script"
        );

        let run_result = self
            .executor
            .run_and_log_lines(&script_path, &envs, &format!("{module_name}/enabled"))
            .await;

        let result = match run_result {
            Ok(()) => read_enabled_result(&result_path),
            Err(e) => Err(e),
        };

        self.executor.cleanup(&tmp_files);

        let module_enabled = result?;
        info!(
            module = module_name,
            "Enabled script run successful, result: module {}",
            if module_enabled { "Enabled" } else { "Disabled" }
        );
        Ok(module_enabled)
    }
}

fn read_enabled_result(path: &PathBuf) -> Result<bool> {
    let data = fs::read_to_string(path).map_err(|e| SystemError::Path {
        path: path.clone(),
        source: e,
    })?;

    match data.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(HookError::BadEnabledResult(other.to_string()).into()),
    }
}
