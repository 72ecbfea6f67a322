//! The operator: translates external events into queued tasks and
//! executes tasks by driving the module manager and the hook machinery.
//!
//! All module lifecycle transitions serialize through the `main` queue;
//! hook-run tasks go to the queues their hooks declared.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::ModuleEvent;
use super::ModuleManager;
use crate::MAIN_QUEUE_NAME;
use crate::config::OperatorConfig;
use crate::helm::HelmClient;
use crate::hook::BindingContext;
use crate::hook::BindingType;
use crate::hook::Hook;
use crate::kube::KubeClient;
use crate::metrics;
use crate::monitor::ResourcesMonitorManager;
use crate::queue::TaskHandler;
use crate::queue::TaskQueue;
use crate::queue::TaskQueueSet;
use crate::task::HookMetadata;
use crate::task::Task;
use crate::task::TaskResult;
use crate::task::TaskType;

const MODULE_EVENTS_BUFFER: usize = 16;

pub struct Operator {
    config: Arc<OperatorConfig>,
    module_manager: Arc<ModuleManager>,
    monitors: Arc<ResourcesMonitorManager>,
    helm: Arc<dyn HelmClient>,
    queues: Arc<TaskQueueSet>,

    module_events_tx: mpsc::Sender<ModuleEvent>,
    module_events_rx: Mutex<Option<mpsc::Receiver<ModuleEvent>>>,

    /// Weak self reference set by [`Operator::attach`]; lets task
    /// handlers start new queue consumers with the operator as handler.
    self_ref: Mutex<Weak<Operator>>,

    shutdown: watch::Receiver<()>,
}

impl Operator {
    pub fn new(
        config: Arc<OperatorConfig>,
        helm: Arc<dyn HelmClient>,
        kube: Arc<dyn KubeClient>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        let monitors = Arc::new(ResourcesMonitorManager::new(
            kube,
            &config.monitor,
            &config.helm.namespace,
            shutdown.clone(),
        ));
        let module_manager = Arc::new(ModuleManager::new(config.clone(), helm.clone(), monitors.clone()));
        let queues = Arc::new(TaskQueueSet::new(&config.queue, shutdown.clone()));
        let (module_events_tx, module_events_rx) = mpsc::channel(MODULE_EVENTS_BUFFER);

        Self {
            config,
            module_manager,
            monitors,
            helm,
            queues,
            module_events_tx,
            module_events_rx: Mutex::new(Some(module_events_rx)),
            self_ref: Mutex::new(Weak::new()),
            shutdown,
        }
    }

    /// Records the owning Arc so handlers can spawn queue consumers.
    pub fn attach(self: &Arc<Self>) {
        *self.self_ref.lock() = Arc::downgrade(self);
    }

    fn handler(&self) -> Option<Arc<Operator>> {
        self.self_ref.lock().upgrade()
    }

    /// Registers modules and global hooks; errors are permanent and
    /// prevent startup.
    pub async fn init(&self) -> Result<(), crate::Error> {
        info!(
            modules_dir = %self.config.dirs.modules_dir.display(),
            global_hooks_dir = %self.config.dirs.global_hooks_dir.display(),
            "init module manager"
        );
        self.module_manager.init().await
    }

    pub fn module_manager(&self) -> Arc<ModuleManager> {
        self.module_manager.clone()
    }

    pub fn monitors(&self) -> Arc<ResourcesMonitorManager> {
        self.monitors.clone()
    }

    pub fn queues(&self) -> Arc<TaskQueueSet> {
        self.queues.clone()
    }

    /// Sender side for the configuration-store watcher.
    pub fn module_events_tx(&self) -> mpsc::Sender<ModuleEvent> {
        self.module_events_tx.clone()
    }

    /// Runs all managers, event and queue handlers.
    pub fn start(self: &Arc<Self>) {
        info!("start operator");
        self.attach();

        self.start_operator_metrics();

        // Prepopulate the main queue with onStartup tasks and enable
        // kubernetes bindings tasks, then start its consumer.
        self.prepopulate_main_queue();
        self.queues.start(MAIN_QUEUE_NAME, self.clone());
        self.init_and_start_hook_queues();

        // Handle events before informers could produce any (the seam
        // starts delivering only after this subscription exists).
        self.start_module_manager_event_handler();

        self.queues.main().changes_enable();
    }

    /// Prepopulates the main queue: OnStartup global hooks, kubernetes
    /// binding enablement per global hook, then the first reload-all.
    pub fn prepopulate_main_queue(&self) {
        let labels = event_labels(&[("event.id", "OperatorOnStartup")]);
        let main_queue = self.queues.main();
        main_queue.changes_disable();

        for hook_name in self.module_manager.global_hooks_in_order(BindingType::OnStartup) {
            info!(hook = %hook_name, queue = MAIN_QUEUE_NAME, "queue GlobalHookRun task");

            let task = Task::new(TaskType::GlobalHookRun)
                .with_log_labels(merge_labels(&labels, &[("hook", &hook_name)]))
                .with_metadata(HookMetadata {
                    event_description: "PrepopulateMainQueue".to_string(),
                    hook_name: Some(hook_name.clone()),
                    binding_type: Some(BindingType::OnStartup),
                    binding_context: vec![BindingContext::new(BindingType::OnStartup)],
                    reload_all_on_values_changes: false,
                    ..Default::default()
                });
            main_queue.add_last(task);
        }

        for hook_name in self
            .module_manager
            .global_hooks_in_order(BindingType::OnKubernetesEvent)
        {
            info!(hook = %hook_name, "queue GlobalHookEnableKubernetesBindings task");

            let task = Task::new(TaskType::GlobalHookEnableKubernetesBindings)
                .with_log_labels(merge_labels(&labels, &[("hook", &hook_name)]))
                .with_metadata(HookMetadata {
                    event_description: "PrepopulateMainQueue".to_string(),
                    hook_name: Some(hook_name.clone()),
                    ..Default::default()
                });
            main_queue.add_last(task);
        }

        self.create_reload_all_tasks(true, &labels, "PrepopulateMainQueue");
    }

    /// Queues the reload-all bracket: BeforeAll global hooks followed
    /// by a DiscoverModulesState task. The discover handler queues the
    /// per-module tasks and the AfterAll bracket.
    pub fn create_reload_all_tasks(
        &self,
        on_startup: bool,
        log_labels: &HashMap<String, String>,
        event_description: &str,
    ) {
        let main_queue = self.queues.main();

        for hook_name in self.module_manager.global_hooks_in_order(BindingType::BeforeAll) {
            info!(hook = %hook_name, "queue GlobalHookRun task");

            let mut context = BindingContext::new(BindingType::BeforeAll);
            context.include_all_snapshots = true;

            let task = Task::new(TaskType::GlobalHookRun)
                .with_log_labels(merge_labels(log_labels, &[("hook", &hook_name)]))
                .with_metadata(HookMetadata {
                    event_description: event_description.to_string(),
                    hook_name: Some(hook_name.clone()),
                    binding_type: Some(BindingType::BeforeAll),
                    binding_context: vec![context],
                    reload_all_on_values_changes: false,
                    ..Default::default()
                });
            main_queue.add_last(task);
        }

        info!("queue DiscoverModulesState task");
        let discover_task = Task::new(TaskType::DiscoverModulesState)
            .with_log_labels(log_labels.clone())
            .with_metadata(HookMetadata {
                event_description: event_description.to_string(),
                on_startup_hooks: on_startup,
                ..Default::default()
            });
        main_queue.add_last(discover_task);
    }

    /// Ensures every queue declared by hook bindings has a running
    /// consumer.
    pub fn init_and_start_hook_queues(&self) {
        let Some(handler) = self.handler() else {
            // not attached: queue consumers are driven externally
            return;
        };
        for queue_name in self.module_manager.all_hook_queue_names() {
            if !self.queues.is_started(&queue_name) {
                self.queues.start(&queue_name, handler.clone());
                info!(queue = %queue_name, "queue started for hook bindings");
            }
        }
    }

    /// Consumes module events from the configuration-store watcher and
    /// absent-resource reports from the monitors.
    pub fn start_module_manager_event_handler(self: &Arc<Self>) {
        let operator: Arc<Operator> = self.clone();
        let mut module_events = self
            .module_events_rx
            .lock()
            .take()
            .expect("module events receiver already taken");
        let mut absent_events = self.monitors.take_events_rx();
        let mut shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.changed() => {
                        info!("module manager event handler shutdown");
                        return;
                    }

                    Some(event) = module_events.recv() => {
                        operator.handle_module_event(event);
                    }

                    Some(event) = absent_events.recv() => {
                        let labels = event_labels(&[
                            ("event.id", &Uuid::new_v4().to_string()),
                            ("module", &event.module_name),
                        ]);
                        let main_queue = operator.queues.main();

                        if queue_has_module_run_task(&main_queue, &event.module_name) {
                            info!(module = %event.module_name,
                                "Got {} absent module resources, ModuleRun task exists", event.absent.len());
                            continue;
                        }

                        info!(module = %event.module_name,
                            "Got {} absent module resources, queue ModuleRun task", event.absent.len());
                        let task = Task::new(TaskType::ModuleRun)
                            .with_log_labels(labels)
                            .with_metadata(HookMetadata {
                                event_description: "DetectAbsentHelmResources".to_string(),
                                module_name: Some(event.module_name.clone()),
                                ..Default::default()
                            });
                        main_queue.add_last(task);
                    }
                }
            }
        });
    }

    pub(crate) fn handle_module_event(
        &self,
        event: ModuleEvent,
    ) {
        let labels = event_labels(&[("event.id", &Uuid::new_v4().to_string())]);
        let main_queue = self.queues.main();

        match event {
            ModuleEvent::ModulesChanged(module_names) => {
                for module_name in module_names {
                    if queue_has_module_run_task(&main_queue, &module_name) {
                        info!(module = %module_name, "module values are changed, ModuleRun task already exists");
                        continue;
                    }

                    info!(module = %module_name, "module values are changed, queue ModuleRun task");
                    let task = Task::new(TaskType::ModuleRun)
                        .with_log_labels(merge_labels(&labels, &[("module", &module_name)]))
                        .with_metadata(HookMetadata {
                            event_description: "ModuleValuesChanged".to_string(),
                            module_name: Some(module_name),
                            ..Default::default()
                        });
                    main_queue.add_last(task);
                }
            }
            ModuleEvent::GlobalChanged => {
                info!("global config values are changed, queue ReloadAll tasks");
                // Stop all resource monitors before the modules discovery.
                self.monitors.stop_monitors();
                self.create_reload_all_tasks(false, &labels, "GlobalConfigValuesChanged");
            }
            ModuleEvent::AmbiguousState => {
                info!("module manager is in ambiguous state, queue ModuleManagerRetry task with delay");
                let task = Task::new(TaskType::ModuleManagerRetry).with_log_labels(labels);
                main_queue.add_first(task);
            }
        }
    }

    /// Schedule manager seam: builds hook-run tasks for every hook
    /// bound to this crontab, on the hooks' declared queues.
    pub fn handle_schedule_event(
        &self,
        crontab: &str,
    ) {
        let labels = event_labels(&[("event.id", &Uuid::new_v4().to_string()), ("binding", "schedule")]);

        for (hook_name, binding) in self.module_manager.global_hooks_with_schedule(crontab) {
            let task = Task::new(TaskType::GlobalHookRun)
                .with_queue_name(&binding.queue)
                .with_log_labels(merge_labels(&labels, &[("hook", &hook_name)]))
                .with_metadata(HookMetadata {
                    event_description: "Schedule".to_string(),
                    hook_name: Some(hook_name.clone()),
                    binding_type: Some(BindingType::Schedule),
                    binding_context: vec![BindingContext::new(BindingType::Schedule)],
                    allow_failure: binding.allow_failure,
                    reload_all_on_values_changes: true,
                    ..Default::default()
                });
            self.queues.queue_or_create(&binding.queue).add_last(task);
        }

        for (module_name, hook_name, binding) in self.module_manager.module_hooks_with_schedule(crontab) {
            let task = Task::new(TaskType::ModuleHookRun)
                .with_queue_name(&binding.queue)
                .with_log_labels(merge_labels(&labels, &[("hook", &hook_name), ("module", &module_name)]))
                .with_metadata(HookMetadata {
                    event_description: "Schedule".to_string(),
                    module_name: Some(module_name.clone()),
                    hook_name: Some(hook_name.clone()),
                    binding_type: Some(BindingType::Schedule),
                    binding_context: vec![BindingContext::new(BindingType::Schedule)],
                    allow_failure: binding.allow_failure,
                    ..Default::default()
                });
            self.queues.queue_or_create(&binding.queue).add_last(task);
        }
    }

    /// Kubernetes events manager seam: the hook's controller decided
    /// the binding contexts, this routes them to the declared queue.
    pub fn handle_kube_event(
        &self,
        hook_name: &str,
        contexts: Vec<BindingContext>,
    ) {
        let labels = event_labels(&[("event.id", &Uuid::new_v4().to_string()), ("binding", "kubernetes")]);

        if let Ok(hook) = self.module_manager.get_global_hook(hook_name) {
            let Some(binding) = hook.config().kubernetes.first().cloned() else {
                return;
            };
            let task = Task::new(TaskType::GlobalHookRun)
                .with_queue_name(&binding.queue)
                .with_log_labels(merge_labels(&labels, &[("hook", hook_name)]))
                .with_metadata(HookMetadata {
                    event_description: "Kubernetes".to_string(),
                    hook_name: Some(hook_name.to_string()),
                    binding_type: Some(BindingType::OnKubernetesEvent),
                    binding_context: contexts,
                    allow_failure: binding.allow_failure,
                    reload_all_on_values_changes: true,
                    ..Default::default()
                });
            self.queues.queue_or_create(&binding.queue).add_last(task);
            return;
        }

        if let Ok((module_name, hook)) = self.module_manager.get_module_hook(hook_name) {
            if self.module_manager.module_bindings_disabled(&module_name) {
                return;
            }
            let Some(binding) = hook.config().kubernetes.first().cloned() else {
                return;
            };
            let task = Task::new(TaskType::ModuleHookRun)
                .with_queue_name(&binding.queue)
                .with_log_labels(merge_labels(&labels, &[("hook", hook_name), ("module", &module_name)]))
                .with_metadata(HookMetadata {
                    event_description: "Kubernetes".to_string(),
                    module_name: Some(module_name),
                    hook_name: Some(hook_name.to_string()),
                    binding_type: Some(BindingType::OnKubernetesEvent),
                    binding_context: contexts,
                    allow_failure: binding.allow_failure,
                    ..Default::default()
                });
            self.queues.queue_or_create(&binding.queue).add_last(task);
        }
    }

    /// Live ticks and queue length sampling.
    fn start_operator_metrics(&self) {
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                metrics::LIVE_TICKS.inc();
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    _ = sleep(Duration::from_secs(10)) => {}
                }
            }
        });

        let queues = self.queues.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                queues.iterate(|queue| {
                    metrics::TASKS_QUEUE_LENGTH
                        .with_label_values(&[queue.name()])
                        .set(queue.length() as i64);
                });
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    _ = sleep(Duration::from_secs(5)) => {}
                }
            }
        });
    }

    // -
    // Task handlers

    async fn handle_global_hook_run(
        &self,
        task: &Task,
    ) -> TaskResult {
        info!("Run global hook");
        let hm = task.metadata();
        let Some(hook_name) = hm.hook_name.clone() else {
            error!("GlobalHookRun task without hook name, drop it");
            return TaskResult::success();
        };
        let binding_type = hm.binding_type.unwrap_or(BindingType::OnStartup);

        match self
            .module_manager
            .run_global_hook(&hook_name, binding_type, &hm.binding_context)
            .await
        {
            Err(e) => {
                if hm.allow_failure {
                    metrics::GLOBAL_HOOK_ALLOWED_ERRORS.with_label_values(&[&hook_name]).inc();
                    info!("GlobalHookRun failed, but allowed to fail. Error: {}", e);
                    TaskResult::success()
                } else {
                    metrics::GLOBAL_HOOK_ERRORS.with_label_values(&[&hook_name]).inc();
                    error!(
                        "GlobalHookRun failed, requeue task to retry after delay. Failed count is {}. Error: {}",
                        task.failure_count() + 1,
                        e
                    );
                    TaskResult::fail()
                }
            }
            Ok((before_checksum, after_checksum)) => {
                info!("GlobalHookRun success");

                let (reload_all, event_description) = match binding_type {
                    BindingType::Schedule if before_checksum != after_checksum => {
                        (true, "ScheduleChangeGlobalValues")
                    }
                    // ignore values changes from Synchronization runs
                    BindingType::OnKubernetesEvent
                        if hm.reload_all_on_values_changes && before_checksum != after_checksum =>
                    {
                        (true, "KubernetesChangeGlobalValues")
                    }
                    // values changed again while afterAll hooks executed
                    BindingType::AfterAll
                        if hm.last_after_all_hook
                            && hm.values_checksum.as_deref() != Some(after_checksum.as_str()) =>
                    {
                        (true, "AfterAllHooksChangeGlobalValues")
                    }
                    _ => (false, ""),
                };

                if reload_all {
                    self.monitors.stop_monitors();
                    self.create_reload_all_tasks(false, task.log_labels(), event_description);
                }

                TaskResult::success()
            }
        }
    }

    async fn handle_enable_kubernetes_bindings(
        &self,
        task: &Task,
    ) -> TaskResult {
        info!("Enable global hook with kubernetes binding");
        let hm = task.metadata();
        let Some(hook_name) = hm.hook_name.clone() else {
            error!("GlobalHookEnableKubernetesBindings task without hook name, drop it");
            return TaskResult::success();
        };

        let hook = match self.module_manager.get_global_hook(&hook_name) {
            Ok(hook) => hook,
            Err(e) => {
                metrics::GLOBAL_HOOK_ERRORS.with_label_values(&[&hook_name]).inc();
                error!("GlobalEnableKubernetesBindings failed: {}", e);
                return TaskResult::fail();
            }
        };

        let event_description =
            extend_event_description(&hm.event_description, "HandleGlobalEnableKubernetesBindings");

        // Synchronization tasks go to the queue head; informers start
        // only after these are enqueued, so informer events always land
        // behind them.
        let mut hook_run_tasks = Vec::new();
        for binding in &hook.config().kubernetes {
            let sync_task = Task::new(TaskType::GlobalHookRun)
                .with_queue_name(&binding.queue)
                .with_log_labels(task.log_labels().clone())
                .with_metadata(HookMetadata {
                    event_description: event_description.clone(),
                    hook_name: Some(hook_name.clone()),
                    binding_type: Some(BindingType::OnKubernetesEvent),
                    binding_context: vec![BindingContext::synchronization(&binding.name)],
                    allow_failure: binding.allow_failure,
                    // ignore global values changes from Synchronization
                    reload_all_on_values_changes: false,
                    ..Default::default()
                });
            hook_run_tasks.push(sync_task);
        }

        info!("Kubernetes binding for hook enabled successfully");
        TaskResult::success().with_head_tasks(hook_run_tasks)
    }

    async fn handle_discover_modules_state(
        &self,
        task: &Task,
    ) -> TaskResult {
        info!("Run DiscoverModules");

        match self.run_discover_modules_state(task).await {
            Ok(tasks) => {
                info!("DiscoverModulesState success");
                TaskResult::success().with_after_tasks(tasks)
            }
            Err(e) => {
                metrics::MODULES_DISCOVER_ERRORS.inc();
                error!(
                    "DiscoverModulesState failed, requeue task to retry after delay. Failed count is {}. Error: {}",
                    task.failure_count() + 1,
                    e
                );
                TaskResult::fail()
            }
        }
    }

    async fn run_discover_modules_state(
        &self,
        discover_task: &Task,
    ) -> Result<Vec<Task>, crate::Error> {
        let state = self.module_manager.discover_modules_state().await?;
        let hm = discover_task.metadata();
        let log_labels = discover_task.log_labels();

        let event_description = extend_event_description(&hm.event_description, "DiscoverModulesState");
        let mut new_tasks = Vec::new();

        // ModuleRun for enabled modules; OnStartup hooks run on
        // operator startup or when a module becomes newly enabled.
        for module_name in &state.enabled_modules {
            let run_on_startup_hooks =
                hm.on_startup_hooks || state.newly_enabled_modules.contains(module_name);

            info!(module = %module_name, "queue ModuleRun task");
            new_tasks.push(
                Task::new(TaskType::ModuleRun)
                    .with_log_labels(merge_labels(log_labels, &[("module", module_name)]))
                    .with_metadata(HookMetadata {
                        event_description: event_description.clone(),
                        module_name: Some(module_name.clone()),
                        on_startup_hooks: run_on_startup_hooks,
                        ..Default::default()
                    }),
            );
        }

        for module_name in &state.modules_to_disable {
            // register hooks on startup so afterDeleteHelm hooks can run
            if hm.on_startup_hooks {
                self.module_manager.register_module_hooks(module_name).await?;
            }
            info!(module = %module_name, "queue ModuleDelete task");
            new_tasks.push(
                Task::new(TaskType::ModuleDelete)
                    .with_log_labels(merge_labels(log_labels, &[("module", module_name)]))
                    .with_metadata(HookMetadata {
                        event_description: event_description.clone(),
                        module_name: Some(module_name.clone()),
                        ..Default::default()
                    }),
            );
        }

        for module_name in &state.released_unknown_modules {
            info!(module = %module_name, "queue ModulePurge task");
            new_tasks.push(
                Task::new(TaskType::ModulePurge)
                    .with_log_labels(log_labels.clone())
                    .with_metadata(HookMetadata {
                        event_description: event_description.clone(),
                        module_name: Some(module_name.clone()),
                        ..Default::default()
                    }),
            );
        }

        // AfterAll bracket; the last task carries the pre-AfterAll
        // global values checksum for the repeat-reload decision.
        let after_all_hooks = self.module_manager.global_hooks_in_order(BindingType::AfterAll);
        for (i, hook_name) in after_all_hooks.iter().enumerate() {
            let mut context = BindingContext::new(BindingType::AfterAll);
            context.include_all_snapshots = true;

            let mut metadata = HookMetadata {
                event_description: event_description.clone(),
                hook_name: Some(hook_name.clone()),
                binding_type: Some(BindingType::AfterAll),
                binding_context: vec![context],
                ..Default::default()
            };
            if i == after_all_hooks.len() - 1 {
                metadata.last_after_all_hook = true;
                metadata.values_checksum = Some(self.module_manager.global_values()?.checksum()?);
            }

            info!(hook = %hook_name, "queue GlobalHookRun task");
            new_tasks.push(
                Task::new(TaskType::GlobalHookRun)
                    .with_log_labels(merge_labels(log_labels, &[("hook", hook_name)]))
                    .with_metadata(metadata),
            );
        }

        // Disable kubernetes informers and schedules of the disabled
        // modules.
        for module_name in &state.modules_to_disable {
            self.module_manager.disable_module_hooks(module_name);
        }

        Ok(new_tasks)
    }

    async fn handle_module_run(
        &self,
        task: &Task,
    ) -> TaskResult {
        info!("Run module");
        let hm = task.metadata();
        let Some(module_name) = hm.module_name.clone() else {
            error!("ModuleRun task without module name, drop it");
            return TaskResult::success();
        };

        // Hooks must be registered before any binding can run; queues
        // for freshly declared hook bindings follow.
        if let Err(e) = self.module_manager.register_module_hooks(&module_name).await {
            metrics::MODULE_RUN_ERRORS.with_label_values(&[&module_name]).inc();
            error!(
                "ModuleRun failed, requeue task to retry after delay. Failed count is {}. Error: {}",
                task.failure_count() + 1,
                e
            );
            return TaskResult::fail();
        }
        if hm.on_startup_hooks {
            self.init_and_start_hook_queues();
        }

        match self.module_manager.run_module(&module_name, hm.on_startup_hooks).await {
            Ok(values_changed) => {
                info!("ModuleRun success");
                if !values_changed {
                    return TaskResult::success();
                }

                // One of afterHelm hooks changed values, run ModuleRun
                // again without onStartup hooks.
                let event_description =
                    extend_event_description(&hm.event_description, "AfterHelmHooksChangeModuleValues");
                let new_task = Task::new(TaskType::ModuleRun)
                    .with_queue_name(task.queue_name())
                    .with_log_labels(task.log_labels().clone())
                    .with_metadata(HookMetadata {
                        event_description,
                        module_name: Some(module_name),
                        on_startup_hooks: false,
                        ..Default::default()
                    });
                TaskResult::success().with_after_tasks(vec![new_task])
            }
            Err(e) => {
                metrics::MODULE_RUN_ERRORS.with_label_values(&[&module_name]).inc();
                error!(
                    "ModuleRun failed, requeue task to retry after delay. Failed count is {}. Error: {}",
                    task.failure_count() + 1,
                    e
                );
                TaskResult::fail()
            }
        }
    }

    async fn handle_module_delete(
        &self,
        task: &Task,
    ) -> TaskResult {
        info!("Delete module");
        let hm = task.metadata();
        let Some(module_name) = hm.module_name.clone() else {
            error!("ModuleDelete task without module name, drop it");
            return TaskResult::success();
        };

        match self.module_manager.delete_module(&module_name).await {
            Ok(()) => {
                info!("ModuleDelete success");
                TaskResult::success()
            }
            Err(e) => {
                metrics::MODULE_DELETE_ERRORS.with_label_values(&[&module_name]).inc();
                error!(
                    "ModuleDelete failed, requeue task to retry after delay. Failed count is {}. Error: {}",
                    task.failure_count() + 1,
                    e
                );
                TaskResult::fail()
            }
        }
    }

    async fn handle_module_hook_run(
        &self,
        task: &Task,
    ) -> TaskResult {
        info!("Run module hook");
        let hm = task.metadata();
        let (Some(module_name), Some(hook_name)) = (hm.module_name.clone(), hm.hook_name.clone()) else {
            error!("ModuleHookRun task without module or hook name, drop it");
            return TaskResult::success();
        };
        let binding_type = hm.binding_type.unwrap_or(BindingType::OnKubernetesEvent);

        // Hooks may mutate release resources; the monitor must not
        // report them as drift mid-run.
        self.monitors.pause_monitor(&module_name);

        match self
            .module_manager
            .run_module_hook(&hook_name, binding_type, &hm.binding_context)
            .await
        {
            Ok(()) => {
                info!("ModuleHookRun success");
                self.monitors.resume_monitor(&module_name);
                TaskResult::success()
            }
            Err(e) => {
                if hm.allow_failure {
                    metrics::MODULE_HOOK_ALLOWED_ERRORS
                        .with_label_values(&[&module_name, &hook_name])
                        .inc();
                    info!("ModuleHookRun failed, but allowed to fail. Error: {}", e);
                    self.monitors.resume_monitor(&module_name);
                    TaskResult::success()
                } else {
                    metrics::MODULE_HOOK_ERRORS
                        .with_label_values(&[&module_name, &hook_name])
                        .inc();
                    error!(
                        "ModuleHookRun failed, requeue task to retry after delay. Failed count is {}. Error: {}",
                        task.failure_count() + 1,
                        e
                    );
                    TaskResult::fail()
                }
            }
        }
    }

    async fn handle_module_purge(
        &self,
        task: &Task,
    ) -> TaskResult {
        // Purge is for unknown modules, so an error is just ignored.
        info!("Run module purge");
        let hm = task.metadata();
        let Some(module_name) = hm.module_name.clone() else {
            return TaskResult::success();
        };

        match self.helm.delete_release(&module_name).await {
            Ok(()) => info!("ModulePurge success"),
            Err(e) => warn!("ModulePurge failed, no retry. Error: {}", e),
        }
        TaskResult::success()
    }

    fn handle_module_manager_retry(&self) -> TaskResult {
        metrics::MODULES_DISCOVER_ERRORS.inc();
        self.module_manager.retry();
        info!("ModuleManagerRetry requested, now wait before run module discovery again");

        TaskResult::success().with_delay_before_next_task(self.queues.delay_on_failed_task())
    }
}

#[async_trait]
impl TaskHandler for Operator {
    async fn handle_task(
        &self,
        task: Task,
    ) -> TaskResult {
        match task.task_type() {
            TaskType::GlobalHookRun => self.handle_global_hook_run(&task).await,
            TaskType::GlobalHookEnableKubernetesBindings => {
                self.handle_enable_kubernetes_bindings(&task).await
            }
            TaskType::DiscoverModulesState => self.handle_discover_modules_state(&task).await,
            TaskType::ModuleRun => self.handle_module_run(&task).await,
            TaskType::ModuleDelete => self.handle_module_delete(&task).await,
            TaskType::ModuleHookRun => self.handle_module_hook_run(&task).await,
            TaskType::ModulePurge => self.handle_module_purge(&task).await,
            TaskType::ModuleManagerRetry => self.handle_module_manager_retry(),
        }
    }
}

/// True when the main queue already carries a ModuleRun for this
/// module; used to keep at most one pending ModuleRun per module.
pub fn queue_has_module_run_task(
    queue: &TaskQueue,
    module_name: &str,
) -> bool {
    let mut has_task = false;
    queue.iterate(|task| {
        if task.task_type() == TaskType::ModuleRun
            && task.metadata().module_name.as_deref() == Some(module_name)
        {
            has_task = true;
        }
    });
    has_task
}

fn event_labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn merge_labels(
    base: &HashMap<String, String>,
    extra: &[(&str, &str)],
) -> HashMap<String, String> {
    let mut labels = base.clone();
    for (k, v) in extra {
        labels.insert(k.to_string(), v.to_string());
    }
    labels
}

fn extend_event_description(
    event_description: &str,
    suffix: &str,
) -> String {
    if event_description.contains(suffix) {
        return event_description.to_string();
    }
    if event_description.is_empty() {
        return suffix.to_string();
    }
    format!("{event_description}.{suffix}")
}
