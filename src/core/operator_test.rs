use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use super::ModuleEvent;
use super::Operator;
use super::queue_has_module_run_task;
use crate::MODULE_CHECKSUM_VALUE_KEY;
use crate::config::OperatorConfig;
use crate::hook::BindingContext;
use crate::hook::BindingType;
use crate::metrics;
use crate::queue::TaskHandler;
use crate::task::HookMetadata;
use crate::task::Task;
use crate::task::TaskStatus;
use crate::task::TaskType;
use crate::test_utils::ModuleFixture;
use crate::test_utils::StubHelmClient;
use crate::test_utils::StubKubeClient;
use crate::test_utils::fixture_config;
use crate::test_utils::marker_hook_body;
use crate::test_utils::marker_lines;
use crate::test_utils::write_global_hook;

fn build_operator(
    root: &Path,
    helm: Arc<StubHelmClient>,
    kube: Arc<StubKubeClient>,
) -> (Arc<Operator>, watch::Sender<()>) {
    std::fs::create_dir_all(root.join("modules")).unwrap();
    std::fs::create_dir_all(root.join("global-hooks")).unwrap();

    let config: OperatorConfig = fixture_config(root);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let operator = Arc::new(Operator::new(Arc::new(config), helm, kube, shutdown_rx));
    (operator, shutdown_tx)
}

/// Drives the main queue to exhaustion the way its consumer would,
/// without spawning: deterministic ordering for assertions.
async fn drain_main_queue(operator: &Arc<Operator>) {
    let queue = operator.queues().main();

    let mut executed = 0;
    while let Some(task) = queue.peek() {
        let result = operator.handle_task(task).await;
        assert_eq!(result.status, TaskStatus::Success, "task failed while draining");

        queue.pop();
        for task in result.head_tasks.into_iter().rev() {
            queue.add_first(task);
        }
        for task in result.after_tasks {
            queue.add_last(task);
        }

        executed += 1;
        assert!(executed < 100, "main queue did not drain");
    }
}

fn main_queue_task_types(operator: &Arc<Operator>) -> Vec<TaskType> {
    let mut types = Vec::new();
    operator.queues().main().iterate(|task| types.push(task.task_type()));
    types
}

#[tokio::test]
async fn prepopulate_orders_startup_bindings_and_discovery() {
    let root = tempfile::tempdir().unwrap();
    let unused = root.path().join("unused");
    write_global_hook(root.path(), "100-startup.sh", &marker_hook_body(r#"{"onStartup": 1}"#, &unused));
    write_global_hook(
        root.path(),
        "200-watcher.sh",
        &marker_hook_body(r#"{"kubernetes": [{"apiVersion": "v1", "kind": "Pod"}]}"#, &unused),
    );
    write_global_hook(root.path(), "300-before.sh", &marker_hook_body(r#"{"beforeAll": 1}"#, &unused));

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    operator.prepopulate_main_queue();

    assert_eq!(
        main_queue_task_types(&operator),
        vec![
            TaskType::GlobalHookRun,
            TaskType::GlobalHookEnableKubernetesBindings,
            TaskType::GlobalHookRun,
            TaskType::DiscoverModulesState,
        ]
    );
}

#[tokio::test]
async fn clean_install_runs_helm_for_charted_modules_only() {
    let root = tempfile::tempdir().unwrap();
    let alpha_marker = root.path().join("alpha-marker");
    let beta_marker = root.path().join("beta-marker");

    ModuleFixture::new(root.path(), "010-alpha")
        .with_chart()
        .with_hook("after.sh", &marker_hook_body(r#"{"afterHelm": 1}"#, &alpha_marker));
    ModuleFixture::new(root.path(), "020-beta")
        .with_hook("after.sh", &marker_hook_body(r#"{"afterHelm": 1}"#, &beta_marker));

    let helm = StubHelmClient::new();
    let (operator, _shutdown) = build_operator(root.path(), helm.clone(), StubKubeClient::new());
    operator.init().await.unwrap();

    operator.prepopulate_main_queue();
    drain_main_queue(&operator).await;

    // alpha installed once with the checksum value, beta never touched helm
    assert_eq!(helm.upgrade_count("alpha"), 1);
    assert_eq!(helm.upgrade_count("beta"), 0);
    let release_values = helm.releases.lock().get("alpha").unwrap().values.clone();
    assert!(release_values.has_key(MODULE_CHECKSUM_VALUE_KEY));

    // both AfterHelm batches ran
    assert_eq!(marker_lines(&alpha_marker), 1);
    assert_eq!(marker_lines(&beta_marker), 1);

    // drift detection is armed with the recorded manifests
    assert!(operator.monitors().has_monitor("alpha"));
}

#[tokio::test]
async fn restart_with_unchanged_inputs_skips_the_upgrade() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha").with_chart();

    let helm = StubHelmClient::new();
    let kube = StubKubeClient::new();

    // first operator lifetime
    {
        let (operator, _shutdown) = build_operator(root.path(), helm.clone(), kube.clone());
        operator.init().await.unwrap();
        operator.prepopulate_main_queue();
        drain_main_queue(&operator).await;
    }
    assert_eq!(helm.upgrade_count("alpha"), 1);
    kube.put_object("alpha-config");

    // restart: same cluster, same release state
    let (operator, _shutdown) = build_operator(root.path(), helm.clone(), kube);
    operator.init().await.unwrap();
    operator.prepopulate_main_queue();
    drain_main_queue(&operator).await;

    assert_eq!(helm.upgrade_count("alpha"), 1);
    assert!(operator.monitors().has_monitor("alpha"));
}

#[tokio::test]
async fn module_values_change_queues_a_single_module_run() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha");

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    operator.handle_module_event(ModuleEvent::ModulesChanged(vec!["alpha".to_string()]));
    operator.handle_module_event(ModuleEvent::ModulesChanged(vec!["alpha".to_string()]));

    let queue = operator.queues().main();
    assert_eq!(queue.length(), 1);
    assert!(queue_has_module_run_task(&queue, "alpha"));
    assert!(!queue_has_module_run_task(&queue, "beta"));
}

#[tokio::test]
async fn global_change_stops_monitors_and_queues_a_reload_all() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha").with_chart();

    let helm = StubHelmClient::new();
    let (operator, _shutdown) = build_operator(root.path(), helm, StubKubeClient::new());
    operator.init().await.unwrap();

    operator.prepopulate_main_queue();
    drain_main_queue(&operator).await;
    assert!(operator.monitors().has_monitor("alpha"));

    operator.handle_module_event(ModuleEvent::GlobalChanged);

    assert!(!operator.monitors().has_monitor("alpha"));
    assert_eq!(main_queue_task_types(&operator), vec![TaskType::DiscoverModulesState]);
}

#[tokio::test]
async fn ambiguous_state_prepends_a_retry_task() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha");

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    operator.queues().main().add_last(Task::new(TaskType::DiscoverModulesState));
    operator.handle_module_event(ModuleEvent::AmbiguousState);

    assert_eq!(
        main_queue_task_types(&operator),
        vec![TaskType::ModuleManagerRetry, TaskType::DiscoverModulesState]
    );

    let retry_task = operator.queues().main().peek().unwrap();
    let result = operator.handle_task(retry_task).await;
    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(
        result.delay_before_next_task,
        Some(operator.queues().delay_on_failed_task())
    );
}

#[tokio::test]
async fn enable_kubernetes_bindings_emits_synchronization_head_tasks() {
    let root = tempfile::tempdir().unwrap();
    write_global_hook(
        root.path(),
        "watcher.sh",
        &marker_hook_body(
            r#"{"kubernetes": [{"name": "pods", "apiVersion": "v1", "kind": "Pod"}]}"#,
            &root.path().join("unused"),
        ),
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    let task = Task::new(TaskType::GlobalHookEnableKubernetesBindings).with_metadata(HookMetadata {
        event_description: "PrepopulateMainQueue".to_string(),
        hook_name: Some("watcher.sh".to_string()),
        ..Default::default()
    });

    let result = operator.handle_task(task).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.head_tasks.len(), 1);

    let sync_task = &result.head_tasks[0];
    assert_eq!(sync_task.task_type(), TaskType::GlobalHookRun);
    assert_eq!(sync_task.metadata().binding_context[0].binding, "pods");
    assert!(!sync_task.metadata().reload_all_on_values_changes);
}

#[tokio::test]
async fn global_values_change_from_schedule_hook_triggers_reload_all() {
    let root = tempfile::tempdir().unwrap();
    write_global_hook(
        root.path(),
        "patcher.sh",
        r#"if [ "$1" = "--config" ]; then echo '{"schedule": [{"crontab": "* * * * *"}]}'; exit 0; fi
echo '[{"op": "add", "path": "/global/fresh", "value": true}]' > "$VALUES_JSON_PATCH_PATH""#,
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    let task = Task::new(TaskType::GlobalHookRun).with_metadata(HookMetadata {
        event_description: "Schedule".to_string(),
        hook_name: Some("patcher.sh".to_string()),
        binding_type: Some(BindingType::Schedule),
        binding_context: vec![BindingContext::new(BindingType::Schedule)],
        reload_all_on_values_changes: true,
        ..Default::default()
    });

    let result = operator.handle_task(task).await;
    assert_eq!(result.status, TaskStatus::Success);

    // values changed, the reload-all bracket landed on the main queue
    assert_eq!(main_queue_task_types(&operator), vec![TaskType::DiscoverModulesState]);
}

#[tokio::test]
async fn last_after_all_hook_checksum_mismatch_schedules_another_reload() {
    let root = tempfile::tempdir().unwrap();
    write_global_hook(
        root.path(),
        "silent.sh",
        &marker_hook_body(r#"{"afterAll": 1}"#, &root.path().join("unused")),
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    let current_checksum = operator.module_manager().global_values().unwrap().checksum().unwrap();

    // checksum captured before the AfterAll batch still matches: no reload
    let task = Task::new(TaskType::GlobalHookRun).with_metadata(HookMetadata {
        hook_name: Some("silent.sh".to_string()),
        binding_type: Some(BindingType::AfterAll),
        binding_context: vec![BindingContext::new(BindingType::AfterAll)],
        last_after_all_hook: true,
        values_checksum: Some(current_checksum),
        ..Default::default()
    });
    operator.handle_task(task).await;
    assert!(main_queue_task_types(&operator).is_empty());

    // a stale checksum means values changed during the bracket: reload
    let task = Task::new(TaskType::GlobalHookRun).with_metadata(HookMetadata {
        hook_name: Some("silent.sh".to_string()),
        binding_type: Some(BindingType::AfterAll),
        binding_context: vec![BindingContext::new(BindingType::AfterAll)],
        last_after_all_hook: true,
        values_checksum: Some("stale".to_string()),
        ..Default::default()
    });
    operator.handle_task(task).await;
    assert_eq!(main_queue_task_types(&operator), vec![TaskType::DiscoverModulesState]);
}

#[tokio::test]
async fn discover_tags_the_last_after_all_task_with_the_checksum() {
    let root = tempfile::tempdir().unwrap();
    let unused = root.path().join("unused");
    ModuleFixture::new(root.path(), "010-alpha");
    write_global_hook(root.path(), "100-first.sh", &marker_hook_body(r#"{"afterAll": 1}"#, &unused));
    write_global_hook(root.path(), "200-second.sh", &marker_hook_body(r#"{"afterAll": 2}"#, &unused));

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    let task = Task::new(TaskType::DiscoverModulesState).with_metadata(HookMetadata {
        event_description: "GlobalConfigValuesChanged".to_string(),
        ..Default::default()
    });
    let result = operator.handle_task(task).await;
    assert_eq!(result.status, TaskStatus::Success);

    // ModuleRun for alpha, then the AfterAll bracket
    let types: Vec<TaskType> = result.after_tasks.iter().map(|t| t.task_type()).collect();
    assert_eq!(
        types,
        vec![TaskType::ModuleRun, TaskType::GlobalHookRun, TaskType::GlobalHookRun]
    );

    let first_after_all = &result.after_tasks[1];
    assert!(!first_after_all.metadata().last_after_all_hook);

    let last_after_all = &result.after_tasks[2];
    assert!(last_after_all.metadata().last_after_all_hook);
    let expected = operator.module_manager().global_values().unwrap().checksum().unwrap();
    assert_eq!(last_after_all.metadata().values_checksum.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn enabled_toggling_deletes_and_later_reruns_with_startup_hooks() {
    let root = tempfile::tempdir().unwrap();
    let flag = root.path().join("flag");
    let startup_marker = root.path().join("startup-marker");
    let delete_marker = root.path().join("delete-marker");
    std::fs::write(&flag, "true").unwrap();

    ModuleFixture::new(root.path(), "010-toggle")
        .with_chart()
        .with_enabled_script(&format!("cp \"{}\" \"$MODULE_ENABLED_RESULT\"", flag.display()))
        .with_hook("startup.sh", &marker_hook_body(r#"{"onStartup": 1}"#, &startup_marker))
        .with_hook(
            "cleanup.sh",
            &marker_hook_body(r#"{"afterDeleteHelm": 1}"#, &delete_marker),
        );

    let helm = StubHelmClient::new();
    let kube = StubKubeClient::new();
    let (operator, _shutdown) = build_operator(root.path(), helm.clone(), kube.clone());
    operator.init().await.unwrap();

    // initial startup: module enabled and installed
    operator.prepopulate_main_queue();
    drain_main_queue(&operator).await;
    assert_eq!(helm.upgrade_count("toggle"), 1);
    assert_eq!(marker_lines(&startup_marker), 1);
    kube.put_object("toggle-config");

    // disable: the next reload emits ModuleDelete and AfterDeleteHelm runs
    std::fs::write(&flag, "false").unwrap();
    operator.handle_module_event(ModuleEvent::GlobalChanged);
    drain_main_queue(&operator).await;
    assert!(helm.calls().contains(&"delete:toggle".to_string()));
    assert_eq!(marker_lines(&delete_marker), 1);

    // re-enable: a newly enabled module runs its OnStartup hooks again
    std::fs::write(&flag, "true").unwrap();
    operator.handle_module_event(ModuleEvent::GlobalChanged);
    drain_main_queue(&operator).await;
    assert_eq!(marker_lines(&startup_marker), 2);
    assert_eq!(helm.upgrade_count("toggle"), 2);
}

#[tokio::test]
async fn unknown_release_is_purged_without_retries() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha");

    let helm = StubHelmClient::new();
    helm.seed_release("zombie", crate::values::Values::new());

    let (operator, _shutdown) = build_operator(root.path(), helm.clone(), StubKubeClient::new());
    operator.init().await.unwrap();

    operator.prepopulate_main_queue();
    drain_main_queue(&operator).await;

    assert!(helm.calls().contains(&"delete:zombie".to_string()));
    assert!(!helm.releases.lock().contains_key("zombie"));
}

#[tokio::test]
async fn allowed_failure_of_a_module_hook_counts_and_succeeds() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha").with_hook(
        "fail.sh",
        r#"if [ "$1" = "--config" ]; then echo '{"kubernetes": [{"apiVersion": "v1", "kind": "Pod", "allowFailure": true}]}'; exit 0; fi
exit 1"#,
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();
    operator.module_manager().register_module_hooks("alpha").await.unwrap();

    let counter = metrics::MODULE_HOOK_ALLOWED_ERRORS.with_label_values(&["alpha", "alpha/fail.sh"]);
    let before = counter.get();

    let task = Task::new(TaskType::ModuleHookRun).with_metadata(HookMetadata {
        module_name: Some("alpha".to_string()),
        hook_name: Some("alpha/fail.sh".to_string()),
        binding_type: Some(BindingType::OnKubernetesEvent),
        binding_context: vec![BindingContext::synchronization("pods")],
        allow_failure: true,
        ..Default::default()
    });

    let result = operator.handle_task(task).await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(counter.get(), before + 1);
}

#[tokio::test]
async fn failing_module_hook_without_allow_failure_is_retried() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha").with_hook(
        "fail.sh",
        r#"if [ "$1" = "--config" ]; then echo '{"kubernetes": [{"apiVersion": "v1", "kind": "Pod"}]}'; exit 0; fi
exit 1"#,
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();
    operator.module_manager().register_module_hooks("alpha").await.unwrap();

    let task = Task::new(TaskType::ModuleHookRun).with_metadata(HookMetadata {
        module_name: Some("alpha".to_string()),
        hook_name: Some("alpha/fail.sh".to_string()),
        binding_type: Some(BindingType::OnKubernetesEvent),
        binding_context: vec![BindingContext::synchronization("pods")],
        allow_failure: false,
        ..Default::default()
    });

    let result = operator.handle_task(task).await;
    assert_eq!(result.status, TaskStatus::Fail);
}

#[tokio::test]
async fn schedule_event_lands_on_the_declared_queue() {
    let root = tempfile::tempdir().unwrap();
    write_global_hook(
        root.path(),
        "cron.sh",
        &marker_hook_body(
            r#"{"schedule": [{"crontab": "*/5 * * * *", "queue": "crontab"}]}"#,
            &root.path().join("unused"),
        ),
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    operator.handle_schedule_event("*/5 * * * *");
    // a tick that matches nothing queues nothing
    operator.handle_schedule_event("1 2 3 4 5");

    let queue = operator.queues().get("crontab").unwrap();
    assert_eq!(queue.length(), 1);
    let task = queue.peek().unwrap();
    assert_eq!(task.task_type(), TaskType::GlobalHookRun);
    assert_eq!(task.metadata().binding_type, Some(BindingType::Schedule));
}

#[tokio::test]
async fn kube_event_is_routed_to_the_declared_queue_until_disabled() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha").with_hook(
        "watcher.sh",
        &marker_hook_body(
            r#"{"kubernetes": [{"name": "pods", "apiVersion": "v1", "kind": "Pod", "queue": "pods"}]}"#,
            &root.path().join("unused"),
        ),
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();
    operator.module_manager().register_module_hooks("alpha").await.unwrap();

    let contexts = vec![BindingContext::new(BindingType::OnKubernetesEvent)];
    operator.handle_kube_event("alpha/watcher.sh", contexts.clone());

    let queue = operator.queues().get("pods").unwrap();
    assert_eq!(queue.length(), 1);
    assert_eq!(queue.peek().unwrap().task_type(), TaskType::ModuleHookRun);

    // a disabled module's bindings stop producing tasks
    operator.module_manager().disable_module_hooks("alpha");
    operator.handle_kube_event("alpha/watcher.sh", contexts);
    assert_eq!(queue.length(), 1);
}

#[tokio::test]
async fn after_helm_values_change_requeues_the_module_run() {
    let root = tempfile::tempdir().unwrap();
    ModuleFixture::new(root.path(), "010-alpha").with_hook(
        "after.sh",
        r#"if [ "$1" = "--config" ]; then echo '{"afterHelm": 1}'; exit 0; fi
echo '[{"op": "add", "path": "/alpha/fromHook", "value": 1}]' > "$VALUES_JSON_PATCH_PATH""#,
    );

    let (operator, _shutdown) = build_operator(root.path(), StubHelmClient::new(), StubKubeClient::new());
    operator.init().await.unwrap();

    let task = Task::new(TaskType::ModuleRun).with_metadata(HookMetadata {
        event_description: "Startup".to_string(),
        module_name: Some("alpha".to_string()),
        on_startup_hooks: true,
        ..Default::default()
    });

    let result = operator.handle_task(task).await;
    assert_eq!(result.status, TaskStatus::Success);

    // values changed: the same module runs again, without startup hooks
    assert_eq!(result.after_tasks.len(), 1);
    let requeued = &result.after_tasks[0];
    assert_eq!(requeued.task_type(), TaskType::ModuleRun);
    assert!(!requeued.metadata().on_startup_hooks);
    assert!(requeued.metadata().event_description.contains("AfterHelmHooksChangeModuleValues"));

    // the second run finds unchanged values and settles
    let result = operator.handle_task(result.after_tasks[0].clone()).await;
    assert_eq!(result.status, TaskStatus::Success);
    assert!(result.after_tasks.is_empty());
}
