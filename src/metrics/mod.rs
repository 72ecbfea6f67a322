
use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::core::ModuleManager;
use crate::monitor::ResourcesMonitorManager;

lazy_static! {
    pub static ref LIVE_TICKS: IntCounter =
        IntCounter::new("live_ticks", "Operator liveness ticks").expect("metric can not be created");
    pub static ref TASKS_QUEUE_LENGTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("tasks_queue_length", "Number of tasks waiting in a queue"),
        &["queue"]
    )
    .expect("metric can not be created");
    pub static ref GLOBAL_HOOK_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("global_hook_errors", "Global hook failures that trigger a retry"),
        &["hook"]
    )
    .expect("metric can not be created");
    pub static ref GLOBAL_HOOK_ALLOWED_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "global_hook_allowed_errors",
            "Global hook failures tolerated by allowFailure"
        ),
        &["hook"]
    )
    .expect("metric can not be created");
    pub static ref MODULE_HOOK_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("module_hook_errors", "Module hook failures that trigger a retry"),
        &["module", "hook"]
    )
    .expect("metric can not be created");
    pub static ref MODULE_HOOK_ALLOWED_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "module_hook_allowed_errors",
            "Module hook failures tolerated by allowFailure"
        ),
        &["module", "hook"]
    )
    .expect("metric can not be created");
    pub static ref MODULE_RUN_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("module_run_errors", "ModuleRun task failures"),
        &["module"]
    )
    .expect("metric can not be created");
    pub static ref MODULE_DELETE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("module_delete_errors", "ModuleDelete task failures"),
        &["module"]
    )
    .expect("metric can not be created");
    pub static ref MODULES_DISCOVER_ERRORS: IntCounter = IntCounter::new(
        "modules_discover_errors",
        "DiscoverModulesState failures and retries"
    )
    .expect("metric can not be created");
    pub static ref CUSTOM_REGISTRY: Registry =
        Registry::new_custom(Some("module_engine".to_string()), None).expect("registry can be created");
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(LIVE_TICKS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(TASKS_QUEUE_LENGTH.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(GLOBAL_HOOK_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(GLOBAL_HOOK_ALLOWED_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MODULE_HOOK_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MODULE_HOOK_ALLOWED_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MODULE_RUN_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MODULE_DELETE_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MODULES_DISCOVER_ERRORS.clone()))
        .expect("collector can be registered");
}

/// Serves `/metrics` plus the read-only debug endpoints over the
/// operator state, shut down together with everything else.
pub async fn start_server(
    port: u16,
    manager: Arc<ModuleManager>,
    monitors: Arc<ResourcesMonitorManager>,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&CUSTOM_REGISTRY);

    let registry = CUSTOM_REGISTRY.clone();
    let metrics_route = warp::path!("metrics").map(move || registry.clone()).and_then(metrics_handler);

    let global_manager = manager.clone();
    let global_values_route = warp::path!("global" / "values.json").map(move || {
        match global_manager.global_values() {
            Ok(values) => warp::reply::json(values.as_map()).into_response(),
            Err(e) => error_response(e.to_string()),
        }
    });

    let list_manager = manager.clone();
    let module_list_route = warp::path!("module" / "list.json")
        .map(move || warp::reply::json(&list_manager.module_names_in_order()).into_response());

    let values_manager = manager.clone();
    let module_values_route =
        warp::path!("module" / String / "values.json").map(move |module_name: String| {
            if !values_manager.has_module(&module_name) {
                return not_found_response();
            }
            match values_manager.module_values(&module_name) {
                Ok(values) => warp::reply::json(values.as_map()).into_response(),
                Err(e) => error_response(e.to_string()),
            }
        });

    let monitor_route = warp::path!("module" / "resource-monitor.json").map(move || {
        let dump: HashMap<String, Vec<String>> = monitors.monitored_ids();
        warp::reply::json(&dump).into_response()
    });

    let routes = metrics_route
        .or(global_values_route)
        .or(module_list_route)
        .or(monitor_route)
        .or(module_values_route);

    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        return Ok(format!("encode metrics: {e}"));
    }

    Ok(String::from_utf8(buffer).unwrap_or_default())
}

fn error_response(message: String) -> warp::reply::Response {
    warp::reply::with_status(message, warp::http::StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn not_found_response() -> warp::reply::Response {
    warp::reply::with_status("Module not found".to_string(), warp::http::StatusCode::NOT_FOUND)
        .into_response()
}
