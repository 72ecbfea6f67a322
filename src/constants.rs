/// Name of the queue that serializes every module lifecycle transition.
pub const MAIN_QUEUE_NAME: &str = "main";

/// Synthetic release value that carries the rendered-manifests checksum
/// between operator restarts.
pub const MODULE_CHECKSUM_VALUE_KEY: &str = "_addonOperatorModuleChecksum";

// -
// Values layout

/// Top level section shared by every module and global hook.
pub const GLOBAL_VALUES_KEY: &str = "global";

/// Key under the global section that lists enabled modules in order.
pub const ENABLED_MODULES_KEY: &str = "enabledModules";

/// Suffix of the top level keys that toggle modules on and off.
pub const ENABLED_KEY_SUFFIX: &str = "Enabled";

// -
// Module directory layout

pub const CHART_FILE_NAME: &str = "Chart.yaml";
pub const VALUES_FILE_NAME: &str = "values.yaml";
pub const ENABLED_SCRIPT_NAME: &str = "enabled";
pub const HOOKS_DIR_NAME: &str = "hooks";

// -
// Environment

pub const MODULES_DIR_ENV: &str = "MODULES_DIR";
pub const GLOBAL_HOOKS_DIR_ENV: &str = "GLOBAL_HOOKS_DIR";

// -
// Hook process contract

pub const CONFIG_VALUES_PATH_ENV: &str = "CONFIG_VALUES_PATH";
pub const VALUES_PATH_ENV: &str = "VALUES_PATH";
pub const BINDING_CONTEXT_PATH_ENV: &str = "BINDING_CONTEXT_PATH";
pub const VALUES_JSON_PATCH_PATH_ENV: &str = "VALUES_JSON_PATCH_PATH";
pub const MODULE_ENABLED_RESULT_ENV: &str = "MODULE_ENABLED_RESULT";
