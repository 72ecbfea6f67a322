//! Operator Error Hierarchy
//!
//! Error types for the module lifecycle engine, categorized by the
//! subsystem that produced them. Registration errors are permanent and
//! abort startup; everything else surfaces through task results and the
//! queue retry machinery.

use std::path::PathBuf;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem and process level failures (tempfiles, child processes)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Module discovery and static values loading failures
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Values merging, serialization and patch failures
    #[error(transparent)]
    Values(#[from] ValuesError),

    /// Hook execution failures
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Helm client failures
    #[error(transparent)]
    Helm(#[from] HelmError),

    /// Kubernetes client failures
    #[error(transparent)]
    Kube(#[from] KubeError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("io error on '{path}': {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("list modules directory '{path}': {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Module directories must match `NNN-<name>`; anything else is a
    /// registration error, not a skip.
    #[error("modules directory contains directories not matching 'NNN-name': {0}")]
    InvalidModuleDirs(String),

    #[error("module '{module}' static values: {source}")]
    StaticValues {
        module: String,
        #[source]
        source: Box<ValuesError>,
    },

    #[error("common static values '{path}': {source}")]
    CommonStaticValues {
        path: PathBuf,
        #[source]
        source: Box<ValuesError>,
    },

    #[error("unknown module '{0}'")]
    UnknownModule(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ValuesError {
    #[error("bad values data: {0}")]
    BadData(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("unsupported patch operation '{0}'")]
    UnsupportedPatchOp(String),

    #[error("unacceptable patch path '{path}' (only '{acceptable}' accepted)")]
    UnacceptablePatchPath { path: String, acceptable: String },

    #[error("patch target '{path}' not found")]
    PatchTargetMissing { path: String },

    #[error("bad json-patch data: {0}")]
    BadPatchData(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("non-executable hook '{0}'")]
    NonExecutable(PathBuf),

    #[error("spawn hook '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("hook '{hook}' exited with code {code}")]
    NonZeroExit { hook: String, code: i32 },

    #[error("hook '{hook}' terminated by signal")]
    Terminated { hook: String },

    #[error("hook '{hook}' config: {reason}")]
    BadConfig { hook: String, reason: String },

    #[error("enabled script result: expected 'true' or 'false', got '{0}'")]
    BadEnabledResult(String),

    #[error("unknown hook '{0}'")]
    UnknownHook(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HelmError {
    #[error("helm command failed: {0}")]
    Command(String),

    #[error("release '{release}': {reason}")]
    Release { release: String, reason: String },

    #[error("bad rendered manifest: {0}")]
    BadManifest(String),
}

#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    #[error("discover api resource for apiVersion '{api_version}' kind '{kind}': {reason}")]
    ApiResource {
        api_version: String,
        kind: String,
        reason: String,
    },

    #[error("list objects of '{resource}': {reason}")]
    List { resource: String, reason: String },

    #[error("kubernetes command failed: {0}")]
    Command(String),
}
