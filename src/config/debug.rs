use serde::Deserialize;
use serde::Serialize;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DebugConfig {
    /// Keep hook tempfiles after each invocation instead of removing
    /// them, for inspecting what a hook actually received.
    #[serde(default)]
    pub keep_tmp_files: bool,
}
