//! Helm collaborator seam.
//!
//! The operator only needs a narrow slice of Helm: render a chart,
//! inspect a release, upgrade or delete it. [`HelmClient`] is that
//! surface; [`HelmCli`] drives the `helm` binary for production use and
//! tests substitute mocks.

mod cli;
mod manifest;

pub use cli::HelmCli;
pub use manifest::Manifest;
pub use manifest::manifests_from_yaml_documents;


use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;
use crate::values::Values;

/// Release status that always forces an upgrade. Both a failed install
/// and a failed upgrade surface as this status.
pub const RELEASE_STATUS_FAILED: &str = "FAILED";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HelmClient: Send + Sync {
    async fn is_release_exists(
        &self,
        release_name: &str,
    ) -> Result<bool>;

    /// Revision and upper-cased status of the latest release revision.
    async fn last_release_status(
        &self,
        release_name: &str,
    ) -> Result<(String, String)>;

    /// User-supplied values stored in the release, including values set
    /// with `--set` on install or upgrade.
    async fn get_release_values(
        &self,
        release_name: &str,
    ) -> Result<Values>;

    /// Names of all releases in the operator namespace.
    async fn list_releases(&self) -> Result<Vec<String>>;

    /// Renders chart templates to a multi-document manifest string
    /// without touching the cluster.
    async fn render(
        &self,
        chart_path: &Path,
        values_paths: &[PathBuf],
        set_values: &[String],
        namespace: &str,
    ) -> Result<String>;

    async fn upgrade_release(
        &self,
        release_name: &str,
        chart_path: &Path,
        values_paths: &[PathBuf],
        set_values: &[String],
        namespace: &str,
    ) -> Result<()>;

    async fn delete_release(
        &self,
        release_name: &str,
    ) -> Result<()>;

    /// Removes a release whose only revision is FAILED, so the next
    /// install starts clean. Older failed revisions need no dedicated
    /// cleanup: every upgrade passes `--history-max`, which prunes
    /// history beyond the retained window.
    async fn delete_single_failed_revision(
        &self,
        release_name: &str,
    ) -> Result<()>;
}
