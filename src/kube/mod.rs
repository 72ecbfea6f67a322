//! Kubernetes collaborator seam.
//!
//! The drift monitor only needs to resolve an apiVersion/kind pair to a
//! listable resource and count objects by name. [`KubeClient`] is that
//! surface; [`KubectlClient`] drives the `kubectl` binary and tests
//! substitute mocks.

mod kubectl;

pub use kubectl::KubectlClient;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// A resolved group/version/resource with its scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResource {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespaced: bool,
}

impl ApiResource {
    /// `resource.group` form accepted by listing tools, or the bare
    /// resource for the core group.
    pub fn qualified_resource(&self) -> String {
        if self.group.is_empty() {
            self.resource.clone()
        } else {
            format!("{}.{}", self.resource, self.group)
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Resolves the listable resource for an apiVersion/kind pair.
    async fn api_resource(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<ApiResource>;

    /// Counts objects of the resource with the given `metadata.name`,
    /// in a namespace or cluster-wide. An object is absent iff the
    /// count is zero.
    async fn count_objects_by_name<'a>(
        &self,
        resource: &ApiResource,
        namespace: Option<&'a str>,
        name: &str,
    ) -> Result<usize>;
}
