//! # module-engine
//!
//! A Kubernetes operator runtime that manages a catalog of modules,
//! each backed by a Helm chart and a set of executable hooks.
//!
//! ## Features
//! - **Event driven**: external events become ordered tasks on named queues
//! - **Idempotent releases**: a Helm upgrade runs only when the rendered
//!   manifests checksum actually changes
//! - **Layered values**: static defaults, the configuration store and
//!   in-memory hook patches merge into one view per module
//! - **Drift detection**: background monitors requeue a module when its
//!   released resources disappear
//! - **Observability**: tracing logs and prometheus metrics
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//!
//! use module_engine::config::OperatorConfig;
//! use module_engine::core::Operator;
//! use module_engine::helm::HelmCli;
//! use module_engine::kube::KubectlClient;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> module_engine::Result<()> {
//!     let settings = OperatorConfig::new()?;
//!     let (_graceful_tx, graceful_rx) = watch::channel(());
//!
//!     let helm = Arc::new(HelmCli::new(&settings.helm));
//!     let kube = Arc::new(KubectlClient::new());
//!     let operator = Arc::new(Operator::new(Arc::new(settings), helm, kube, graceful_rx));
//!
//!     operator.init().await?;
//!     operator.start();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod helm;
pub mod hook;
pub mod kube;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod task;
pub mod utils;
pub mod values;

mod constants;
mod errors;

#[cfg(test)]
pub(crate) mod test_utils;

pub use constants::*;
pub use errors::*;
