//! Autoscale Reconciler - instance and trigger management over ScaledObjects
//!
//! Each autoscaling instance is backed by exactly one ScaledObject in the
//! cluster. This crate maps triggers onto that object and implements the
//! instance/trigger operations as optimistic read-modify-write cycles.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use autoscale_reconciler::k8s_client::{ClusterClients, ClusterSettings};
//! use autoscale_reconciler::store::KubeStore;
//! use autoscale_reconciler::{ListTriggersArgs, Reconciler, ReconcilerConfig};
//!
//! # async fn example() -> Result<(), autoscale_reconciler::ReconcileError> {
//! let clients = Arc::new(ClusterClients::new(ClusterSettings::new("default")));
//! let reconciler = Reconciler::new(Arc::new(KubeStore::new(clients)), ReconcilerConfig::default());
//!
//! let triggers = reconciler
//!     .list_triggers(ListTriggersArgs { instance: "web1".to_string() })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod crd;
pub mod error;
pub mod k8s_client;
pub mod mapper;
pub mod memory;
pub mod names;
pub mod reconciler;
pub mod store;
pub mod types;

// Re-export key types for convenience
pub use error::{ErrorKind, ReconcileError};
pub use mapper::UpsertOutcome;
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use types::*;
