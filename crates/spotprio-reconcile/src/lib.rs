//! spotprio-reconcile: publish the priority ranking to the cluster.
//!
//! The cluster-autoscaler priority expander reads its configuration from
//! the `priorities` key of a ConfigMap. This crate keeps that key equal to
//! the freshly computed ranking, writing only when the text changes so
//! that watchers of the ConfigMap are not woken up on every cycle.
//!
//! # Components
//!
//! - **`store`**: [`ConfigMapStore`] seam, with a kube-backed and an
//!   in-memory implementation
//! - **`reconciler`**: [`Reconciler`]: serialize, diff, create/update

pub mod error;
pub mod reconciler;
pub mod store;

pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{PRIORITIES_KEY, ReconcileOutcome, Reconciler, parse_ranking, serialize_ranking};
pub use store::{ConfigMapStore, KubeConfigMapStore, MemoryConfigMapStore};
