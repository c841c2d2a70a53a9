//! Idempotent publication of the priority ranking.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use spotprio_core::PriorityRanking;

use crate::error::ReconcileResult;
use crate::store::ConfigMapStore;

/// ConfigMap key read by the priority expander.
pub const PRIORITIES_KEY: &str = "priorities";

/// What a reconcile call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The ConfigMap did not exist and was created.
    Created,
    /// The stored priorities differed and were overwritten.
    Updated,
    /// The stored priorities already matched; nothing was written.
    Unchanged,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Render a ranking as YAML: one integer key per level, each holding the
/// sorted list of pool patterns.
pub fn serialize_ranking(ranking: &PriorityRanking) -> ReconcileResult<String> {
    Ok(serde_yaml::to_string(ranking)?)
}

/// Parse a ranking back from its YAML form.
pub fn parse_ranking(text: &str) -> ReconcileResult<PriorityRanking> {
    Ok(serde_yaml::from_str(text)?)
}

/// Keeps one ConfigMap's `priorities` key in sync with the ranking.
pub struct Reconciler {
    store: Arc<dyn ConfigMapStore>,
    name: String,
    namespace: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ConfigMapStore>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Make the ConfigMap's `priorities` equal to `ranking`.
    ///
    /// Writes at most once, and not at all when the stored text already
    /// matches. Store errors are returned as-is.
    pub async fn reconcile(&self, ranking: &PriorityRanking) -> ReconcileResult<ReconcileOutcome> {
        let rendered = serialize_ranking(ranking)?;

        let Some(mut existing) = self.store.get(&self.namespace, &self.name).await? else {
            let config_map = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(self.name.clone()),
                    namespace: Some(self.namespace.clone()),
                    ..Default::default()
                },
                data: Some(BTreeMap::from([(PRIORITIES_KEY.to_string(), rendered)])),
                ..Default::default()
            };
            self.store.create(&self.namespace, &config_map).await?;
            info!(name = %self.name, namespace = %self.namespace, "autoscaler ConfigMap created");
            return Ok(ReconcileOutcome::Created);
        };

        let current = existing
            .data
            .as_ref()
            .and_then(|data| data.get(PRIORITIES_KEY));
        if current == Some(&rendered) {
            info!(name = %self.name, "autoscaler ConfigMap already up to date");
            return Ok(ReconcileOutcome::Unchanged);
        }

        existing
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(PRIORITIES_KEY.to_string(), rendered);
        self.store.replace(&self.namespace, &existing).await?;
        info!(name = %self.name, namespace = %self.namespace, "autoscaler ConfigMap updated");
        Ok(ReconcileOutcome::Updated)
    }
}
