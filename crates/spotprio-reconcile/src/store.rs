//! ConfigMap access used by the reconciler.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use kube::api::{Api, PostParams};
use tracing::debug;

use crate::error::{ReconcileError, ReconcileResult};

/// Read and write access to namespaced ConfigMaps.
#[async_trait]
pub trait ConfigMapStore: Send + Sync {
    /// Fetch a ConfigMap, `None` if it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> ReconcileResult<Option<ConfigMap>>;

    async fn create(&self, namespace: &str, config_map: &ConfigMap) -> ReconcileResult<()>;

    /// Replace an existing ConfigMap. The name is taken from its metadata.
    async fn replace(&self, namespace: &str, config_map: &ConfigMap) -> ReconcileResult<()>;
}

/// [`ConfigMapStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeConfigMapStore {
    client: Client,
}

impl KubeConfigMapStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig.
    pub async fn infer() -> ReconcileResult<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn name_of(config_map: &ConfigMap) -> ReconcileResult<&str> {
    config_map
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ReconcileError::Store("ConfigMap has no name".to_string()))
}

#[async_trait]
impl ConfigMapStore for KubeConfigMapStore {
    async fn get(&self, namespace: &str, name: &str) -> ReconcileResult<Option<ConfigMap>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, config_map: &ConfigMap) -> ReconcileResult<()> {
        self.api(namespace)
            .create(&PostParams::default(), config_map)
            .await?;
        debug!(%namespace, name = ?config_map.metadata.name, "ConfigMap created");
        Ok(())
    }

    async fn replace(&self, namespace: &str, config_map: &ConfigMap) -> ReconcileResult<()> {
        let name = name_of(config_map)?;
        self.api(namespace)
            .replace(name, &PostParams::default(), config_map)
            .await?;
        debug!(%namespace, %name, "ConfigMap replaced");
        Ok(())
    }
}

/// In-memory [`ConfigMapStore`] that counts writes.
#[derive(Default)]
pub struct MemoryConfigMapStore {
    maps: Mutex<BTreeMap<(String, String), ConfigMap>>,
    writes: AtomicUsize,
}

impl MemoryConfigMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create and replace calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a ConfigMap without counting it as a write.
    pub fn insert(&self, namespace: &str, config_map: ConfigMap) -> ReconcileResult<()> {
        let name = name_of(&config_map)?.to_string();
        self.lock()?.insert((namespace.to_string(), name), config_map);
        Ok(())
    }

    fn lock(&self) -> ReconcileResult<std::sync::MutexGuard<'_, BTreeMap<(String, String), ConfigMap>>> {
        self.maps
            .lock()
            .map_err(|_| ReconcileError::Store("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl ConfigMapStore for MemoryConfigMapStore {
    async fn get(&self, namespace: &str, name: &str) -> ReconcileResult<Option<ConfigMap>> {
        Ok(self
            .lock()?
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, namespace: &str, config_map: &ConfigMap) -> ReconcileResult<()> {
        let name = name_of(config_map)?.to_string();
        let mut maps = self.lock()?;
        let key = (namespace.to_string(), name);
        if maps.contains_key(&key) {
            return Err(ReconcileError::Store(format!("{}/{} already exists", key.0, key.1)));
        }
        maps.insert(key, config_map.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace(&self, namespace: &str, config_map: &ConfigMap) -> ReconcileResult<()> {
        let name = name_of(config_map)?.to_string();
        let mut maps = self.lock()?;
        let key = (namespace.to_string(), name);
        if !maps.contains_key(&key) {
            return Err(ReconcileError::Store(format!("{}/{} not found", key.0, key.1)));
        }
        maps.insert(key, config_map.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
