//! spotprio.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "spotprio.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotprioConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub api: ApiConfig,
    pub time: TimeConfig,
    pub configmap: ConfigMapConfig,
    pub azure: AzureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Retail prices endpoint.
    pub url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://prices.azure.com/api/retail/prices".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Reconciliation interval in seconds.
    pub interval: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { interval: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMapConfig {
    pub name: String,
    pub namespace: String,
}

impl Default for ConfigMapConfig {
    fn default() -> Self {
        Self {
            name: "cluster-autoscaler-priority-expander".to_string(),
            namespace: "kube-system".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    /// Client id of the user-assigned managed identity.
    pub client_id: String,
}

impl SpotprioConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The explicit `path` if given, else the first existing file on the
    /// search path.
    pub fn locate(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(p) => Some(p.to_path_buf()),
            None => search_paths().into_iter().find(|p| p.is_file()),
        }
    }

    /// Load from `path`, or start from defaults when there is no file.
    ///
    /// Environment overrides are applied and the result validated before
    /// returning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment-style variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = lookup(key).filter(|v| !v.is_empty()) {
                *target = v;
            }
        };

        set(&mut self.logging.level, "LOGGING_LEVEL");
        set(&mut self.metrics.addr, "METRICS_ADDR");
        set(&mut self.api.url, "API_URL");
        set(&mut self.configmap.name, "CONFIGMAP_NAME");
        set(&mut self.configmap.namespace, "CONFIGMAP_NAMESPACE");
        set(&mut self.azure.subscription_id, "SUBSCRIPTION_ID");
        set(&mut self.azure.resource_group, "RESOURCE_GROUP");
        set(&mut self.azure.cluster_name, "CLUSTER_NAME");
        set(&mut self.azure.client_id, "AZURE_CLIENT_ID");

        if let Some(interval) = lookup("TIME_INTERVAL").and_then(|v| v.parse().ok()) {
            self.time.interval = interval;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.azure.subscription_id, "subscription_id"),
            (&self.azure.resource_group, "resource_group"),
            (&self.azure.cluster_name, "cluster_name"),
            (&self.azure.client_id, "client_id"),
            (&self.configmap.name, "configmap.name"),
            (&self.configmap.namespace, "configmap.namespace"),
        ];
        for (value, key) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        if self.time.interval == 0 {
            return Err(ConfigError::Invalid {
                key: "time.interval",
                reason: "must be at least one second".to_string(),
            });
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.time.interval)
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".").join(CONFIG_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join("spotprio").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/spotprio").join(CONFIG_FILE_NAME));
    paths
}
