//! Signal collectors: cluster pool inventory and spot market data.
//!
//! These are thin clients over Azure Resource Manager, the Resource Graph
//! and the public retail prices API. The cycle only sees the
//! [`PoolInventory`] and [`MarketSource`] traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use spotprio_core::signals::select_prices;
use spotprio_core::{CapacityKind, PoolDescriptor, RetailPriceItem, SignalError};
use spotprio_placement::{PlacementError, TokenSource};

const ARM_BASE_URL: &str = "https://management.azure.com";
const AKS_API_VERSION: &str = "2024-05-01";
const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";

/// Errors raised by the collectors.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Token(#[from] PlacementError),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl CollectorError {
    /// Credential failures stop the daemon; everything else waits for the
    /// next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectorError::Token(e) if e.is_fatal())
    }
}

/// Enumerates the candidate node pools of the cluster.
#[async_trait]
pub trait PoolInventory: Send + Sync {
    /// Cluster region and its eligible pools.
    async fn list_pools(&self) -> Result<(String, Vec<PoolDescriptor>), CollectorError>;
}

/// Per-instance-type market data.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// `(on_demand, spot)` hourly prices.
    async fn prices(&self, region: &str, instance: &str) -> Result<(f64, f64), CollectorError>;

    /// Raw eviction bucket such as `"0-5"`, empty when unknown.
    async fn eviction_bucket(&self, region: &str, instance: &str) -> Result<String, CollectorError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentPool {
    pub name: String,
    #[serde(default)]
    pub properties: AgentPoolProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProperties {
    pub vm_size: Option<String>,
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    pub scale_set_priority: Option<String>,
    pub mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentPoolList {
    #[serde(default)]
    value: Vec<AgentPool>,
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct ManagedCluster {
    location: String,
}

/// Keep pools that finished provisioning and map them to descriptors.
///
/// Pools spanning several zones are pinned to their first zone, since an
/// allocation lands in an arbitrary zone anyway. Regular system pools are
/// not candidates for the autoscaler and are dropped.
pub fn pools_from_agent_pools(agent_pools: Vec<AgentPool>) -> Vec<PoolDescriptor> {
    agent_pools
        .into_iter()
        .filter_map(|pool| {
            let props = pool.properties;
            if props.provisioning_state.as_deref() != Some("Succeeded") {
                return None;
            }
            let vm_size = props.vm_size?;
            let kind = if props.scale_set_priority.as_deref() == Some("Spot") {
                CapacityKind::Interruptible
            } else if props.mode.as_deref() == Some("System") {
                return None;
            } else {
                CapacityKind::Guaranteed
            };
            Some(PoolDescriptor {
                name: pool.name,
                instance_type: vm_size,
                zone: props.availability_zones.into_iter().next(),
                kind,
            })
        })
        .collect()
}

/// [`PoolInventory`] reading an AKS cluster through ARM.
pub struct ArmPoolInventory {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
    subscription_id: String,
    resource_group: String,
    cluster_name: String,
}

impl ArmPoolInventory {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
        timeout: Duration,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            tokens,
            base_url: ARM_BASE_URL.to_string(),
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            cluster_name: cluster_name.to_string(),
        })
    }

    fn cluster_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}",
            self.base_url, self.subscription_id, self.resource_group, self.cluster_name
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        bearer: &str,
    ) -> Result<T, CollectorError> {
        let response = self.client.get(url).bearer_auth(bearer).send().await?;
        if !response.status().is_success() {
            return Err(CollectorError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| CollectorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PoolInventory for ArmPoolInventory {
    async fn list_pools(&self) -> Result<(String, Vec<PoolDescriptor>), CollectorError> {
        let token = self.tokens.token().await?;

        let cluster_url = format!("{}?api-version={AKS_API_VERSION}", self.cluster_url());
        let cluster: ManagedCluster = self.get_json(&cluster_url, token.secret()).await?;

        let mut agent_pools = Vec::new();
        let mut next = Some(format!(
            "{}/agentPools?api-version={AKS_API_VERSION}",
            self.cluster_url()
        ));
        while let Some(url) = next {
            let page: AgentPoolList = self.get_json(&url, token.secret()).await?;
            agent_pools.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        let pools = pools_from_agent_pools(agent_pools);
        info!(region = %cluster.location, pools = pools.len(), "listed node pools");
        Ok((cluster.location, pools))
    }
}

/// [`MarketSource`] backed by the retail prices API and Resource Graph.
pub struct AzureMarket {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    prices_url: String,
    graph_url: String,
    subscription_id: String,
}

#[derive(Deserialize)]
struct RetailPriceList {
    #[serde(rename = "Items", default)]
    items: Vec<RetailPriceItem>,
}

#[derive(Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl AzureMarket {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        prices_url: &str,
        subscription_id: &str,
        timeout: Duration,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            tokens,
            prices_url: prices_url.to_string(),
            graph_url: format!(
                "{ARM_BASE_URL}/providers/Microsoft.ResourceGraph/resources?api-version={RESOURCE_GRAPH_API_VERSION}"
            ),
            subscription_id: subscription_id.to_string(),
        })
    }
}

/// OData filter selecting Linux consumption prices for one SKU.
pub fn price_filter(region: &str, instance: &str) -> String {
    format!(
        "serviceName eq 'Virtual Machines' and priceType eq 'Consumption' and armSkuName eq '{instance}' and armRegionName eq '{region}'"
    )
}

/// Percent-encode a query value, spaces as `%20`.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Resource Graph query for the eviction rate bucket of one SKU.
pub fn eviction_query(region: &str, instance: &str) -> String {
    format!(
        "spotresources | where type =~ 'microsoft.compute/skuspotevictionrate/location' | where sku.name == '{}' | where location == '{region}' | project spotEvictionRate = properties.evictionRate",
        instance.to_lowercase()
    )
}

#[async_trait]
impl MarketSource for AzureMarket {
    async fn prices(&self, region: &str, instance: &str) -> Result<(f64, f64), CollectorError> {
        let url = format!(
            "{}?$filter={}",
            self.prices_url,
            encode_query_value(&price_filter(region, instance))
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CollectorError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        let list: RetailPriceList = response
            .json()
            .await
            .map_err(|e| CollectorError::Decode(e.to_string()))?;

        debug!(%region, %instance, items = list.items.len(), "fetched retail prices");
        Ok(select_prices(&list.items))
    }

    async fn eviction_bucket(&self, region: &str, instance: &str) -> Result<String, CollectorError> {
        let token = self.tokens.token().await?;
        let body = serde_json::json!({
            "subscriptions": [self.subscription_id],
            "query": eviction_query(region, instance),
            "options": { "resultFormat": "objectArray" },
        });

        let response = self
            .client
            .post(&self.graph_url)
            .bearer_auth(token.secret())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CollectorError::Status {
                url: self.graph_url.clone(),
                status: response.status().as_u16(),
            });
        }
        let parsed: GraphResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::Decode(e.to_string()))?;

        let Some(first) = parsed.data.first() else {
            return Ok(String::new());
        };
        first
            .get("spotEvictionRate")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CollectorError::Decode("spotEvictionRate missing or not a string".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_pool(json: serde_json::Value) -> AgentPool {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn keeps_spot_and_user_pools() {
        let pools = pools_from_agent_pools(vec![
            agent_pool(serde_json::json!({
                "name": "spotd4",
                "properties": {
                    "vmSize": "Standard_D4s_v5",
                    "provisioningState": "Succeeded",
                    "availabilityZones": ["2", "3"],
                    "scaleSetPriority": "Spot",
                    "mode": "User"
                }
            })),
            agent_pool(serde_json::json!({
                "name": "general",
                "properties": {
                    "vmSize": "Standard_D4s_v5",
                    "provisioningState": "Succeeded",
                    "mode": "User"
                }
            })),
        ]);

        assert_eq!(
            pools,
            vec![
                PoolDescriptor {
                    name: "spotd4".to_string(),
                    instance_type: "Standard_D4s_v5".to_string(),
                    zone: Some("2".to_string()),
                    kind: CapacityKind::Interruptible,
                },
                PoolDescriptor {
                    name: "general".to_string(),
                    instance_type: "Standard_D4s_v5".to_string(),
                    zone: None,
                    kind: CapacityKind::Guaranteed,
                },
            ]
        );
    }

    #[test]
    fn drops_system_and_unprovisioned_pools() {
        let pools = pools_from_agent_pools(vec![
            agent_pool(serde_json::json!({
                "name": "system",
                "properties": {"vmSize": "Standard_D2s_v5", "provisioningState": "Succeeded", "mode": "System"}
            })),
            agent_pool(serde_json::json!({
                "name": "creating",
                "properties": {"vmSize": "Standard_D2s_v5", "provisioningState": "Creating", "scaleSetPriority": "Spot"}
            })),
            agent_pool(serde_json::json!({"name": "bare"})),
        ]);
        assert!(pools.is_empty());
    }

    #[test]
    fn filter_is_percent_encoded_with_spaces() {
        let encoded = encode_query_value(&price_filter("westeurope", "Standard_D4s_v5"));
        assert!(encoded.starts_with("serviceName%20eq%20%27Virtual%20Machines%27"));
        assert!(!encoded.contains('+'));
        assert!(encoded.ends_with("armRegionName%20eq%20%27westeurope%27"));
    }

    #[test]
    fn eviction_query_lowercases_sku() {
        let query = eviction_query("westeurope", "Standard_D4s_v5");
        assert!(query.contains("sku.name == 'standard_d4s_v5'"));
        assert!(query.contains("location == 'westeurope'"));
    }

    #[test]
    fn credential_errors_are_fatal() {
        let err = CollectorError::Token(PlacementError::Credential("x".to_string()));
        assert!(err.is_fatal());
        let err = CollectorError::Status { url: "u".to_string(), status: 503 };
        assert!(!err.is_fatal());
    }
}
