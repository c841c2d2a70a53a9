//! Bearer token sources for Azure Resource Manager calls.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{PlacementError, PlacementResult};

const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const ARM_RESOURCE: &str = "https://management.azure.com/";

/// An opaque bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Something that can hand out a fresh ARM bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> PlacementResult<AccessToken>;
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(AccessToken::new(secret))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> PlacementResult<AccessToken> {
        Ok(self.0.clone())
    }
}

/// Managed identity token from the instance metadata service.
#[derive(Debug, Clone)]
pub struct ManagedIdentityToken {
    client: reqwest::Client,
    endpoint: String,
    /// User-assigned identity; `None` uses the system-assigned one.
    client_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ManagedIdentityToken {
    pub fn new(client_id: Option<String>) -> PlacementResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PlacementError::Credential(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: IMDS_TOKEN_URL.to_string(),
            client_id: client_id.filter(|id| !id.is_empty()),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityToken {
    async fn token(&self) -> PlacementResult<AccessToken> {
        let mut query = vec![("api-version", "2018-02-01"), ("resource", ARM_RESOURCE)];
        if let Some(id) = &self.client_id {
            query.push(("client_id", id.as_str()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|e| PlacementError::Credential(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlacementError::Credential(format!(
                "identity endpoint returned {}",
                response.status()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlacementError::Credential(e.to_string()))?;

        debug!("acquired managed identity token");
        Ok(AccessToken::new(parsed.access_token))
    }
}
