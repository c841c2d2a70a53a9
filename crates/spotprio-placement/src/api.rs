//! Wire types and transport for the spot placement score API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlacementResult;
use crate::token::AccessToken;

const ARM_BASE_URL: &str = "https://management.azure.com";
const API_VERSION: &str = "2025-02-01-preview";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredSize {
    pub sku: String,
}

/// Body of one placement score request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    pub availability_zones: String,
    pub desired_count: String,
    pub desired_locations: Vec<String>,
    pub desired_sizes: Vec<DesiredSize>,
}

impl PlacementRequest {
    /// Zonal request for a single instance of each SKU in `region`.
    pub fn for_chunk(region: &str, skus: &[String]) -> Self {
        Self {
            availability_zones: "true".to_string(),
            desired_count: "1".to_string(),
            desired_locations: vec![region.to_string()],
            desired_sizes: skus.iter().map(|sku| DesiredSize { sku: sku.clone() }).collect(),
        }
    }

    pub fn skus(&self) -> impl Iterator<Item = &str> {
        self.desired_sizes.iter().map(|s| s.sku.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResponse {
    #[serde(default)]
    pub placement_scores: Vec<PlacementScoreEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementScoreEntry {
    pub sku: String,
    #[serde(default)]
    pub availability_zone: String,
    pub score: String,
}

/// Map a score bucket to its numeric value. Unknown buckets score 0.
pub fn bucket_score(bucket: &str) -> u8 {
    match bucket {
        "Low" => 25,
        "Medium" => 50,
        "High" => 100,
        _ => 0,
    }
}

/// Raw status and body of a placement call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Transport for placement score requests.
///
/// Implementations return every HTTP status as an [`ApiResponse`]; only
/// transport failures are errors. Retrying is the fetcher's job.
#[async_trait]
pub trait PlacementApi: Send + Sync {
    async fn generate(
        &self,
        region: &str,
        account: &str,
        token: &AccessToken,
        request: &PlacementRequest,
    ) -> PlacementResult<ApiResponse>;
}

/// [`PlacementApi`] over HTTPS against Azure Resource Manager.
#[derive(Debug, Clone)]
pub struct ArmPlacementClient {
    base_url: String,
    client: reqwest::Client,
}

impl ArmPlacementClient {
    pub fn new(timeout: Duration) -> PlacementResult<Self> {
        Self::with_base_url(ARM_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> PlacementResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, region: &str, account: &str) -> String {
        format!(
            "{}/subscriptions/{account}/providers/Microsoft.Compute/locations/{region}/placementScores/spot/generate?api-version={API_VERSION}",
            self.base_url
        )
    }
}

#[async_trait]
impl PlacementApi for ArmPlacementClient {
    async fn generate(
        &self,
        region: &str,
        account: &str,
        token: &AccessToken,
        request: &PlacementRequest,
    ) -> PlacementResult<ApiResponse> {
        let response = self
            .client
            .post(self.url(region, account))
            .bearer_auth(token.secret())
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_values() {
        assert_eq!(bucket_score("Low"), 25);
        assert_eq!(bucket_score("Medium"), 50);
        assert_eq!(bucket_score("High"), 100);
        assert_eq!(bucket_score("DataNotFoundOrStale"), 0);
    }

    #[test]
    fn request_serializes_in_wire_shape() {
        let req = PlacementRequest::for_chunk("westeurope", &["Standard_D4s_v5".to_string()]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "availabilityZones": "true",
                "desiredCount": "1",
                "desiredLocations": ["westeurope"],
                "desiredSizes": [{"sku": "Standard_D4s_v5"}],
            })
        );
    }

    #[test]
    fn response_parses() {
        let body = r#"{"placementScores":[{"sku":"Standard_D4s_v5","region":"westeurope","availabilityZone":"1","score":"High","isQuotaAvailable":true}]}"#;
        let parsed: PlacementResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.placement_scores.len(), 1);
        assert_eq!(parsed.placement_scores[0].availability_zone, "1");
        assert_eq!(parsed.placement_scores[0].score, "High");
    }

    #[test]
    fn arm_url_includes_account_and_region() {
        let client = ArmPlacementClient::with_base_url("http://localhost:9/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("westeurope", "sub-1"),
            "http://localhost:9/subscriptions/sub-1/providers/Microsoft.Compute/locations/westeurope/placementScores/spot/generate?api-version=2025-02-01-preview"
        );
    }
}
