//! Placement score fetcher: chunking, throttling backoff, and caching.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use spotprio_core::ScoreMap;

use crate::api::{PlacementApi, PlacementRequest, PlacementResponse, bucket_score};
use crate::cache::PlacementCache;
use crate::error::{PlacementError, PlacementResult};
use crate::token::{AccessToken, TokenSource};

/// Maximum number of SKUs the upstream API accepts per request.
pub const CHUNK_SIZE: usize = 5;

/// Backoff for throttled (HTTP 429) chunk requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Wait after the first 429.
    pub initial_delay: Duration,
    /// Growth factor applied to the wait after each further 429.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(60),
            multiplier: 4,
        }
    }
}

/// Fetches placement scores, serving repeats from the shared cache.
pub struct PlacementFetcher {
    api: Arc<dyn PlacementApi>,
    tokens: Arc<dyn TokenSource>,
    cache: Arc<PlacementCache>,
    retry: RetryPolicy,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PlacementFetcher {
    pub fn new(
        api: Arc<dyn PlacementApi>,
        tokens: Arc<dyn TokenSource>,
        cache: Arc<PlacementCache>,
    ) -> Self {
        Self {
            api,
            tokens,
            cache,
            retry: RetryPolicy::default(),
            shutdown: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Abort backoff waits when `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn cache(&self) -> &Arc<PlacementCache> {
        &self.cache
    }

    /// Placement scores for `instance_types` in `region`, keyed by instance
    /// type then zone.
    ///
    /// All chunks must succeed; on any failure nothing is cached and the
    /// previously held entry stays as it was.
    pub async fn fetch(
        &self,
        region: &str,
        account: &str,
        instance_types: &[String],
    ) -> PlacementResult<ScoreMap> {
        let key = PlacementCache::cache_key(region, account, instance_types);
        if let Some(scores) = self.cache.get(&key).await {
            info!(%region, "returning placement scores from cache");
            return Ok(scores);
        }

        let mut sorted = instance_types.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let token = self.tokens.token().await?;
        let mut result = ScoreMap::new();

        for chunk in sorted.chunks(CHUNK_SIZE) {
            let request = PlacementRequest::for_chunk(region, chunk);
            let parsed = self.fetch_chunk(region, account, &token, &request).await?;
            debug!(%region, ?chunk, "fetched placement score chunk");

            for entry in parsed.placement_scores {
                result
                    .entry(entry.sku)
                    .or_default()
                    .insert(entry.availability_zone, bucket_score(&entry.score));
            }
        }

        self.cache.store(key, result.clone()).await;
        info!(%region, instances = result.len(), "placement scores fetched and cached");
        Ok(result)
    }

    async fn fetch_chunk(
        &self,
        region: &str,
        account: &str,
        token: &AccessToken,
        request: &PlacementRequest,
    ) -> PlacementResult<PlacementResponse> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;

        let response = loop {
            let response = self.api.generate(region, account, token, request).await?;
            if !response.is_rate_limited() {
                break response;
            }
            if attempt >= self.retry.max_attempts {
                return Err(PlacementError::RateLimited { attempts: attempt });
            }

            warn!(
                %region,
                attempt,
                delay_secs = delay.as_secs(),
                "placement API rate limited, backing off"
            );
            self.backoff(delay).await?;
            delay *= self.retry.multiplier;
            attempt += 1;
        };

        if !response.is_success() {
            return Err(PlacementError::Api {
                status: response.status,
                body: response.body,
            });
        }

        Ok(serde_json::from_str(&response.body)?)
    }

    async fn backoff(&self, delay: Duration) -> PlacementResult<()> {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        let mut shutdown = shutdown.clone();
        if *shutdown.borrow_and_update() {
            return Err(PlacementError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = shutdown.changed() => Err(PlacementError::Cancelled),
        }
    }
}
