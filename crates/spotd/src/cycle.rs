//! The reconciliation cycle: collect signals, score, publish.
//!
//! One cycle runs start to finish before the next one is scheduled.
//! Within a cycle every record is collected before scoring starts, and
//! the reconciler only ever sees a complete ranking.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use spotprio_core::signals::{discount, parse_eviction_bucket};
use spotprio_core::{
    CapacityKind, MarketSignals, PoolDescriptor, PriorityRanking, PriorityScorer, ScoreMap,
    SignalSet, assemble_records,
};
use spotprio_metrics::SpotGauges;
use spotprio_placement::{PlacementError, PlacementFetcher};
use spotprio_reconcile::{ReconcileError, ReconcileOutcome, Reconciler};

use crate::collectors::{CollectorError, MarketSource, PoolInventory};

/// Why a cycle ended early.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to list node pools: {0}")]
    Inventory(CollectorError),

    #[error("failed to collect market data: {0}")]
    Market(CollectorError),

    #[error("failed to get placement scores: {0}")]
    Placement(#[from] PlacementError),

    #[error("failed to update autoscaler ConfigMap: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl CycleError {
    /// Fatal errors stop the daemon instead of waiting for the next cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            CycleError::Inventory(e) | CycleError::Market(e) => e.is_fatal(),
            CycleError::Placement(e) => e.is_fatal(),
            CycleError::Reconcile(_) => false,
        }
    }
}

/// What one successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub region: String,
    pub records: SignalSet,
    pub ranking: PriorityRanking,
    pub outcome: ReconcileOutcome,
}

/// Everything a cycle needs, constructed once and reused.
pub struct Cycle {
    inventory: Arc<dyn PoolInventory>,
    market: Arc<dyn MarketSource>,
    fetcher: PlacementFetcher,
    scorer: PriorityScorer,
    reconciler: Reconciler,
    gauges: SpotGauges,
    /// Subscription the placement scores are requested for.
    account: String,
}

impl Cycle {
    pub fn new(
        inventory: Arc<dyn PoolInventory>,
        market: Arc<dyn MarketSource>,
        fetcher: PlacementFetcher,
        reconciler: Reconciler,
        gauges: SpotGauges,
        account: impl Into<String>,
    ) -> Self {
        Self {
            inventory,
            market,
            fetcher,
            scorer: PriorityScorer::default(),
            reconciler,
            gauges,
            account: account.into(),
        }
    }

    /// Run a single cycle.
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        let (region, pools) = self
            .inventory
            .list_pools()
            .await
            .map_err(CycleError::Inventory)?;

        let instance_types: Vec<String> = pools
            .iter()
            .map(|p| p.instance_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let placement = self
            .fetcher
            .fetch(&region, &self.account, &instance_types)
            .await?;

        // Guaranteed pools score from a fixed baseline, but their market
        // gauges are still published.
        let mut market = BTreeMap::new();
        for instance in &instance_types {
            match self.collect_market(&region, instance).await {
                Ok(signals) => {
                    market.insert(instance.clone(), signals);
                }
                Err(e) if e.is_fatal() => return Err(CycleError::Market(e)),
                Err(e) => {
                    warn!(%region, %instance, error = %e, "skipping instance type this cycle");
                }
            }
        }

        self.record_placement(&region, &pools, &placement).await;

        let records = assemble_records(&pools, &market, &placement);
        let ranking = self.scorer.rank(&records);
        let outcome = self.reconciler.reconcile(&ranking).await?;

        info!(
            %region,
            pools = records.len(),
            levels = ranking.len(),
            outcome = outcome.as_str(),
            "cycle complete"
        );

        Ok(CycleReport {
            region,
            records,
            ranking,
            outcome,
        })
    }

    async fn collect_market(&self, region: &str, instance: &str) -> Result<MarketSignals, CollectorError> {
        info!(%region, %instance, "fetching current spot prices");
        let (on_demand, spot) = self.market.prices(region, instance).await?;

        info!(%region, %instance, "fetching current eviction rate");
        let bucket = self.market.eviction_bucket(region, instance).await?;
        let eviction_percent = parse_eviction_bucket(&bucket)?;

        let signals = MarketSignals {
            on_demand_price: on_demand,
            spot_price: spot,
            eviction_percent,
        };
        self.gauges
            .record_prices(region, instance, on_demand, spot, discount(on_demand, spot))
            .await;
        self.gauges
            .record_eviction_rate(region, instance, signals.eviction_rate())
            .await;
        Ok(signals)
    }

    async fn record_placement(
        &self,
        region: &str,
        pools: &[PoolDescriptor],
        placement: &ScoreMap,
    ) {
        for pool in pools.iter().filter(|p| p.kind == CapacityKind::Interruptible) {
            let Some(zone) = &pool.zone else { continue };
            let score = placement
                .get(&pool.instance_type)
                .and_then(|zones| zones.get(zone))
                .copied()
                .unwrap_or(0);
            self.gauges
                .record_placement_score(region, &pool.instance_type, zone, score)
                .await;
        }
    }

    /// Run cycles every `interval` until `shutdown` flips.
    ///
    /// Transient failures are logged and retried on the next cycle; a
    /// fatal failure ends the loop with that error.
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), CycleError> {
        info!(interval_secs = interval.as_secs(), "reconciliation loop started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            match self.run_once().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "fatal error, stopping");
                    return Err(e);
                }
                Err(e) => error!(error = %e, "cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("reconciliation loop shutting down");
        Ok(())
    }
}
