//! Labelled gauge registry for spot market signals.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// The gauges exposed by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Gauge {
    CurrentDiscount,
    SpotPrice,
    RegularPrice,
    PlacementScore,
    EvictionRate,
}

impl Gauge {
    pub const ALL: [Gauge; 5] = [
        Gauge::CurrentDiscount,
        Gauge::SpotPrice,
        Gauge::RegularPrice,
        Gauge::PlacementScore,
        Gauge::EvictionRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Gauge::CurrentDiscount => "azure_spot_monitor_current_discount",
            Gauge::SpotPrice => "azure_spot_monitor_spot_price",
            Gauge::RegularPrice => "azure_spot_monitor_regular_price",
            Gauge::PlacementScore => "azure_spot_monitor_placement_score",
            Gauge::EvictionRate => "azure_spot_monitor_eviction_rate",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Gauge::CurrentDiscount => "The current effective spot discount from original VM price",
            Gauge::SpotPrice => "The current spot instance price",
            Gauge::RegularPrice => "The original VM price",
            Gauge::PlacementScore => "The current placement score for the spot instance",
            Gauge::EvictionRate => "The current spot instance eviction rate",
        }
    }
}

/// Label values, in `region, instance[, zone]` order.
pub type Labels = Vec<(&'static str, String)>;

type Series = BTreeMap<Gauge, BTreeMap<Labels, f64>>;

/// Shared, cheaply cloneable gauge registry.
#[derive(Clone, Default)]
pub struct SpotGauges {
    series: Arc<RwLock<Series>>,
}

impl SpotGauges {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, gauge: Gauge, labels: Labels, value: f64) {
        self.series
            .write()
            .await
            .entry(gauge)
            .or_default()
            .insert(labels, value);
    }

    /// Record on-demand price, spot price and the resulting discount.
    pub async fn record_prices(&self, region: &str, instance: &str, regular: f64, spot: f64, discount: f64) {
        let labels = instance_labels(region, instance);
        self.set(Gauge::RegularPrice, labels.clone(), regular).await;
        self.set(Gauge::SpotPrice, labels.clone(), spot).await;
        self.set(Gauge::CurrentDiscount, labels, discount).await;
    }

    pub async fn record_eviction_rate(&self, region: &str, instance: &str, rate: f64) {
        self.set(Gauge::EvictionRate, instance_labels(region, instance), rate)
            .await;
    }

    pub async fn record_placement_score(&self, region: &str, instance: &str, zone: &str, score: u8) {
        let mut labels = instance_labels(region, instance);
        labels.push(("zone", zone.to_string()));
        self.set(Gauge::PlacementScore, labels, f64::from(score)).await;
    }

    pub async fn get(&self, gauge: Gauge, labels: &Labels) -> Option<f64> {
        self.series.read().await.get(&gauge)?.get(labels).copied()
    }

    /// Prometheus text exposition of every gauge.
    pub async fn render(&self) -> String {
        let series = self.series.read().await;
        crate::prometheus::render_prometheus(&series)
    }
}

pub fn instance_labels(region: &str, instance: &str) -> Labels {
    vec![("region", region.to_string()), ("instance", instance.to_string())]
}
