//! Assembly of signal records from raw market data.
//!
//! Collectors hand over prices, eviction buckets and the pool inventory;
//! this module turns them into the [`SignalSet`] the scorer consumes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SignalError;
use crate::types::{CapacityKind, ScoreMap, SignalRecord, SignalSet};

static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+$").expect("static regex"));

/// A node pool as reported by the cluster inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub name: String,
    pub instance_type: String,
    /// First availability zone of the pool, if it is zonal.
    pub zone: Option<String>,
    pub kind: CapacityKind,
}

/// Price and eviction data for one instance type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSignals {
    pub on_demand_price: f64,
    pub spot_price: f64,
    /// Eviction rate as an integer percentage.
    pub eviction_percent: u8,
}

impl MarketSignals {
    pub fn discount(&self) -> f64 {
        discount(self.on_demand_price, self.spot_price)
    }

    pub fn eviction_rate(&self) -> f64 {
        f64::from(self.eviction_percent) / 100.0
    }
}

/// One row of the retail prices API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailPriceItem {
    #[serde(default)]
    pub currency_code: String,
    pub retail_price: f64,
    pub sku_name: String,
    pub product_name: String,
}

/// Fraction of the on-demand price saved by running spot.
pub fn discount(on_demand: f64, spot: f64) -> f64 {
    if on_demand <= 0.0 || !on_demand.is_finite() {
        return 0.0;
    }
    ((on_demand - spot) / on_demand).clamp(0.0, 1.0)
}

/// Parse an eviction bucket such as `"0-5"` or `"20+"` into a percentage.
///
/// Ranged buckets resolve to their upper bound, the open-ended `20+`
/// bucket to 21, and an empty value (no data) to 0.
pub fn parse_eviction_bucket(raw: &str) -> Result<u8, SignalError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }

    let bad = || SignalError::EvictionBucket(raw.to_string());

    if let Some((_, upper)) = raw.split_once('-') {
        return upper.trim().parse::<u8>().map_err(|_| bad());
    }
    if let Some(lower) = raw.strip_suffix('+') {
        let lower = lower.trim().parse::<u8>().map_err(|_| bad())?;
        return Ok(lower.saturating_add(1));
    }
    raw.parse::<u8>().map_err(|_| bad())
}

/// Hardware generation from the trailing digits of an instance type,
/// e.g. `Standard_D4s_v5` → 5. No suffix means generation 1.
pub fn generation_from_sku(instance_type: &str) -> u32 {
    TRAILING_DIGITS
        .find(instance_type)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(1)
        .max(1)
}

/// Pick `(on_demand, spot)` prices out of a retail price listing.
///
/// Windows images and low-priority SKUs are ignored. Missing prices are 0.
pub fn select_prices(items: &[RetailPriceItem]) -> (f64, f64) {
    let mut on_demand = 0.0;
    let mut spot = 0.0;
    for item in items {
        if item.product_name.contains("Windows") || item.sku_name.contains("Low Priority") {
            continue;
        }
        if item.sku_name.contains("Spot") {
            spot = item.retail_price;
        } else {
            on_demand = item.retail_price;
        }
    }
    (on_demand, spot)
}

/// Build the signal set for one cycle.
///
/// Spot pools without market data (collection failed this cycle) are left
/// out. Guaranteed pools always get the fixed baseline record.
pub fn assemble_records(
    pools: &[PoolDescriptor],
    market: &BTreeMap<String, MarketSignals>,
    placement: &ScoreMap,
) -> SignalSet {
    let mut records = SignalSet::new();

    for pool in pools {
        let record = match pool.kind {
            CapacityKind::Guaranteed => SignalRecord::guaranteed_baseline(&pool.name),
            CapacityKind::Interruptible => {
                let Some(signals) = market.get(&pool.instance_type) else {
                    debug!(pool = %pool.name, instance = %pool.instance_type, "no market signals, skipping pool");
                    continue;
                };
                let score = pool
                    .zone
                    .as_ref()
                    .and_then(|zone| placement.get(&pool.instance_type)?.get(zone))
                    .copied()
                    .unwrap_or(0);
                SignalRecord::new(
                    &pool.name,
                    signals.discount(),
                    signals.eviction_rate(),
                    score,
                    generation_from_sku(&pool.instance_type),
                    CapacityKind::Interruptible,
                )
            }
        };
        records.insert(pool.name.clone(), record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str, sku: &str, zone: Option<&str>, kind: CapacityKind) -> PoolDescriptor {
        PoolDescriptor {
            name: name.to_string(),
            instance_type: sku.to_string(),
            zone: zone.map(str::to_string),
            kind,
        }
    }

    fn item(sku: &str, product: &str, price: f64) -> RetailPriceItem {
        RetailPriceItem {
            currency_code: "USD".to_string(),
            retail_price: price,
            sku_name: sku.to_string(),
            product_name: product.to_string(),
        }
    }

    #[test]
    fn discount_values() {
        assert!((discount(1.0, 0.2) - 0.8).abs() < 1e-9);
        assert_eq!(discount(0.0, 0.2), 0.0);
        assert_eq!(discount(1.0, 2.0), 0.0);
    }

    #[test]
    fn eviction_buckets() {
        assert_eq!(parse_eviction_bucket("0-5"), Ok(5));
        assert_eq!(parse_eviction_bucket("5-10"), Ok(10));
        assert_eq!(parse_eviction_bucket("15-20"), Ok(20));
        assert_eq!(parse_eviction_bucket("20+"), Ok(21));
        assert_eq!(parse_eviction_bucket(""), Ok(0));
        assert_eq!(
            parse_eviction_bucket("lots"),
            Err(SignalError::EvictionBucket("lots".to_string()))
        );
    }

    #[test]
    fn generation_from_suffix() {
        assert_eq!(generation_from_sku("Standard_D4s_v5"), 5);
        assert_eq!(generation_from_sku("Standard_E16as_v12"), 12);
        assert_eq!(generation_from_sku("Standard_A1"), 1);
        assert_eq!(generation_from_sku("Standard_DS"), 1);
    }

    #[test]
    fn select_prices_skips_windows_and_low_priority() {
        let items = vec![
            item("D4s v5", "Virtual Machines Dsv5 Series", 0.192),
            item("D4s v5 Spot", "Virtual Machines Dsv5 Series", 0.038),
            item("D4s v5 Low Priority", "Virtual Machines Dsv5 Series", 0.04),
            item("D4s v5", "Virtual Machines Dsv5 Series Windows", 0.376),
        ];
        let (on_demand, spot) = select_prices(&items);
        assert_eq!(on_demand, 0.192);
        assert_eq!(spot, 0.038);
    }

    #[test]
    fn assemble_uses_zone_placement_and_baseline() {
        let pools = vec![
            pool("spotd4", "Standard_D4s_v5", Some("1"), CapacityKind::Interruptible),
            pool("spote8", "Standard_E8s_v3", None, CapacityKind::Interruptible),
            pool("general", "Standard_D4s_v5", Some("1"), CapacityKind::Guaranteed),
        ];
        let mut market = BTreeMap::new();
        market.insert(
            "Standard_D4s_v5".to_string(),
            MarketSignals { on_demand_price: 1.0, spot_price: 0.25, eviction_percent: 10 },
        );
        market.insert(
            "Standard_E8s_v3".to_string(),
            MarketSignals { on_demand_price: 2.0, spot_price: 1.0, eviction_percent: 5 },
        );
        let mut placement = ScoreMap::new();
        placement
            .entry("Standard_D4s_v5".to_string())
            .or_default()
            .insert("1".to_string(), 100);

        let records = assemble_records(&pools, &market, &placement);

        let d4 = &records["spotd4"];
        assert_eq!(d4.placement_score, 100);
        assert_eq!(d4.version, 5);
        assert!((d4.discount - 0.75).abs() < 1e-9);
        assert!((d4.eviction_rate - 0.1).abs() < 1e-9);

        assert_eq!(records["spote8"].placement_score, 0);
        assert_eq!(records["spote8"].version, 3);

        assert_eq!(records["general"], SignalRecord::guaranteed_baseline("general"));
    }

    #[test]
    fn assemble_skips_spot_pool_without_market_data() {
        let pools = vec![
            pool("spotd4", "Standard_D4s_v5", Some("1"), CapacityKind::Interruptible),
            pool("general", "Standard_D4s_v5", None, CapacityKind::Guaranteed),
        ];
        let records = assemble_records(&pools, &BTreeMap::new(), &ScoreMap::new());
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("general"));
    }
}
