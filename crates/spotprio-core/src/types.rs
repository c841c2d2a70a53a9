//! Core domain types: signal records and the priority ranking.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Whether a node pool runs on reclaimable capacity or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapacityKind {
    /// Spot capacity, reclaimable by the provider at short notice.
    #[serde(alias = "Spot")]
    Interruptible,
    /// Regular capacity with no provider-initiated eviction.
    #[serde(alias = "Regular")]
    Guaranteed,
}

/// Market and allocation signals for a single node pool.
///
/// Built fresh every cycle and dropped after scoring. Use
/// [`SignalRecord::new`] (or deserialize) to get clamped fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSignalRecord", rename_all = "camelCase")]
pub struct SignalRecord {
    pub name: String,
    /// Fraction of the on-demand price saved, in `[0, 1]`.
    pub discount: f64,
    /// Fraction of capacity evicted, in `[0, 1]`.
    pub eviction_rate: f64,
    /// Bucketed allocation likelihood, in `[0, 100]`.
    pub placement_score: u8,
    /// Hardware generation, at least 1.
    pub version: u32,
    pub kind: CapacityKind,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignalRecord {
    name: String,
    #[serde(default)]
    discount: f64,
    #[serde(default)]
    eviction_rate: f64,
    #[serde(default)]
    placement_score: u32,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(alias = "type")]
    kind: CapacityKind,
}

fn default_version() -> u32 {
    1
}

impl From<RawSignalRecord> for SignalRecord {
    fn from(raw: RawSignalRecord) -> Self {
        SignalRecord::new(
            raw.name,
            raw.discount,
            raw.eviction_rate,
            raw.placement_score.min(100) as u8,
            raw.version,
            raw.kind,
        )
    }
}

impl SignalRecord {
    /// Build a record, clamping every field into its documented range.
    pub fn new(
        name: impl Into<String>,
        discount: f64,
        eviction_rate: f64,
        placement_score: u8,
        version: u32,
        kind: CapacityKind,
    ) -> Self {
        Self {
            name: name.into(),
            discount: clamp_fraction(discount),
            eviction_rate: clamp_fraction(eviction_rate),
            placement_score: placement_score.min(100),
            version: version.max(1),
            kind,
        }
    }

    /// Fixed record used for guaranteed pools.
    ///
    /// Guaranteed pools have no market signals of their own, so they are
    /// scored against a constant baseline that a healthy spot pool beats.
    pub fn guaranteed_baseline(name: impl Into<String>) -> Self {
        Self::new(name, 0.5, 0.2, 45, 2, CapacityKind::Guaranteed)
    }

    /// The name-match pattern the autoscaler uses for this pool.
    pub fn pattern(&self) -> String {
        pool_pattern(&self.name)
    }
}

fn clamp_fraction(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Wrap a pool name for regex matching by the priority expander.
pub fn pool_pattern(name: &str) -> String {
    format!(".*{}.*", name.trim())
}

/// Signal records keyed by pool name.
pub type SignalSet = BTreeMap<String, SignalRecord>;

/// Placement scores: instance type → availability zone → bucketed score.
pub type ScoreMap = BTreeMap<String, BTreeMap<String, u8>>;

/// Priority level → pool patterns at that level. Higher level wins.
///
/// Levels and the patterns inside each level iterate in sorted order, so
/// serializing the same ranking always produces the same text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityRanking(BTreeMap<i32, BTreeSet<String>>);

impl PriorityRanking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern at `level`, creating the level if needed.
    pub fn insert(&mut self, level: i32, pattern: String) {
        self.0.entry(level).or_default().insert(pattern);
    }

    /// Highest populated level, if any.
    pub fn max_level(&self) -> Option<i32> {
        self.0.keys().next_back().copied()
    }

    /// Patterns at `level`.
    pub fn patterns_at(&self, level: i32) -> Option<&BTreeSet<String>> {
        self.0.get(&level)
    }

    /// Level a pattern was placed at, if present.
    pub fn level_of(&self, pattern: &str) -> Option<i32> {
        self.0
            .iter()
            .find(|(_, patterns)| patterns.contains(pattern))
            .map(|(level, _)| *level)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<i32, BTreeSet<String>>> for PriorityRanking {
    fn from(map: BTreeMap<i32, BTreeSet<String>>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_out_of_range_fields() {
        let rec = SignalRecord::new("spot", 1.4, -0.3, 200, 0, CapacityKind::Interruptible);
        assert_eq!(rec.discount, 1.0);
        assert_eq!(rec.eviction_rate, 0.0);
        assert_eq!(rec.placement_score, 100);
        assert_eq!(rec.version, 1);
    }

    #[test]
    fn nan_fraction_clamps_to_zero() {
        let rec = SignalRecord::new("spot", f64::NAN, 0.1, 50, 2, CapacityKind::Interruptible);
        assert_eq!(rec.discount, 0.0);
    }

    #[test]
    fn pattern_trims_whitespace() {
        assert_eq!(pool_pattern(" spotd4 "), ".*spotd4.*");
    }

    #[test]
    fn deserialize_accepts_legacy_kind_names() {
        let json = r#"{"name":"spota","discount":0.9,"evictionRate":0.05,"placementScore":150,"version":5,"type":"Spot"}"#;
        let rec: SignalRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.kind, CapacityKind::Interruptible);
        assert_eq!(rec.placement_score, 100);
        assert_eq!(rec.version, 5);
    }

    #[test]
    fn ranking_max_level_and_lookup() {
        let mut ranking = PriorityRanking::new();
        assert_eq!(ranking.max_level(), None);

        ranking.insert(40, ".*b.*".to_string());
        ranking.insert(70, ".*a.*".to_string());
        ranking.insert(40, ".*c.*".to_string());

        assert_eq!(ranking.max_level(), Some(70));
        assert_eq!(ranking.level_of(".*c.*"), Some(40));
        assert_eq!(ranking.patterns_at(40).map(|p| p.len()), Some(2));
        assert_eq!(ranking.len(), 2);
    }

    #[test]
    fn ranking_patterns_iterate_sorted() {
        let mut ranking = PriorityRanking::new();
        ranking.insert(10, ".*zeta.*".to_string());
        ranking.insert(10, ".*alpha.*".to_string());
        ranking.insert(10, ".*mid.*".to_string());

        let patterns: Vec<_> = ranking.patterns_at(10).unwrap().iter().cloned().collect();
        assert_eq!(patterns, vec![".*alpha.*", ".*mid.*", ".*zeta.*"]);
    }
}
