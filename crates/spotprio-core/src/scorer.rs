//! Priority scoring for node pools.
//!
//! Each pool is scored with a weighted combination of:
//! - **Availability**: the inverse of the eviction rate
//! - **Discount**: how much cheaper spot is than on-demand
//! - **Placement**: the likelihood an allocation succeeds (dominant weight)
//! - **Generation**: newer hardware is mildly favored, saturating at a cap

use tracing::debug;

use crate::types::{PriorityRanking, SignalRecord, SignalSet};

/// Weights for the scoring components. They sum to 1.0 so the composite
/// score stays in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub availability: f64,
    pub discount: f64,
    pub placement: f64,
    pub generation: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            availability: 0.2,
            discount: 0.1,
            placement: 0.6,
            generation: 0.1,
        }
    }
}

/// Individual weighted components, for logging and debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub availability: f64,
    pub discount: f64,
    pub placement: f64,
    pub generation: f64,
}

impl ScoreBreakdown {
    /// Composite score in `[0, 1]`.
    pub fn total(&self) -> f64 {
        self.availability + self.discount + self.placement + self.generation
    }

    /// Integer priority level: the composite scaled by 100 and truncated.
    pub fn priority(&self) -> i32 {
        (self.total() * 100.0).floor() as i32
    }
}

/// Turns signal records into a priority ranking.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    weights: ScoringWeights,
    /// Generation at which the generation component saturates.
    version_cap: u32,
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}

impl PriorityScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights,
            version_cap: 10,
        }
    }

    pub fn with_version_cap(mut self, cap: u32) -> Self {
        self.version_cap = cap.max(1);
        self
    }

    /// Weighted components for a single record.
    pub fn breakdown(&self, record: &SignalRecord) -> ScoreBreakdown {
        let w = &self.weights;
        let cap = f64::from(self.version_cap);
        ScoreBreakdown {
            availability: (1.0 - record.eviction_rate) * w.availability,
            discount: record.discount * w.discount,
            placement: f64::from(record.placement_score) / 100.0 * w.placement,
            generation: f64::from(record.version.min(self.version_cap)) / cap * w.generation,
        }
    }

    /// Priority level for a single record.
    pub fn priority(&self, record: &SignalRecord) -> i32 {
        self.breakdown(record).priority()
    }

    /// Score every record and group the pool patterns by level.
    ///
    /// Pools whose scores truncate to the same integer share a level.
    pub fn rank(&self, records: &SignalSet) -> PriorityRanking {
        let mut ranking = PriorityRanking::new();
        for record in records.values() {
            let breakdown = self.breakdown(record);
            let level = breakdown.priority();
            debug!(
                pool = %record.name,
                level,
                availability = breakdown.availability,
                discount = breakdown.discount,
                placement = breakdown.placement,
                generation = breakdown.generation,
                "scored node pool"
            );
            ranking.insert(level, record.pattern());
        }
        ranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapacityKind;

    fn spot(name: &str, discount: f64, eviction: f64, placement: u8, version: u32) -> SignalRecord {
        SignalRecord::new(name, discount, eviction, placement, version, CapacityKind::Interruptible)
    }

    fn set(records: Vec<SignalRecord>) -> SignalSet {
        records.into_iter().map(|r| (r.name.clone(), r)).collect()
    }

    #[test]
    fn worked_example_scores_53() {
        let scorer = PriorityScorer::default();
        assert_eq!(scorer.priority(&spot("a", 0.5, 0.2, 50, 2)), 53);
    }

    #[test]
    fn minimum_signals_leave_only_generation() {
        let scorer = PriorityScorer::default();
        for version in 1..=10 {
            let rec = spot("a", 0.0, 1.0, 0, version);
            let expected = (100.0 * (f64::from(version) / 10.0 * 0.1)).floor() as i32;
            assert_eq!(scorer.priority(&rec), expected, "version {version}");
        }
    }

    #[test]
    fn placement_score_is_monotonic() {
        let scorer = PriorityScorer::default();
        let mut last = i32::MIN;
        for placement in 0..=100u8 {
            let p = scorer.priority(&spot("a", 0.3, 0.1, placement, 4));
            assert!(p >= last, "placement {placement} dropped priority {last} -> {p}");
            last = p;
        }
    }

    #[test]
    fn version_saturates_at_cap() {
        let scorer = PriorityScorer::default();
        let at_cap = scorer.priority(&spot("a", 0.5, 0.2, 50, 10));
        let far_beyond = scorer.priority(&spot("a", 0.5, 0.2, 50, 1000));
        assert_eq!(at_cap, far_beyond);
    }

    #[test]
    fn lower_version_cap_saturates_earlier() {
        let scorer = PriorityScorer::default().with_version_cap(4);
        assert_eq!(scorer.priority(&spot("a", 0.5, 0.2, 50, 4)), 61);
        assert_eq!(scorer.priority(&spot("a", 0.5, 0.2, 50, 9)), 61);
        assert_eq!(scorer.priority(&spot("a", 0.5, 0.2, 50, 2)), 56);
    }

    #[test]
    fn newer_generation_ranks_higher() {
        let scorer = PriorityScorer::default();
        let v4 = scorer.priority(&spot("a", 0.9, 0.05, 100, 4));
        let v6 = scorer.priority(&spot("a", 0.9, 0.05, 100, 6));
        assert_eq!(v4, 92);
        assert_eq!(v6, 94);
    }

    #[test]
    fn guaranteed_baseline_scores_50() {
        let scorer = PriorityScorer::default();
        assert_eq!(scorer.priority(&SignalRecord::guaranteed_baseline("general")), 50);
    }

    #[test]
    fn rank_groups_colliding_pools() {
        let scorer = PriorityScorer::default();
        let records = set(vec![
            spot("spotc", 0.5, 0.2, 50, 2),
            spot("spotb", 0.5, 0.2, 50, 2),
            spot("spota", 0.9, 0.15, 100, 2),
            SignalRecord::guaranteed_baseline("general"),
        ]);

        let ranking = scorer.rank(&records);

        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking.max_level(), Some(88));
        let shared: Vec<_> = ranking.patterns_at(53).unwrap().iter().cloned().collect();
        assert_eq!(shared, vec![".*spotb.*", ".*spotc.*"]);
        assert_eq!(ranking.level_of(".*general.*"), Some(50));
    }

    #[test]
    fn rank_of_empty_set_is_empty() {
        let scorer = PriorityScorer::default();
        assert!(scorer.rank(&SignalSet::new()).is_empty());
    }

    #[test]
    fn custom_weights_change_ordering() {
        let scorer = PriorityScorer::new(ScoringWeights {
            availability: 0.0,
            discount: 1.0,
            placement: 0.0,
            generation: 0.0,
        });
        let cheap = scorer.priority(&spot("a", 0.9, 0.5, 0, 1));
        let reliable = scorer.priority(&spot("b", 0.1, 0.0, 100, 1));
        assert!(cheap > reliable);
    }

    #[test]
    fn breakdown_components_sum_to_total() {
        let scorer = PriorityScorer::default();
        let b = scorer.breakdown(&spot("a", 0.5, 0.2, 50, 2));
        assert!((b.availability - 0.16).abs() < 1e-9);
        assert!((b.discount - 0.05).abs() < 1e-9);
        assert!((b.placement - 0.30).abs() < 1e-9);
        assert!((b.generation - 0.02).abs() < 1e-9);
        assert!((b.total() - 0.53).abs() < 1e-9);
    }
}
