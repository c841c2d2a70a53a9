//! Top-tier safety predicate over a computed ranking.

use crate::types::{CapacityKind, PriorityRanking, SignalSet};

/// Returns `false` if any guaranteed pool sits at the highest priority
/// level of `ranking`, `true` otherwise.
///
/// This is a standalone check: the reconciliation cycle does not call it.
/// An empty ranking is considered safe.
pub fn check_spot_is_safe(records: &SignalSet, ranking: &PriorityRanking) -> bool {
    let Some(top) = ranking.max_level().and_then(|level| ranking.patterns_at(level)) else {
        return true;
    };

    !records
        .values()
        .filter(|r| r.kind == CapacityKind::Guaranteed)
        .any(|r| top.contains(&r.pattern()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::PriorityScorer;
    use crate::types::SignalRecord;

    fn set(records: Vec<SignalRecord>) -> SignalSet {
        records.into_iter().map(|r| (r.name.clone(), r)).collect()
    }

    #[test]
    fn spot_on_top_is_safe() {
        let records = set(vec![
            SignalRecord::new("spota", 0.9, 0.05, 100, 5, CapacityKind::Interruptible),
            SignalRecord::guaranteed_baseline("general"),
        ]);
        let ranking = PriorityScorer::default().rank(&records);
        assert!(check_spot_is_safe(&records, &ranking));
    }

    #[test]
    fn guaranteed_on_top_is_unsafe() {
        let records = set(vec![
            SignalRecord::new("spota", 0.1, 0.9, 0, 1, CapacityKind::Interruptible),
            SignalRecord::guaranteed_baseline("general"),
        ]);
        let ranking = PriorityScorer::default().rank(&records);
        assert!(!check_spot_is_safe(&records, &ranking));
    }

    #[test]
    fn guaranteed_sharing_top_level_is_unsafe() {
        let records = set(vec![
            SignalRecord::new("spota", 0.5, 0.2, 45, 2, CapacityKind::Interruptible),
            SignalRecord::guaranteed_baseline("general"),
        ]);
        let ranking = PriorityScorer::default().rank(&records);
        assert_eq!(ranking.len(), 1);
        assert!(!check_spot_is_safe(&records, &ranking));
    }

    #[test]
    fn guaranteed_below_top_is_safe() {
        let mut ranking = PriorityRanking::new();
        ranking.insert(90, ".*spota.*".to_string());
        ranking.insert(50, ".*general.*".to_string());
        let records = set(vec![SignalRecord::guaranteed_baseline("general")]);
        assert!(check_spot_is_safe(&records, &ranking));
    }

    #[test]
    fn empty_ranking_is_safe() {
        let records = set(vec![SignalRecord::guaranteed_baseline("general")]);
        assert!(check_spot_is_safe(&records, &PriorityRanking::new()));
    }
}
