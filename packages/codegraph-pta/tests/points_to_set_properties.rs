//! Property-based tests for the sparse points-to set
//!
//! Compared against `BTreeSet<u32>` as the reference model:
//! - Insert reports novelty exactly once
//! - Union is a superset of both sides and reports change correctly
//! - Iteration is ascending and matches the model

use std::collections::BTreeSet;

use codegraph_pta::features::points_to::PointsToSet;
use proptest::prelude::*;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

// ============================================================================
// QuickCheck Tests (simpler, faster)
// ============================================================================

#[quickcheck]
fn qc_second_insert_reports_present(ids: Vec<u32>) -> bool {
    let mut set = PointsToSet::new();
    let mut model = BTreeSet::new();
    ids.into_iter()
        .all(|id| set.insert(id) == model.insert(id) && !set.insert(id))
}

#[quickcheck]
fn qc_union_is_superset(a: Vec<u32>, b: Vec<u32>) -> bool {
    let mut left: PointsToSet = a.iter().copied().collect();
    let right: PointsToSet = b.iter().copied().collect();
    let before = left.clone();

    let changed = left.union_with(&right);
    left.contains_all(&right) && left.contains_all(&before) && changed == !before.contains_all(&right)
}

#[quickcheck]
fn qc_remove_restores_emptiness(ids: Vec<u32>) -> TestResult {
    if ids.is_empty() {
        return TestResult::discard();
    }
    let mut set: PointsToSet = ids.iter().copied().collect();
    for id in &ids {
        set.remove(*id);
    }
    TestResult::from_bool(set.is_empty() && set.len() == 0)
}

// ============================================================================
// Proptest (model-based)
// ============================================================================

fn ids() -> impl Strategy<Value = Vec<u32>> {
    // Mix dense small ids with sparse large ones to cross block boundaries
    prop::collection::vec(prop_oneof![0u32..512, any::<u32>()], 0..200)
}

proptest! {
    #[test]
    fn prop_iteration_matches_model(values in ids()) {
        let set: PointsToSet = values.iter().copied().collect();
        let model: BTreeSet<u32> = values.iter().copied().collect();

        prop_assert_eq!(set.iter().collect::<Vec<_>>(), model.iter().copied().collect::<Vec<_>>());
        prop_assert_eq!(set.len(), model.len());
        prop_assert_eq!(set.first(), model.iter().next().copied());
        prop_assert_eq!(set.is_empty(), model.is_empty());
    }

    #[test]
    fn prop_intersects_matches_model(a in ids(), b in ids()) {
        let sa: PointsToSet = a.iter().copied().collect();
        let sb: PointsToSet = b.iter().copied().collect();
        let ma: BTreeSet<u32> = a.into_iter().collect();
        let mb: BTreeSet<u32> = b.into_iter().collect();

        prop_assert_eq!(sa.intersects(&sb), !ma.is_disjoint(&mb));
        prop_assert_eq!(sa.contains_all(&sb), ma.is_superset(&mb));
    }

    #[test]
    fn prop_serde_preserves_set(values in ids()) {
        let set: PointsToSet = values.into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        let back: PointsToSet = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, set);
    }
}
