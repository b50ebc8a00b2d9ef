//! Distribution and precedence properties of variant evaluation.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use switchboard_core::{
    Allocation, ConfigSnapshot, FlagDefinition, IdentitySource, TargetingIdentity,
    VariantDefinition,
};
use switchboard_flags::{EvaluationReason, VariantEvaluator};

const SAMPLES: usize = 100_000;
const TOLERANCE: f64 = 0.01;

fn snapshot(allocation: Vec<Allocation>, variants: &[&str]) -> ConfigSnapshot {
    ConfigSnapshot::new(
        1,
        BTreeMap::new(),
        vec![FlagDefinition {
            name: "Agent".to_string(),
            enabled: true,
            variants: variants
                .iter()
                .map(|name| VariantDefinition::new(*name, BTreeMap::new()))
                .collect(),
            allocation,
        }],
    )
    .unwrap()
}

fn anonymous(user: String) -> TargetingIdentity {
    TargetingIdentity::new(user, BTreeSet::new(), IdentitySource::Session).unwrap()
}

fn shares(snap: &ConfigSnapshot, variants: &[&str]) -> (BTreeMap<String, f64>, f64) {
    let mut counts: BTreeMap<String, usize> = variants.iter().map(|v| (v.to_string(), 0)).collect();
    let mut unassigned = 0usize;
    for i in 0..SAMPLES {
        let identity = anonymous(uuid::Uuid::new_v4().to_string() + &i.to_string());
        match VariantEvaluator.evaluate("Agent", snap, &identity) {
            Some(variant) => *counts.entry(variant.name.clone()).or_default() += 1,
            None => unassigned += 1,
        }
    }
    let shares = counts
        .into_iter()
        .map(|(k, v)| (k, v as f64 / SAMPLES as f64))
        .collect();
    (shares, unassigned as f64 / SAMPLES as f64)
}

#[test]
fn test_even_split_coverage() {
    let variants = ["oldAgent", "newAgent"];
    let snap = snapshot(
        vec![
            Allocation::weight("oldAgent", 0.5),
            Allocation::weight("newAgent", 0.5),
        ],
        &variants,
    );
    let (shares, unassigned) = shares(&snap, &variants);
    assert!((shares["oldAgent"] - 0.5).abs() < TOLERANCE, "{:?}", shares);
    assert!((shares["newAgent"] - 0.5).abs() < TOLERANCE, "{:?}", shares);
    assert_eq!(unassigned, 0.0);
}

#[test]
fn test_uneven_three_way_coverage() {
    let variants = ["a", "b", "c"];
    let snap = snapshot(
        vec![
            Allocation::weight("a", 0.2),
            Allocation::weight("b", 0.3),
            Allocation::weight("c", 0.5),
        ],
        &variants,
    );
    let (shares, unassigned) = shares(&snap, &variants);
    assert!((shares["a"] - 0.2).abs() < TOLERANCE, "{:?}", shares);
    assert!((shares["b"] - 0.3).abs() < TOLERANCE, "{:?}", shares);
    assert!((shares["c"] - 0.5).abs() < TOLERANCE, "{:?}", shares);
    assert!(unassigned < 1e-4);
}

#[test]
fn test_partial_allocation_leaves_remainder_unassigned() {
    let variants = ["a"];
    let snap = snapshot(vec![Allocation::weight("a", 0.25)], &variants);
    let (shares, unassigned) = shares(&snap, &variants);
    assert!((shares["a"] - 0.25).abs() < TOLERANCE);
    assert!((unassigned - 0.75).abs() < TOLERANCE);
}

#[test]
fn test_assignment_is_reproducible_across_evaluators() {
    let variants = ["oldAgent", "newAgent"];
    let snap = snapshot(
        vec![
            Allocation::weight("oldAgent", 0.5),
            Allocation::weight("newAgent", 0.5),
        ],
        &variants,
    );
    let identity = anonymous("user-1234".to_string());
    let first = VariantEvaluator::new().evaluate("Agent", &snap, &identity);
    let second = VariantEvaluator::default().evaluate("Agent", &snap, &identity);
    assert_eq!(first, second);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_exact_match_always_wins(
        user in "[a-z0-9-]{1,24}",
        weight in 0.0f64..=1.0,
    ) {
        let variants = ["oldAgent", "newAgent"];
        let snap = snapshot(
            vec![
                Allocation::weight("oldAgent", weight),
                Allocation::weight("newAgent", 1.0 - weight),
                Allocation::users("newAgent", [user.clone()]),
            ],
            &variants,
        );
        let eval = VariantEvaluator.evaluate_detailed("Agent", &snap, &anonymous(user));
        prop_assert_eq!(eval.variant_name(), Some("newAgent"));
        prop_assert_eq!(eval.reason, EvaluationReason::UserTargeted);
    }

    #[test]
    fn prop_no_identity_maps_to_two_variants(user in "[a-z0-9-]{1,24}") {
        let variants = ["a", "b"];
        let snap = snapshot(
            vec![Allocation::weight("a", 0.4), Allocation::weight("b", 0.6)],
            &variants,
        );
        let identity = anonymous(user);
        let eval = VariantEvaluator.evaluate_detailed("Agent", &snap, &identity);
        prop_assert_eq!(eval.reason, EvaluationReason::WeightedAllocation);
        let again = VariantEvaluator.evaluate("Agent", &snap, &identity);
        prop_assert_eq!(eval.variant, again);
    }
}
