//! Deterministic variant assignment.
//!
//! Assignment depends only on the flag name, the identity's user id and the
//! snapshot contents. No randomness is involved, so the same caller lands on
//! the same variant across calls and across process restarts.

use serde::Serialize;

use switchboard_core::{
    compute_content_hash, ConfigSnapshot, SnapshotVersion, TargetingIdentity, VariantDefinition,
};

/// Why an evaluation produced its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    /// The flag does not exist in the snapshot.
    FlagNotFound,
    /// The flag exists but is switched off.
    FlagDisabled,
    /// The user id is listed in an exact-match allocation.
    UserTargeted,
    /// The identity's bucket fell inside a weighted allocation.
    WeightedAllocation,
    /// The bucket fell past the last weighted allocation.
    AllocationRemainder,
}

impl EvaluationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlagNotFound => "flag_not_found",
            Self::FlagDisabled => "flag_disabled",
            Self::UserTargeted => "user_targeted",
            Self::WeightedAllocation => "weighted_allocation",
            Self::AllocationRemainder => "allocation_remainder",
        }
    }
}

impl std::fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one flag for one identity.
///
/// `variant` borrows from the snapshot it was evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'s> {
    pub flag: String,
    pub variant: Option<&'s VariantDefinition>,
    pub reason: EvaluationReason,
    pub config_version: SnapshotVersion,
}

impl Evaluation<'_> {
    pub fn variant_name(&self) -> Option<&str> {
        self.variant.map(|v| v.name.as_str())
    }
}

/// Maps `(flag, user_id)` into `[0, 1)`.
///
/// SHA-256 over `"{flag}\n{user_id}"`; the top 53 bits of the first eight
/// bytes give a uniformly distributed double strictly below 1.0.
pub fn bucket(flag_name: &str, user_id: &str) -> f64 {
    let hash = compute_content_hash(format!("{}\n{}", flag_name, user_id).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);
    let value = u64::from_be_bytes(prefix) >> 11;
    value as f64 / (1u64 << 53) as f64
}

/// Resolves a flag to a variant for a targeting identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantEvaluator;

impl VariantEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// The assigned variant, or `None` when the flag is absent, disabled,
    /// or the identity falls into unallocated space.
    pub fn evaluate<'s>(
        &self,
        flag_name: &str,
        snapshot: &'s ConfigSnapshot,
        identity: &TargetingIdentity,
    ) -> Option<&'s VariantDefinition> {
        self.evaluate_detailed(flag_name, snapshot, identity).variant
    }

    /// Like [`evaluate`](Self::evaluate) but also reports why.
    pub fn evaluate_detailed<'s>(
        &self,
        flag_name: &str,
        snapshot: &'s ConfigSnapshot,
        identity: &TargetingIdentity,
    ) -> Evaluation<'s> {
        let result = |variant, reason| Evaluation {
            flag: flag_name.to_string(),
            variant,
            reason,
            config_version: snapshot.version(),
        };

        let Some(flag) = snapshot.flag(flag_name) else {
            return result(None, EvaluationReason::FlagNotFound);
        };
        if !flag.enabled {
            return result(None, EvaluationReason::FlagDisabled);
        }

        let user_id = identity.user_id();
        for (variant, users) in flag.user_allocations() {
            if users.contains(user_id) {
                return result(flag.variant(variant), EvaluationReason::UserTargeted);
            }
        }

        let point = bucket(flag_name, user_id);
        let mut cumulative = 0.0;
        for (variant, weight) in flag.weighted_allocations() {
            cumulative += weight;
            if point < cumulative {
                return result(flag.variant(variant), EvaluationReason::WeightedAllocation);
            }
        }

        tracing::debug!(
            flag = flag_name,
            bucket = point,
            allocated = cumulative,
            "Identity fell outside allocated weight"
        );
        result(None, EvaluationReason::AllocationRemainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use switchboard_core::{Allocation, FlagDefinition, IdentitySource};

    fn identity(user: &str) -> TargetingIdentity {
        TargetingIdentity::new(user, BTreeSet::new(), IdentitySource::Authenticated).unwrap()
    }

    fn snapshot(enabled: bool, allocation: Vec<Allocation>) -> ConfigSnapshot {
        let mut new_agent = BTreeMap::new();
        new_agent.insert("agent_id".to_string(), "asst_123".to_string());
        ConfigSnapshot::new(
            9,
            BTreeMap::new(),
            vec![FlagDefinition {
                name: "Agent".to_string(),
                enabled,
                variants: vec![
                    VariantDefinition::new("oldAgent", BTreeMap::new()),
                    VariantDefinition::new("newAgent", new_agent),
                ],
                allocation,
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_flag() {
        let snap = snapshot(true, vec![]);
        let eval = VariantEvaluator.evaluate_detailed("Other", &snap, &identity("u"));
        assert_eq!(eval.variant, None);
        assert_eq!(eval.reason, EvaluationReason::FlagNotFound);
        assert_eq!(eval.config_version, 9);
    }

    #[test]
    fn test_disabled_flag() {
        let snap = snapshot(false, vec![Allocation::weight("oldAgent", 1.0)]);
        let eval = VariantEvaluator.evaluate_detailed("Agent", &snap, &identity("u"));
        assert_eq!(eval.variant, None);
        assert_eq!(eval.reason, EvaluationReason::FlagDisabled);
    }

    #[test]
    fn test_exact_match_beats_weights() {
        let snap = snapshot(
            true,
            vec![
                Allocation::weight("oldAgent", 1.0),
                Allocation::users("newAgent", ["user-42"]),
            ],
        );
        let eval = VariantEvaluator.evaluate_detailed("Agent", &snap, &identity("user-42"));
        assert_eq!(eval.variant_name(), Some("newAgent"));
        assert_eq!(eval.reason, EvaluationReason::UserTargeted);
        assert_eq!(eval.variant.unwrap().get("agent_id"), Some("asst_123"));

        let other = VariantEvaluator.evaluate("Agent", &snap, &identity("user-43"));
        assert_eq!(other.map(|v| v.name.as_str()), Some("oldAgent"));
    }

    #[test]
    fn test_full_weight_always_assigns() {
        let snap = snapshot(true, vec![Allocation::weight("newAgent", 1.0)]);
        for i in 0..200 {
            let eval =
                VariantEvaluator.evaluate_detailed("Agent", &snap, &identity(&format!("u{}", i)));
            assert_eq!(eval.variant_name(), Some("newAgent"));
        }
    }

    #[test]
    fn test_zero_weight_never_assigns() {
        let snap = snapshot(true, vec![Allocation::weight("newAgent", 0.0)]);
        for i in 0..200 {
            let eval =
                VariantEvaluator.evaluate_detailed("Agent", &snap, &identity(&format!("u{}", i)));
            assert_eq!(eval.variant, None);
            assert_eq!(eval.reason, EvaluationReason::AllocationRemainder);
        }
    }

    #[test]
    fn test_bucket_is_stable_and_in_range() {
        let a = bucket("Agent", "user-42");
        assert_eq!(a, bucket("Agent", "user-42"));
        assert!((0.0..1.0).contains(&a));
        assert_ne!(a, bucket("Other", "user-42"));
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(EvaluationReason::UserTargeted.to_string(), "user_targeted");
        assert_eq!(
            EvaluationReason::AllocationRemainder.as_str(),
            "allocation_remainder"
        );
    }
}
