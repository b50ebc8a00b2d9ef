//! Versioned configuration snapshot and flag definitions.
//!
//! A [`ConfigSnapshot`] is built once, validated, and then shared behind an
//! `Arc`. Nothing hands out `&mut` access to a published snapshot; a refresh
//! replaces it wholesale.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::{ConfigError, SwitchboardResult};

/// Tolerance for floating point accumulation of allocation weights.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Monotonic snapshot version.
pub type SnapshotVersion = u64;

/// A named configuration payload a flag can resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantDefinition {
    pub name: String,
    /// Normalized configuration (e.g. `endpoint`, `model`, `agent_id`).
    pub configuration: BTreeMap<String, String>,
}

impl VariantDefinition {
    pub fn new(name: impl Into<String>, configuration: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            configuration,
        }
    }

    /// Look up a configuration value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).map(String::as_str)
    }
}

/// How an allocation entry selects identities.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationTarget {
    /// Exact user-id match. Checked before any weighted entry.
    Users(BTreeSet<String>),
    /// Fraction of the identity space in `[0, 1]`.
    Weight(f64),
}

/// One entry of a flag's allocation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub variant: String,
    pub target: AllocationTarget,
}

impl Allocation {
    pub fn users<I, S>(variant: impl Into<String>, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variant: variant.into(),
            target: AllocationTarget::Users(users.into_iter().map(Into::into).collect()),
        }
    }

    pub fn weight(variant: impl Into<String>, weight: f64) -> Self {
        Self {
            variant: variant.into(),
            target: AllocationTarget::Weight(weight),
        }
    }
}

/// A named toggle plus the policy that assigns identities to variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagDefinition {
    pub name: String,
    pub enabled: bool,
    /// Declared variants, in document order.
    pub variants: Vec<VariantDefinition>,
    /// Allocation entries, in evaluation order.
    pub allocation: Vec<Allocation>,
}

impl FlagDefinition {
    /// Find a declared variant by name.
    pub fn variant(&self, name: &str) -> Option<&VariantDefinition> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Exact-match entries, in declaration order.
    pub fn user_allocations(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.allocation.iter().filter_map(|a| match &a.target {
            AllocationTarget::Users(users) => Some((a.variant.as_str(), users)),
            AllocationTarget::Weight(_) => None,
        })
    }

    /// Weighted entries, in declaration order.
    pub fn weighted_allocations(&self) -> impl Iterator<Item = (&str, f64)> {
        self.allocation.iter().filter_map(|a| match a.target {
            AllocationTarget::Weight(w) => Some((a.variant.as_str(), w)),
            AllocationTarget::Users(_) => None,
        })
    }

    /// Sum of all weighted entries.
    pub fn total_weight(&self) -> f64 {
        self.weighted_allocations().map(|(_, w)| w).sum()
    }

    /// Check structural invariants.
    ///
    /// Variant names are unique, every allocation names a declared variant,
    /// weights are finite and non-negative, and the weighted entries never
    /// overlap (their sum stays within 1.0).
    pub fn validate(&self) -> SwitchboardResult<()> {
        let invalid = |reason: String| ConfigError::InvalidSnapshot {
            reason: format!("flag '{}': {}", self.name, reason),
        };

        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidSnapshot {
                reason: "flag name cannot be empty".to_string(),
            }
            .into());
        }

        let mut seen = BTreeSet::new();
        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err(invalid("variant name cannot be empty".to_string()).into());
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(invalid(format!("duplicate variant '{}'", variant.name)).into());
            }
        }

        for entry in &self.allocation {
            if !seen.contains(entry.variant.as_str()) {
                return Err(invalid(format!(
                    "allocation references undeclared variant '{}'",
                    entry.variant
                ))
                .into());
            }
            if let AllocationTarget::Weight(w) = entry.target {
                if !w.is_finite() || w < 0.0 {
                    return Err(invalid(format!(
                        "weight {} for variant '{}' must be a finite non-negative number",
                        w, entry.variant
                    ))
                    .into());
                }
            }
        }

        let total = self.total_weight();
        if total > 1.0 + WEIGHT_EPSILON {
            return Err(invalid(format!("allocation weights sum to {} (> 1.0)", total)).into());
        }

        Ok(())
    }
}

/// Immutable, versioned view of all settings and flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    version: SnapshotVersion,
    settings: BTreeMap<String, String>,
    flags: BTreeMap<String, FlagDefinition>,
}

impl ConfigSnapshot {
    /// Build and validate a snapshot.
    pub fn new(
        version: SnapshotVersion,
        settings: BTreeMap<String, String>,
        flags: impl IntoIterator<Item = FlagDefinition>,
    ) -> SwitchboardResult<Self> {
        let mut by_name = BTreeMap::new();
        for flag in flags {
            flag.validate()?;
            let name = flag.name.clone();
            if by_name.insert(name.clone(), flag).is_some() {
                return Err(ConfigError::InvalidSnapshot {
                    reason: format!("duplicate flag '{}'", name),
                }
                .into());
            }
        }

        Ok(Self {
            version,
            settings,
            flags: by_name,
        })
    }

    /// A snapshot with no settings and no flags.
    pub fn empty(version: SnapshotVersion) -> Self {
        Self {
            version,
            settings: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn flags(&self) -> &BTreeMap<String, FlagDefinition> {
        &self.flags
    }

    pub fn flag(&self, name: &str) -> Option<&FlagDefinition> {
        self.flags.get(name)
    }

    /// True if the flag exists and is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flag(name).is_some_and(|f| f.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_flag(allocation: Vec<Allocation>) -> FlagDefinition {
        FlagDefinition {
            name: "Agent".to_string(),
            enabled: true,
            variants: vec![
                VariantDefinition::new("oldAgent", BTreeMap::new()),
                VariantDefinition::new("newAgent", BTreeMap::new()),
            ],
            allocation,
        }
    }

    #[test]
    fn test_validate_accepts_full_coverage() {
        let flag = agent_flag(vec![
            Allocation::weight("oldAgent", 0.5),
            Allocation::weight("newAgent", 0.5),
        ]);
        assert!(flag.validate().is_ok());
        assert!((flag.total_weight() - 1.0).abs() < WEIGHT_EPSILON);
    }

    #[test]
    fn test_validate_accepts_partial_coverage() {
        let flag = agent_flag(vec![Allocation::weight("oldAgent", 0.3)]);
        assert!(flag.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overlapping_weights() {
        let flag = agent_flag(vec![
            Allocation::weight("oldAgent", 0.7),
            Allocation::weight("newAgent", 0.7),
        ]);
        assert!(flag.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_variant() {
        let flag = agent_flag(vec![Allocation::users("ghostAgent", ["user-1"])]);
        let err = flag.validate().unwrap_err();
        assert!(err.to_string().contains("ghostAgent"));
    }

    #[test]
    fn test_validate_rejects_negative_or_nan_weight() {
        assert!(agent_flag(vec![Allocation::weight("oldAgent", -0.1)])
            .validate()
            .is_err());
        assert!(agent_flag(vec![Allocation::weight("oldAgent", f64::NAN)])
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_variant() {
        let mut flag = agent_flag(vec![]);
        flag.variants
            .push(VariantDefinition::new("oldAgent", BTreeMap::new()));
        assert!(flag.validate().is_err());
    }

    #[test]
    fn test_snapshot_rejects_duplicate_flag() {
        let flags = vec![agent_flag(vec![]), agent_flag(vec![])];
        let result = ConfigSnapshot::new(1, BTreeMap::new(), flags);
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut settings = BTreeMap::new();
        settings.insert("ai_endpoint".to_string(), "https://example.test".to_string());
        let snapshot = ConfigSnapshot::new(3, settings, vec![agent_flag(vec![])]).unwrap();

        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.setting("ai_endpoint"), Some("https://example.test"));
        assert!(snapshot.is_enabled("Agent"));
        assert!(!snapshot.is_enabled("Missing"));
        assert!(snapshot.flag("Agent").unwrap().variant("newAgent").is_some());
    }

    #[test]
    fn test_allocation_iterators_preserve_order() {
        let flag = agent_flag(vec![
            Allocation::weight("newAgent", 0.2),
            Allocation::users("oldAgent", ["a"]),
            Allocation::weight("oldAgent", 0.8),
        ]);
        let weighted: Vec<_> = flag.weighted_allocations().map(|(v, _)| v).collect();
        assert_eq!(weighted, vec!["newAgent", "oldAgent"]);
        assert_eq!(flag.user_allocations().count(), 1);
    }
}
