//! JSON wire format served by remote configuration sources.
//!
//! Decoding normalises every loosely-typed field exactly once: variant
//! configurations that are bare strings become `{"agent_id": ...}`, scalar
//! values are stringified, and `percent` allocations become weights.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use switchboard_core::{
    agent_keys, Allocation, ConfigError, ConfigSnapshot, FlagDefinition, SnapshotVersion,
    SwitchboardResult, VariantDefinition,
};

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDocument {
    pub version: SnapshotVersion,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    #[serde(default)]
    pub feature_flags: Vec<FlagDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagDocument {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub variants: Vec<VariantDocument>,
    #[serde(default)]
    pub allocation: Vec<AllocationDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantDocument {
    pub name: String,
    #[serde(default)]
    pub configuration: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationDocument {
    pub variant: String,
    #[serde(default)]
    pub users: Option<Vec<String>>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub percent: Option<f64>,
}

/// Decode raw bytes into a validated snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> SwitchboardResult<ConfigSnapshot> {
    let document: ConfigDocument =
        serde_json::from_slice(bytes).map_err(|e| ConfigError::InvalidSnapshot {
            reason: format!("malformed document: {}", e),
        })?;
    document.into_snapshot()
}

impl ConfigDocument {
    pub fn into_snapshot(self) -> SwitchboardResult<ConfigSnapshot> {
        let settings = self
            .settings
            .into_iter()
            .map(|(k, v)| (k, stringify(v)))
            .collect();

        let flags = self
            .feature_flags
            .into_iter()
            .map(FlagDocument::into_definition)
            .collect::<SwitchboardResult<Vec<_>>>()?;

        ConfigSnapshot::new(self.version, settings, flags)
    }
}

impl FlagDocument {
    fn into_definition(self) -> SwitchboardResult<FlagDefinition> {
        let flag = self.id;
        let variants = self
            .variants
            .into_iter()
            .map(|v| VariantDefinition::new(v.name, normalize_configuration(v.configuration)))
            .collect();
        let allocation = self
            .allocation
            .into_iter()
            .map(|a| a.into_allocation(&flag))
            .collect::<SwitchboardResult<Vec<_>>>()?;

        Ok(FlagDefinition {
            name: flag,
            enabled: self.enabled,
            variants,
            allocation,
        })
    }
}

impl AllocationDocument {
    fn into_allocation(self, flag: &str) -> SwitchboardResult<Allocation> {
        match (self.users, self.weight, self.percent) {
            (Some(users), None, None) => Ok(Allocation::users(self.variant, users)),
            (None, Some(weight), None) => Ok(Allocation::weight(self.variant, weight)),
            (None, None, Some(percent)) => Ok(Allocation::weight(self.variant, percent / 100.0)),
            _ => Err(ConfigError::InvalidSnapshot {
                reason: format!(
                    "flag '{}': allocation for '{}' must set exactly one of {}",
                    flag, self.variant, "users, weight or percent"
                ),
            }
            .into()),
        }
    }
}

fn normalize_configuration(raw: Option<Value>) -> BTreeMap<String, String> {
    match raw {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::String(id)) => {
            BTreeMap::from([(agent_keys::AGENT_ID.to_string(), id)])
        }
        Some(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, stringify(v)))
            .collect(),
        Some(other) => BTreeMap::from([(agent_keys::AGENT_ID.to_string(), stringify(other))]),
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn two_way_document(a: f64, b: f64) -> String {
        format!(
            r#"{{"version":1,"feature_flags":[{{"id":"Agent","enabled":true,
                "variants":[{{"name":"a"}},{{"name":"b"}}],
                "allocation":[{{"variant":"a","weight":{}}},{{"variant":"b","weight":{}}}]}}]}}"#,
            a, b
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_weights_within_unit_decode(a in 0.0f64..=1.0, split in 0.0f64..=1.0) {
            let b = (1.0 - a) * split;
            prop_assert!(decode_snapshot(two_way_document(a, b).as_bytes()).is_ok());
        }

        #[test]
        fn prop_weights_over_unit_rejected(a in 0.5f64..=1.0, extra in 0.01f64..0.5) {
            let b = 1.0 - a + extra;
            prop_assert!(decode_snapshot(two_way_document(a, b).as_bytes()).is_err());
        }
    }
}
