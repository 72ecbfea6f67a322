//! Layered configuration values for modules and global hooks.
//!
//! A [`Values`] tree is a JSON object round-trippable between YAML and
//! JSON. The underlying map is key-sorted, so the JSON serialization is
//! canonical and [`Values::checksum`] depends only on content.

mod patch;
mod store;

pub use patch::PatchOp;
pub use patch::PatchOperation;
pub use patch::ValuesPatch;
pub use patch::compact_patch_operations;
pub use patch::compact_values_patches;
pub use patch::validate_hook_values_patch;
pub use store::ValuesStore;


use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::GLOBAL_VALUES_KEY;
use crate::ValuesError;
use crate::utils::checksum::calculate_checksum;

pub type JsonMap = serde_json::Map<String, Value>;

/// Values stores configuration for modules or hooks by section key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(JsonMap);

impl Values {
    pub fn new() -> Self {
        Self(JsonMap::new())
    }

    /// Builds Values from a JSON value that must be an object (or null,
    /// which becomes an empty tree).
    pub fn from_json_value(value: Value) -> Result<Self, ValuesError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(ValuesError::BadData(format!(
                "expected a mapping at the top level, got: {other}"
            ))),
        }
    }

    /// Loads values from YAML or JSON bytes (YAML is a superset here).
    pub fn from_yaml(data: &str) -> Result<Self, ValuesError> {
        if data.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_yaml::from_str(data)?;
        Self::from_json_value(value)
    }

    pub fn from_json(data: &str) -> Result<Self, ValuesError> {
        if data.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_str(data)?;
        Self::from_json_value(value)
    }

    /// `{key: {}}` — an empty section used as the base of a merge chain.
    pub fn empty_section(key: &str) -> Self {
        Self::wrap_section(key, json!({}))
    }

    /// `{key: value}`
    pub fn wrap_section(
        key: &str,
        value: Value,
    ) -> Self {
        let mut map = JsonMap::new();
        map.insert(key.to_string(), value);
        Self(map)
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn has_key(
        &self,
        key: &str,
    ) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `{global: ...}` or an empty tree when there is no global
    /// section.
    pub fn global(&self) -> Self {
        self.section_by_key(GLOBAL_VALUES_KEY)
    }

    /// Returns `{key: ...}` or an empty tree when the section is absent.
    pub fn section_by_key(
        &self,
        key: &str,
    ) -> Self {
        match self.0.get(key) {
            Some(section) => Self::wrap_section(key, section.clone()),
            None => Self::new(),
        }
    }

    /// Returns the subset of top level keys selected by the predicate.
    pub fn filter_keys<F>(
        &self,
        pred: F,
    ) -> Self
    where
        F: Fn(&str) -> bool,
    {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| pred(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn as_map(&self) -> &JsonMap {
        &self.0
    }

    pub fn into_json_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn json_bytes(&self) -> Result<Vec<u8>, ValuesError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn yaml_string(&self) -> Result<String, ValuesError> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Values as YAML, or an error line if the dump failed.
    pub fn debug_string(&self) -> String {
        match self.yaml_string() {
            Ok(s) => s,
            Err(e) => format!("bad values: {e}"),
        }
    }

    /// Content checksum over the canonical JSON serialization.
    pub fn checksum(&self) -> Result<String, ValuesError> {
        let json = serde_json::to_string(&self.0)?;
        Ok(calculate_checksum(&json))
    }
}

/// Deep right-biased merge of two values trees: objects merge
/// recursively, everything else is replaced by the right side.
pub fn merge_values(
    base: Values,
    over: Values,
) -> Values {
    let mut res = base.0;
    merge_json_maps(&mut res, over.0);
    Values(res)
}

/// Merges a chain of values trees, later trees win.
pub fn merge_all<I>(values: I) -> Values
where
    I: IntoIterator<Item = Values>,
{
    values.into_iter().fold(Values::new(), merge_values)
}

fn merge_json_maps(
    base: &mut JsonMap,
    over: JsonMap,
) {
    for (key, over_value) in over {
        match (base.get_mut(&key), over_value) {
            (Some(Value::Object(base_obj)), Value::Object(over_obj)) => {
                merge_json_maps(base_obj, over_obj);
            }
            (_, over_value) => {
                base.insert(key, over_value);
            }
        }
    }
}
