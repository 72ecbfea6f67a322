//! JSON-Pointer values patches produced by hooks.
//!
//! Only `add` and `remove` are applied; `replace` is parsed but rejected
//! at the validation boundary, so compaction stays closed over the two
//! accepted operations.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use super::Values;
use crate::ENABLED_KEY_SUFFIX;
use crate::GLOBAL_VALUES_KEY;
use crate::ValuesError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl PatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(
        path: &str,
        value: Value,
    ) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.to_string(),
            value: Some(value),
        }
    }

    pub fn remove(path: &str) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.to_string(),
            value: None,
        }
    }

    /// First path segment, e.g. `global` for `/global/discovery/x`.
    fn root_segment(&self) -> Option<&str> {
        self.path.strip_prefix('/').map(|rest| match rest.find('/') {
            Some(i) => &rest[..i],
            None => rest,
        })
    }
}

/// An ordered list of patch operations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesPatch {
    pub operations: Vec<PatchOperation>,
}

impl ValuesPatch {
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self { operations }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Reads a JSON stream of single operations and operation arrays,
    /// the format hooks write into their patch file. Empty input means
    /// no patch.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>, ValuesError> {
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        let mut operations = Vec::new();
        for item in serde_json::Deserializer::from_slice(data).into_iter::<Value>() {
            let item = item.map_err(|e| ValuesError::BadPatchData(e.to_string()))?;
            match item {
                Value::Array(items) => {
                    for entry in items {
                        operations.push(decode_operation(entry)?);
                    }
                }
                entry @ Value::Object(_) => operations.push(decode_operation(entry)?),
                other => {
                    return Err(ValuesError::BadPatchData(format!(
                        "expected a patch operation or an array of them, got: {other}"
                    )));
                }
            }
        }

        Ok(Some(Self { operations }))
    }

    /// Applies the patch to a values tree. Returns the patched tree and
    /// whether anything actually changed.
    pub fn apply(
        &self,
        values: &Values,
    ) -> Result<(Values, bool), ValuesError> {
        let mut doc = values.clone().into_json_value();

        for op in &self.operations {
            apply_operation(&mut doc, op)?;
        }

        let res = Values::from_json_value(doc)?;
        let changed = res != *values;
        Ok((res, changed))
    }

    /// Keeps only operations under the given first path segment.
    pub fn filter_by_root(
        &self,
        root: &str,
    ) -> Self {
        Self {
            operations: self
                .operations
                .iter()
                .filter(|op| op.root_segment() == Some(root))
                .cloned()
                .collect(),
        }
    }

    /// Keeps only operations on `*Enabled` top level keys.
    pub fn enabled_keys_patch(&self) -> Self {
        Self {
            operations: self
                .operations
                .iter()
                .filter(|op| {
                    op.root_segment()
                        .map(|seg| seg.ends_with(ENABLED_KEY_SUFFIX))
                        .unwrap_or(false)
                })
                .cloned()
                .collect(),
        }
    }
}

fn decode_operation(value: Value) -> Result<PatchOperation, ValuesError> {
    serde_json::from_value(value).map_err(|e| ValuesError::BadPatchData(e.to_string()))
}

/// Rejects `replace` and any path outside the acceptable section.
/// Patches for `*Enabled` keys are accepted from global hooks.
pub fn validate_hook_values_patch(
    patch: &ValuesPatch,
    acceptable_key: &str,
) -> Result<(), ValuesError> {
    for op in &patch.operations {
        if op.op == PatchOp::Replace {
            return Err(ValuesError::UnsupportedPatchOp(op.op.as_str().to_string()));
        }

        if let Some(affected_key) = op.root_segment() {
            if affected_key.ends_with(ENABLED_KEY_SUFFIX) && acceptable_key == GLOBAL_VALUES_KEY {
                continue;
            }
            if affected_key == acceptable_key {
                continue;
            }
            return Err(ValuesError::UnacceptablePatchPath {
                path: op.path.clone(),
                acceptable: acceptable_key.to_string(),
            });
        }
    }

    Ok(())
}

/// Squashes an operation sequence so that every path carries at most one
/// `add` and an optional trailing `remove`. A `remove` without a
/// preceding `add` gets a synthetic guard `add` so replays keep working.
/// Output order is the lexicographic path order.
pub fn compact_patch_operations<'a, I>(operations: I) -> ValuesPatch
where
    I: IntoIterator<Item = &'a PatchOperation>,
{
    let mut tree: BTreeMap<String, Vec<PatchOperation>> = BTreeMap::new();

    for op in operations {
        // a 'remove' of a parent path invalidates collected subpath ops
        if op.op == PatchOp::Remove {
            let prefix = format!("{}/", op.path);
            let sub_paths: Vec<String> =
                tree.keys().filter(|path| path.starts_with(&prefix)).cloned().collect();
            for path in sub_paths {
                tree.remove(&path);
            }
        }

        match op.op {
            PatchOp::Add => {
                tree.insert(op.path.clone(), vec![op.clone()]);
            }
            PatchOp::Remove => {
                let previous_add =
                    tree.get(&op.path).and_then(|ops| ops.iter().rev().find(|p| p.op == PatchOp::Add).cloned());
                let add = previous_add.unwrap_or_else(|| {
                    PatchOperation::add(&op.path, json!("guard-patch-for-successful-remove"))
                });
                tree.insert(op.path.clone(), vec![add, op.clone()]);
            }
            // rejected at the validation boundary, nothing to squash
            PatchOp::Replace => {}
        }
    }

    ValuesPatch {
        operations: tree.into_values().flatten().collect(),
    }
}

/// Appends a new patch to the accumulated list, recompacting everything
/// into a single patch.
pub fn compact_values_patches(
    patches: &[ValuesPatch],
    new_patch: ValuesPatch,
) -> Vec<ValuesPatch> {
    let all = patches
        .iter()
        .flat_map(|p| p.operations.iter())
        .chain(new_patch.operations.iter());
    vec![compact_patch_operations(all)]
}

fn apply_operation(
    doc: &mut Value,
    op: &PatchOperation,
) -> Result<(), ValuesError> {
    let tokens = parse_pointer(&op.path)?;
    let (last, parents) = tokens.split_last().ok_or_else(|| {
        ValuesError::BadPatchData(format!("patch path must not be empty: '{}'", op.path))
    })?;

    let mut target = doc;
    for token in parents {
        target = descend(target, token).ok_or_else(|| ValuesError::PatchTargetMissing {
            path: op.path.clone(),
        })?;
    }

    match op.op {
        PatchOp::Add => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| ValuesError::BadPatchData(format!("'add' without value at '{}'", op.path)))?;
            add_at(target, last, value, &op.path)
        }
        PatchOp::Remove => remove_at(target, last, &op.path),
        PatchOp::Replace => Err(ValuesError::UnsupportedPatchOp(op.op.as_str().to_string())),
    }
}

fn descend<'a>(
    value: &'a mut Value,
    token: &str,
) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

fn add_at(
    parent: &mut Value,
    token: &str,
    value: Value,
    path: &str,
) -> Result<(), ValuesError> {
    match parent {
        Value::Object(map) => {
            map.insert(token.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            let index: usize = token
                .parse()
                .map_err(|_| ValuesError::BadPatchData(format!("bad array index in '{path}'")))?;
            if index > items.len() {
                return Err(ValuesError::PatchTargetMissing {
                    path: path.to_string(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(ValuesError::PatchTargetMissing {
            path: path.to_string(),
        }),
    }
}

fn remove_at(
    parent: &mut Value,
    token: &str,
    path: &str,
) -> Result<(), ValuesError> {
    match parent {
        Value::Object(map) => {
            map.remove(token).ok_or_else(|| ValuesError::PatchTargetMissing {
                path: path.to_string(),
            })?;
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = token
                .parse()
                .map_err(|_| ValuesError::BadPatchData(format!("bad array index in '{path}'")))?;
            if index >= items.len() {
                return Err(ValuesError::PatchTargetMissing {
                    path: path.to_string(),
                });
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(ValuesError::PatchTargetMissing {
            path: path.to_string(),
        }),
    }
}

fn parse_pointer(path: &str) -> Result<Vec<String>, ValuesError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| ValuesError::BadPatchData(format!("patch path must start with '/': '{path}'")))?;

    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

