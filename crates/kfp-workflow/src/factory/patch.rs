//! Provider framework patches applied to resource definitions
//!
//! Merge patches follow RFC 7396. JSON patches follow RFC 6902 for the
//! `add`, `replace` and `remove` operations; `add` creates missing parent
//! containers so a patch can append to a list the definition omitted.

use kfp_common::crd::{Patch, PatchType};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::WorkflowError;

/// Single RFC 6902 operation
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Operation {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

/// Apply `patches` in order
pub fn apply_patches(patches: &[Patch], mut document: Value) -> Result<Value, WorkflowError> {
    for patch in patches {
        match patch.type_ {
            PatchType::Merge => {
                let payload: Value = serde_json::from_str(&patch.payload)
                    .map_err(|e| WorkflowError::Patch(format!("invalid merge patch: {}", e)))?;
                merge_patch(&mut document, &payload);
            }
            PatchType::Json => {
                let operations: Vec<Operation> = serde_json::from_str(&patch.payload)
                    .map_err(|e| WorkflowError::Patch(format!("invalid json patch: {}", e)))?;
                for operation in &operations {
                    apply_operation(&mut document, operation).map_err(WorkflowError::Patch)?;
                }
            }
        }
    }
    Ok(document)
}

/// RFC 7396 merge
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_map) = target else {
        return;
    };

    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(key);
        } else {
            merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

fn apply_operation(document: &mut Value, operation: &Operation) -> Result<(), String> {
    match operation {
        Operation::Add { path, value } => add(document, path, value.clone()),
        Operation::Replace { path, value } => {
            let target = document
                .pointer_mut(path)
                .ok_or_else(|| format!("path {} does not exist", path))?;
            *target = value.clone();
            Ok(())
        }
        Operation::Remove { path } => {
            let (parent, last) = split_path(path)?;
            let container = document
                .pointer_mut(&parent)
                .ok_or_else(|| format!("path {} does not exist", path))?;
            match container {
                Value::Object(map) => map
                    .remove(&last)
                    .map(|_| ())
                    .ok_or_else(|| format!("path {} does not exist", path)),
                Value::Array(items) => {
                    let index = array_index(&last, items.len().saturating_sub(1))?;
                    items.remove(index);
                    Ok(())
                }
                _ => Err(format!("path {} does not exist", path)),
            }
        }
    }
}

fn add(document: &mut Value, path: &str, value: Value) -> Result<(), String> {
    if path.is_empty() {
        *document = value;
        return Ok(());
    }

    let tokens = tokens(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(format!("invalid path {}", path));
    };

    let mut current = document;
    for (i, token) in parents.iter().enumerate() {
        let next_is_index = parents
            .get(i + 1)
            .unwrap_or(last)
            .parse::<usize>()
            .is_ok()
            || parents.get(i + 1).unwrap_or(last) == "-";
        let empty = || {
            if next_is_index {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            }
        };

        current = match current {
            Value::Object(map) => map.entry(token.clone()).or_insert_with(empty),
            Value::Array(items) => {
                let index = array_index(token, items.len().saturating_sub(1))?;
                &mut items[index]
            }
            _ => return Err(format!("path {} crosses a scalar", path)),
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                array_index(last, items.len())?
            };
            items.insert(index, value);
            Ok(())
        }
        _ => Err(format!("path {} crosses a scalar", path)),
    }
}

fn tokens(path: &str) -> Result<Vec<String>, String> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(format!("invalid path {}", path));
    };
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn split_path(path: &str) -> Result<(String, String), String> {
    let index = path
        .rfind('/')
        .ok_or_else(|| format!("invalid path {}", path))?;
    let last = path[index + 1..].replace("~1", "/").replace("~0", "~");
    Ok((path[..index].to_string(), last))
}

fn array_index(token: &str, max: usize) -> Result<usize, String> {
    match token.parse::<usize>() {
        Ok(index) if index <= max => Ok(index),
        _ => Err(format!("invalid array index {}", token)),
    }
}
