// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-Pointer navigation and RFC-6902-subset patch op application over a
//! [`serde_json::Value`].

use serde_json::Value;
use thiserror::Error;
use wa_contracts::PatchOp;

/// A patch op failed its own semantics against the current document.
#[derive(Debug, Error)]
pub enum PointerError {
    /// The pointer did not resolve to an existing location.
    #[error("path {0} does not exist")]
    NotFound(String),
    /// The pointer's parent is not a container that can hold the final segment.
    #[error("path {0} cannot be addressed: parent is not an object or array")]
    NotAddressable(String),
    /// An array index segment was out of range or not an integer.
    #[error("array index in {0} is invalid")]
    InvalidIndex(String),
    /// A `test` op's expected value did not deep-equal the actual value.
    #[error("test op at {0} failed: value did not match")]
    TestFailed(String),
}

fn split_pointer(path: &str) -> Vec<String> {
    if path.is_empty() || path == "/" {
        return Vec::new();
    }
    path.trim_start_matches('/')
        .split('/')
        .map(unescape_token)
        .collect()
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Resolve `path` to an immutable reference, or `None` if it does not exist.
fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let tokens = split_pointer(path);
    let mut current = root;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get(&token)?,
            Value::Array(arr) => {
                let idx: usize = token.parse().ok()?;
                arr.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Remove and return the value at `path`.
fn remove_at(root: &mut Value, path: &str) -> Result<Value, PointerError> {
    let tokens = split_pointer(path);
    let (last, parents) = tokens.split_last().ok_or_else(|| PointerError::NotFound(path.to_string()))?;
    let container = navigate_mut(root, parents, path)?;
    match container {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| PointerError::NotFound(path.to_string())),
        Value::Array(arr) => {
            let idx: usize = last
                .parse()
                .map_err(|_| PointerError::InvalidIndex(path.to_string()))?;
            if idx >= arr.len() {
                return Err(PointerError::InvalidIndex(path.to_string()));
            }
            Ok(arr.remove(idx))
        }
        _ => Err(PointerError::NotAddressable(path.to_string())),
    }
}

/// Insert `value` at `path`. `-` as the final array segment appends.
fn insert_at(root: &mut Value, path: &str, value: Value) -> Result<(), PointerError> {
    let tokens = split_pointer(path);
    let (last, parents) = tokens.split_last().ok_or_else(|| PointerError::NotFound(path.to_string()))?;
    let container = navigate_mut(root, parents, path)?;
    match container {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
                return Ok(());
            }
            let idx: usize = last
                .parse()
                .map_err(|_| PointerError::InvalidIndex(path.to_string()))?;
            if idx > arr.len() {
                return Err(PointerError::InvalidIndex(path.to_string()));
            }
            arr.insert(idx, value);
            Ok(())
        }
        _ => Err(PointerError::NotAddressable(path.to_string())),
    }
}

/// Replace the value already present at `path`.
fn replace_at(root: &mut Value, path: &str, value: Value) -> Result<(), PointerError> {
    let tokens = split_pointer(path);
    let (last, parents) = tokens.split_last().ok_or_else(|| PointerError::NotFound(path.to_string()))?;
    let container = navigate_mut(root, parents, path)?;
    match container {
        Value::Object(map) => {
            if !map.contains_key(last) {
                return Err(PointerError::NotFound(path.to_string()));
            }
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let idx: usize = last
                .parse()
                .map_err(|_| PointerError::InvalidIndex(path.to_string()))?;
            if idx >= arr.len() {
                return Err(PointerError::InvalidIndex(path.to_string()));
            }
            arr[idx] = value;
            Ok(())
        }
        _ => Err(PointerError::NotAddressable(path.to_string())),
    }
}

fn navigate_mut<'a>(
    root: &'a mut Value,
    tokens: &[String],
    full_path: &str,
) -> Result<&'a mut Value, PointerError> {
    let mut current = root;
    for token in tokens {
        current = match current {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| PointerError::NotFound(full_path.to_string()))?,
            Value::Array(arr) => {
                let idx: usize = token
                    .parse()
                    .map_err(|_| PointerError::InvalidIndex(full_path.to_string()))?;
                arr.get_mut(idx)
                    .ok_or_else(|| PointerError::InvalidIndex(full_path.to_string()))?
            }
            _ => return Err(PointerError::NotAddressable(full_path.to_string())),
        };
    }
    Ok(current)
}

/// Apply a single [`PatchOp`] to `root` in place.
pub fn apply_op(root: &mut Value, op: &PatchOp) -> Result<(), PointerError> {
    match op {
        PatchOp::Add { path, value } => insert_at(root, path, value.clone()),
        PatchOp::Remove { path } => remove_at(root, path).map(|_| ()),
        PatchOp::Replace { path, value } => replace_at(root, path, value.clone()),
        PatchOp::Move { from, path } => {
            let value = remove_at(root, from)?;
            insert_at(root, path, value)
        }
        PatchOp::Copy { from, path } => {
            let value = resolve(root, from)
                .cloned()
                .ok_or_else(|| PointerError::NotFound(from.clone()))?;
            insert_at(root, path, value)
        }
        PatchOp::Test { path, value } => {
            let actual = resolve(root, path).ok_or_else(|| PointerError::NotFound(path.clone()))?;
            if actual == value {
                Ok(())
            } else {
                Err(PointerError::TestFailed(path.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_appends_with_dash() {
        let mut v = json!({"landmarks": ["a"]});
        apply_op(&mut v, &PatchOp::Add {
            path: "/landmarks/-".into(),
            value: json!("b"),
        })
        .unwrap();
        assert_eq!(v["landmarks"], json!(["a", "b"]));
    }

    #[test]
    fn replace_requires_existing_key() {
        let mut v = json!({"world_name": "old"});
        apply_op(&mut v, &PatchOp::Replace {
            path: "/missing".into(),
            value: json!("x"),
        })
        .unwrap_err();
        assert_eq!(v["world_name"], json!("old"));
    }

    #[test]
    fn move_relocates_value() {
        let mut v = json!({"a": 1, "b": null});
        apply_op(&mut v, &PatchOp::Move {
            from: "/a".into(),
            path: "/b".into(),
        })
        .unwrap();
        assert_eq!(v, json!({"b": 1}));
    }

    #[test]
    fn test_failure_reports_mismatch() {
        let v = json!({"a": 1});
        let mut doc = v.clone();
        let err = apply_op(&mut doc, &PatchOp::Test {
            path: "/a".into(),
            value: json!(2),
        })
        .unwrap_err();
        assert!(matches!(err, PointerError::TestFailed(_)));
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let mut v = json!({"landmarks": ["a"]});
        let err = apply_op(&mut v, &PatchOp::Replace {
            path: "/landmarks/5".into(),
            value: json!("x"),
        })
        .unwrap_err();
        assert!(matches!(err, PointerError::InvalidIndex(_)));
    }
}
