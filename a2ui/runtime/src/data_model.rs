//! Per-surface hierarchical data store.

use serde_json::{Map, Value};

use crate::error::DataPathError;
use crate::pointer;

#[derive(Debug, Clone, PartialEq)]
pub struct DataModel {
    root: Value,
}

impl Default for DataModel {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Reads the value at `path`. Unset or malformed paths read as `None`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    /// Partial update rooted at `path`: objects merge key by key (recursively),
    /// anything else replaces the value at that path.
    pub fn merge(&mut self, path: &str, contents: Value) -> Result<(), DataPathError> {
        let slot = self.slot_mut(path)?;
        merge_value(slot, contents);
        Ok(())
    }

    /// Replaces the value at `path` wholesale.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), DataPathError> {
        let slot = self.slot_mut(path)?;
        *slot = value;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.root = Value::Object(Map::new());
    }

    fn slot_mut(&mut self, path: &str) -> Result<&mut Value, DataPathError> {
        let tokens = pointer::parse(path)?;
        let mut current = &mut self.root;

        for token in &tokens {
            current = descend_or_create(current, token, path)?;
        }

        Ok(current)
    }
}

/// Walks `path` below an arbitrary value.
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let tokens = pointer::parse(path).ok()?;
    let mut current = root;

    for token in &tokens {
        current = match current {
            Value::Object(map) => map.get(token)?,
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn descend_or_create<'a>(
    value: &'a mut Value,
    token: &str,
    path: &str,
) -> Result<&'a mut Value, DataPathError> {
    match value {
        Value::Array(items) => {
            let index = pointer::parse_index(token, items.len(), path)?;
            if index == items.len() {
                items.push(Value::Null);
            }
            Ok(&mut items[index])
        }
        Value::Object(map) => Ok(map.entry(token.to_string()).or_insert(Value::Null)),
        // Last write wins: a scalar in the way becomes a container.
        other => {
            *other = Value::Object(Map::new());
            descend_or_create(other, token, path)
        }
    }
}

fn merge_value(target: &mut Value, contents: Value) {
    match (target, contents) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Converts the typed-entry form of `dataModelUpdate.contents`
/// (`[{ key, valueString | valueNumber | valueBoolean | valueMap }]`) into a
/// plain object. Returns `None` when `contents` is not in that form; an
/// empty top-level array is a plain value, not an empty entry list.
pub fn typed_entries_to_object(contents: &Value) -> Option<Value> {
    let entries = contents.as_array().filter(|entries| !entries.is_empty())?;
    entries_to_map(entries).map(Value::Object)
}

fn entries_to_map(entries: &[Value]) -> Option<Map<String, Value>> {
    let mut out = Map::new();

    for entry in entries {
        let entry = entry.as_object()?;
        let key = entry.get("key")?.as_str()?;
        let value = if let Some(value) = entry.get("valueString") {
            value.clone()
        } else if let Some(value) = entry.get("valueNumber") {
            value.clone()
        } else if let Some(value) = entry.get("valueBoolean") {
            value.clone()
        } else if let Some(nested) = entry.get("valueMap") {
            Value::Object(entries_to_map(nested.as_array()?)?)
        } else {
            Value::Null
        };
        out.insert(key.to_string(), value);
    }

    Some(out)
}
