//! Dot-path field access over touchpoint payloads.
//!
//! Rule conditions address fields such as `"device.type"` or
//! `"utm.campaign"`. Types that can be targeted by a condition implement
//! [`FieldLookup`]; a path that does not resolve yields [`FieldValue::Absent`]
//! rather than a JSON `null`, so "missing" and "explicitly null" stay distinct.

use serde_json::Value;

/// Result of resolving a dot path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Present(Value),
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Absent => None,
            FieldValue::Present(v) => Some(v),
        }
    }
}

/// Capability: resolve a `.`-separated path to a value.
pub trait FieldLookup {
    fn lookup(&self, path: &str) -> FieldValue;
}

impl FieldLookup for Value {
    fn lookup(&self, path: &str) -> FieldValue {
        walk(self, path.split('.'))
    }
}

/// Walk `root` one segment at a time. Objects are indexed by key, arrays by
/// numeric index; anything else short-circuits to `Absent`.
pub fn walk<'a>(root: &Value, segments: impl IntoIterator<Item = &'a str>) -> FieldValue {
    let mut current = root;
    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return FieldValue::Absent,
        }
    }
    FieldValue::Present(current.clone())
}
