//! Condition/action rule engine for CUSTOM attribution models.
//!
//! Rules run in list order. For every enabled rule and every touchpoint whose
//! conditions hold, the rule's enabled actions rewrite that touchpoint's
//! running credit. Raw credits are normalized to sum to 1 at the end, or left
//! at 0 when nothing positive was assigned.
//!
//! Condition lists are folded left to right with no grouping: the first
//! condition is AND-ed onto `true`, and each later condition is joined using
//! the `logic` of the condition *before* it. The last condition's `logic` is
//! never read.

use attribution_core::lookup::{FieldLookup, FieldValue};
use attribution_core::model::{
    ActionType, AttributionAction, AttributionCondition, AttributionRule, ConditionLogic,
    ConditionOperator,
};
use serde_json::Value;
use tracing::trace;

pub fn apply_custom_rules<T: FieldLookup>(path: &[T], rules: &[AttributionRule]) -> Vec<f64> {
    let mut credits = vec![0.0; path.len()];

    for rule in rules.iter().filter(|r| r.enabled) {
        for (i, touchpoint) in path.iter().enumerate() {
            if !evaluate_conditions(&rule.conditions, touchpoint) {
                continue;
            }
            for action in rule.actions.iter().filter(|a| a.enabled) {
                credits[i] = apply_action(credits[i], action);
            }
            trace!(rule = %rule.name, index = i, credit = credits[i], "Rule matched");
        }
    }

    let total: f64 = credits.iter().sum();
    if total > 0.0 {
        for credit in &mut credits {
            *credit /= total;
        }
    }
    credits
}

fn apply_action(credit: f64, action: &AttributionAction) -> f64 {
    match action.action_type {
        ActionType::AssignCredit => action.number("credit").unwrap_or(0.0),
        ActionType::ModifyCredit => credit * action.number("multiplier").unwrap_or(1.0),
        ActionType::Exclude => 0.0,
        ActionType::Include => action.number("credit").unwrap_or(1.0),
        ActionType::Custom | ActionType::Unknown => credit,
    }
}

pub fn evaluate_conditions<T: FieldLookup + ?Sized>(
    conditions: &[AttributionCondition],
    target: &T,
) -> bool {
    let mut result = true;
    let mut combinator = ConditionLogic::And;

    for condition in conditions {
        let matched = evaluate_condition(condition, target);
        result = match combinator {
            ConditionLogic::And => result && matched,
            ConditionLogic::Or => result || matched,
        };
        combinator = condition.logic;
    }

    result
}

pub fn evaluate_condition<T: FieldLookup + ?Sized>(
    condition: &AttributionCondition,
    target: &T,
) -> bool {
    let actual = target.lookup(&condition.field);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => strict_equals(&actual, expected),
        ConditionOperator::NotEquals => !strict_equals(&actual, expected),
        ConditionOperator::Contains => coerce_string(&actual).contains(&value_to_string(expected)),
        ConditionOperator::GreaterThan => coerce_number(&actual) > value_to_number(expected),
        ConditionOperator::LessThan => coerce_number(&actual) < value_to_number(expected),
        ConditionOperator::In => expected
            .as_array()
            .is_some_and(|list| list_contains(list, &actual)),
        ConditionOperator::NotIn => expected
            .as_array()
            .is_some_and(|list| !list_contains(list, &actual)),
        ConditionOperator::Unknown => false,
    }
}

// ─── Comparison helpers ─────────────────────────────────────────────────────

/// Type-strict equality; numbers compare by value so `1` equals `1.0`.
fn strict_equals(actual: &FieldValue, expected: &Value) -> bool {
    match actual {
        FieldValue::Absent => false,
        FieldValue::Present(v) => values_equal(v, expected),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn list_contains(list: &[Value], actual: &FieldValue) -> bool {
    match actual {
        FieldValue::Absent => false,
        FieldValue::Present(v) => list.iter().any(|item| values_equal(item, v)),
    }
}

fn coerce_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Absent => "undefined".to_string(),
        FieldValue::Present(v) => value_to_string(v),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_number(f),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => value_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn coerce_number(value: &FieldValue) -> f64 {
    match value {
        FieldValue::Absent => f64::NAN,
        FieldValue::Present(v) => value_to_number(v),
    }
}

fn value_to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                parse_numeric_string(trimmed)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Numeric string parsing with JavaScript spelling rules: only the exact
/// word `Infinity` (optionally signed) is infinite, and `inf`/`nan` in any
/// case are not numbers.
fn parse_numeric_string(s: &str) -> f64 {
    let (sign, body) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    if body.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}
