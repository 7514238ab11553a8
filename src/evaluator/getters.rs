use std::cmp::Ordering;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde_json::Value;

pub fn get_numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Null => None,
        Value::Bool(_) => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(_) => None,
        Value::Object(_) => None,
    }
}

pub fn get_string(v: &Value) -> String {
    match v {
        Value::Null => "".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) => "".to_string(),
        Value::Object(_) => "".to_string(),
    }
}

/// Resolve a date operand to epoch milliseconds. Strings try ISO forms
/// first and fall back to a numeric parse; numbers are taken as millis.
pub fn get_epoch_ms(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                let dt = Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?);
                return Some(dt.timestamp_millis());
            }
            s.parse().ok()
        }
        _ => None,
    }
}

/// Calendar day the timestamp lands on in the host's timezone, used by
/// the `on` operator.
pub fn local_date(epoch_ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Version strings compare segment-wise after stripping any `-suffix`;
/// the shorter side is padded with zeros. Returns None when either side
/// has a non-numeric segment.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

fn parse_version(s: &str) -> Option<Vec<i64>> {
    let core = s.split('-').next().unwrap_or("");
    if core.is_empty() {
        return None;
    }
    core.split('.')
        .map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// True when any entry of the target array compares equal to `value`
/// after string coercion.
pub fn array_any(target: Option<&Value>, value: &str, case_sensitive: bool) -> bool {
    let Some(arr) = target.and_then(|t| t.as_array()) else {
        return false;
    };
    arr.iter().any(|t| {
        let t = get_string(t);
        if case_sensitive {
            t == value
        } else {
            t.to_ascii_lowercase() == value.to_ascii_lowercase()
        }
    })
}

/// True when any entry of the target array satisfies `pred` against the
/// lowercased value. Drives the str_* operator family.
pub fn string_array_any<F>(target: Option<&Value>, value: &str, pred: F) -> bool
where
    F: Fn(&str, &str) -> bool,
{
    let Some(arr) = target.and_then(|t| t.as_array()) else {
        return false;
    };
    let value = value.to_ascii_lowercase();
    arr.iter()
        .any(|t| pred(&value, &get_string(t).to_ascii_lowercase()))
}

/// Loose equality: null matches null, numbers and numeric strings
/// compare numerically, everything else compares string-coerced.
pub fn loose_eq(value: Option<&Value>, target: Option<&Value>) -> bool {
    let value_null = matches!(value, None | Some(Value::Null));
    let target_null = matches!(target, None | Some(Value::Null));
    if value_null || target_null {
        return value_null == target_null;
    }
    let (value, target) = (value.unwrap_or(&Value::Null), target.unwrap_or(&Value::Null));
    if let (Some(a), Some(b)) = (get_numeric_value(value), get_numeric_value(target)) {
        return a == b;
    }
    get_string(value) == get_string(target)
}

/// Canonical form for array membership: integers and integer-like
/// strings collapse to the same key.
fn canonical_entry(v: &Value) -> String {
    let s = get_string(v);
    match s.trim().parse::<i64>() {
        Ok(n) => n.to_string(),
        Err(_) => s,
    }
}

fn canonical_set(v: &Value) -> Option<Vec<String>> {
    Some(v.as_array()?.iter().map(canonical_entry).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayContainsMode {
    Any,
    None,
    All,
    NotAll,
}

/// Membership checks with arrays on both sides.
pub fn array_contains(mode: ArrayContainsMode, value: Option<&Value>, target: Option<&Value>) -> bool {
    let (Some(value), Some(target)) = (
        value.and_then(canonical_set),
        target.and_then(canonical_set),
    ) else {
        return false;
    };
    let any = target.iter().any(|t| value.contains(t));
    let all = target.iter().all(|t| value.contains(t));
    match mode {
        ArrayContainsMode::Any => any,
        ArrayContainsMode::None => !any,
        ArrayContainsMode::All => all,
        ArrayContainsMode::NotAll => !all,
    }
}
