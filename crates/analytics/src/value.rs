//! Cell value coercion
//!
//! Table cells are untyped JSON. Dashboards built on top of this engine were
//! written against loose JavaScript semantics (`Number(x)`, `String(x)`,
//! `===`), and saved widgets depend on those exact results, so the helpers
//! here reproduce them rather than applying stricter Rust conversions.
//!
//! `None` stands for a missing key (`undefined`), `Some(Value::Null)` for an
//! explicit null. The two behave differently under numeric comparison.

use serde_json::Value;

/// True for missing, null, and empty-string cells
pub fn is_nil(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Best-effort numeric coercion used by the aggregator
///
/// Nil cells yield `None`. Everything else is rendered to text, stripped of
/// every character except digits, `.` and `-`, then parsed. Text that strips
/// down to nothing therefore counts as `0`; text that strips to something
/// unparseable (`"1-2"`, `"-"`) yields `None`.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    if is_nil(value) {
        return None;
    }
    if let Some(Value::Number(n)) = value {
        return n.as_f64().filter(|f| f.is_finite());
    }

    let stripped: String = to_js_string(value)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if stripped.is_empty() {
        return Some(0.0);
    }
    stripped.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// JavaScript `Number(x)`
///
/// Returns `NaN` for anything that does not convert. Callers compare with
/// the result directly so every `NaN` comparison is false.
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_js_number(s),
        Some(Value::Array(_)) => parse_js_number(&to_js_string(value)),
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_js_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&s[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    // Rust's float parser also accepts "inf" and "nan"; JS does not.
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// JavaScript `String(x)`
pub fn to_js_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format_js_number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

/// Format a float the way JavaScript prints it for ordinary magnitudes
pub fn format_js_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{:.0}", n);
    }
    n.to_string()
}

/// Text used by the `contains` operator: `String(x || '')`
pub fn contains_text(value: Option<&Value>) -> String {
    if is_falsy(value) {
        String::new()
    } else {
        to_js_string(value)
    }
}

fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().is_none_or(|f| f == 0.0 || f.is_nan()),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => false,
    }
}

/// JavaScript strict equality (`===`)
///
/// Arrays and objects compare by identity in JS, so two deserialized
/// values are never strictly equal.
pub fn strict_equals(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Value::Null), Some(Value::Null)) => true,
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x == y,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x == y,
        _ => false,
    }
}
