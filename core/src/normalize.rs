//! Tolerant conversion of loosely-typed dataset fields into typed, nullable values.
//!
//! Scraped recipe data mixes numbers, numbers-as-strings, unit-suffixed strings
//! (`"389 kcal"`) and `NaN` sentinels in the same column. Every function here is
//! total: malformed input degrades to `None` instead of failing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A field→value mapping for one raw input record, in source order.
pub type RawRecord = IndexMap<String, RawValue>;

/// A JSON value that keeps the integer/float distinction and can carry `NaN`.
///
/// Serializing a non-finite `Float` writes JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<RawValue>),
    Map(RawRecord),
}

impl RawValue {
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    /// Falsy values are null, `false`, zero, and empty text, lists or maps. `NaN` is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => f.is_nan() || f.abs() > 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&RawRecord> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::List(_) => "array",
            Self::Map(_) => "object",
        }
    }
}

/// Nutrient keys probed for a calorie figure, highest priority first.
pub const CALORIE_KEYS: [&str; 4] = ["calories", "calorieContent", "energy", "energyKcal"];

/// Extract an integer from a number or from the first signed digit run in a string.
///
/// Thousands separators are dropped before matching, so `"1,234 mg"` yields 1234.
/// Floats are truncated toward zero.
#[must_use]
pub fn parse_integer(value: Option<&RawValue>) -> Option<i64> {
    match value? {
        RawValue::Int(n) => Some(*n),
        RawValue::Float(f) => {
            let t = f.trunc();
            // NaN and infinities fail the range check too
            if t.abs() < 9.2e18 { Some(t as i64) } else { None }
        }
        RawValue::Text(s) => first_integer(&s.replace(',', "")),
        _ => None,
    }
}

fn first_integer(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let end = bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(bytes.len(), |len| start + len);
    let start = if start > 0 && bytes[start - 1] == b'-' {
        start - 1
    } else {
        start
    };
    s[start..end].parse().ok()
}

/// Pass a value through, collapsing `null` and `NaN` to `None`.
#[must_use]
pub fn to_nullable(value: Option<&RawValue>) -> Option<&RawValue> {
    value.filter(|v| !matches!(v, RawValue::Null) && !v.is_nan())
}

/// Nullable projection for text columns.
///
/// Numbers are rendered the way a text column would hold them (`4` stays `"4"`,
/// `4.0` becomes `"4.0"`); other shapes are dropped.
#[must_use]
pub fn nullable_text(value: Option<&RawValue>) -> Option<String> {
    match to_nullable(value)? {
        RawValue::Text(s) => Some(s.clone()),
        RawValue::Int(n) => Some(n.to_string()),
        RawValue::Float(f) if f.is_finite() => Some(format!("{f:?}")),
        _ => None,
    }
}

/// Nullable projection for real-valued columns.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn nullable_float(value: Option<&RawValue>) -> Option<f64> {
    match to_nullable(value)? {
        RawValue::Int(n) => Some(*n as f64),
        RawValue::Float(f) => Some(*f).filter(|f| f.is_finite()),
        RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Derive a calorie count from a nutrients mapping.
///
/// The first key of [`CALORIE_KEYS`] that is present with a non-null value decides
/// the result, even when its value does not parse.
#[must_use]
pub fn extract_calories(nutrients: Option<&RawValue>) -> Option<i64> {
    let map = nutrients?.as_map()?;
    CALORIE_KEYS
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !matches!(v, RawValue::Null)))
        .and_then(|v| parse_integer(Some(v)))
}
