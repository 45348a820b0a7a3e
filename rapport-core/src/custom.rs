//! Custom stat definitions and value coercion.
//!
//! Hosts can declare open-ended stats beyond the built-in dimensions. Each
//! declares its own kind and bounds at configuration time; parsing and merge
//! run them through the same machinery as the built-ins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard cap on items accepted into an `Array` stat.
pub const MAX_ARRAY_ITEMS: usize = 20;

/// What shape of value a custom stat holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomStatKind {
    /// Integer within declared `[min, max]` bounds.
    Numeric,
    /// Plain true/false flag.
    Boolean,
    /// Exactly one member of the declared option list.
    EnumSingle,
    /// One line of free text, truncated to the declared length.
    TextShort,
    /// A short list of strings, deduplicated and capped.
    Array,
}

/// A host-declared custom stat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomStatDef {
    /// Stable identifier; doubles as the field name in oracle payloads.
    pub id: String,
    /// Value kind.
    pub kind: CustomStatKind,
    /// Lower bound for `Numeric` stats.
    #[serde(default)]
    pub min: i64,
    /// Upper bound for `Numeric` stats.
    #[serde(default = "default_max")]
    pub max: i64,
    /// Starting value for `Numeric` stats when nothing is known.
    #[serde(default = "default_numeric")]
    pub default_numeric: i64,
    /// Option list for `EnumSingle` stats.
    #[serde(default)]
    pub options: Vec<String>,
    /// Max characters for `TextShort` content and `Array` items.
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    /// Per-turn delta ceiling override for `Numeric` stats.
    #[serde(default)]
    pub max_delta: Option<i64>,
}

fn default_max() -> i64 {
    100
}

fn default_numeric() -> i64 {
    50
}

fn default_max_len() -> usize {
    80
}

impl CustomStatDef {
    /// A numeric stat with the standard 0–100 scale.
    #[must_use]
    pub fn numeric(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CustomStatKind::Numeric,
            min: 0,
            max: 100,
            default_numeric: 50,
            options: Vec::new(),
            max_len: default_max_len(),
            max_delta: None,
        }
    }

    /// Clamp a raw value into this stat's declared bounds.
    #[must_use]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    /// Option list with script-like entries removed, as used for matching
    /// and for protocol text shown to the oracle.
    #[must_use]
    pub fn safe_options(&self) -> Vec<&str> {
        self.options
            .iter()
            .map(String::as_str)
            .filter(|o| !looks_scripty(o))
            .collect()
    }
}

/// A parsed non-numeric custom value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CustomValue {
    /// Boolean flag.
    Bool(bool),
    /// Selected enum option, verbatim from the declared list.
    Enum(String),
    /// Short text line.
    Text(String),
    /// Deduplicated string list.
    List(Vec<String>),
}

/// Reject option strings carrying markup or script content.
fn looks_scripty(option: &str) -> bool {
    let lower = option.to_lowercase();
    lower.contains('<')
        || lower.contains('>')
        || lower.contains("javascript:")
        || lower.contains("onerror=")
        || lower.contains("onload=")
}

// ---------------------------------------------------------------------------
// Coercion — one function per kind, all drop-on-failure
// ---------------------------------------------------------------------------

/// Accept a literal boolean or the strings "true"/"false".
#[must_use]
pub fn coerce_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accept an exact (or case/space-insensitive) member of the option list.
#[must_use]
pub fn coerce_enum(value: &Value, def: &CustomStatDef) -> Option<String> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    let options = def.safe_options();
    if let Some(exact) = options.iter().find(|o| **o == raw) {
        return Some((*exact).to_string());
    }
    let key = crate::types::name_key(raw);
    options
        .iter()
        .find(|o| crate::types::name_key(o) == key)
        .map(|o| (*o).to_string())
}

/// Accept a list, or a delimiter-separated string, of short items.
///
/// Items are deduplicated case-insensitively, truncated to `max_len`,
/// and capped at [`MAX_ARRAY_ITEMS`].
#[must_use]
pub fn coerce_array(value: &Value, max_len: usize) -> Option<Vec<String>> {
    let raw_items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s
            .split(|c| c == ',' || c == ';' || c == '|')
            .map(str::to_string)
            .collect(),
        _ => return None,
    };

    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for item in raw_items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let truncated = truncate_chars(trimmed, max_len);
        if seen.insert(truncated.to_lowercase()) {
            out.push(truncated);
            if out.len() == MAX_ARRAY_ITEMS {
                break;
            }
        }
    }
    Some(out)
}

/// Accept one line of text, truncated to `max_len` characters.
#[must_use]
pub fn coerce_text(value: &Value, max_len: usize) -> Option<String> {
    let raw = value.as_str()?;
    let line = raw.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return None;
    }
    Some(truncate_chars(line, max_len))
}

/// Char-boundary-safe truncation.
fn truncate_chars(s: &str, max_len: usize) -> String {
    s.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enum_def(options: &[&str]) -> CustomStatDef {
        CustomStatDef {
            id: "standing".into(),
            kind: CustomStatKind::EnumSingle,
            min: 0,
            max: 100,
            default_numeric: 50,
            options: options.iter().map(|s| (*s).to_string()).collect(),
            max_len: 40,
            max_delta: None,
        }
    }

    #[test]
    fn boolean_accepts_literals_and_strings() {
        assert_eq!(coerce_boolean(&json!(true)), Some(true));
        assert_eq!(coerce_boolean(&json!("False")), Some(false));
        assert_eq!(coerce_boolean(&json!("yes")), None);
        assert_eq!(coerce_boolean(&json!(1)), None);
    }

    #[test]
    fn enum_matches_case_and_space_insensitively() {
        let def = enum_def(&["Close Friend", "Stranger"]);
        assert_eq!(
            coerce_enum(&json!("close friend"), &def),
            Some("Close Friend".to_string())
        );
        assert_eq!(coerce_enum(&json!("enemy"), &def), None);
    }

    #[test]
    fn scripty_options_are_never_matched() {
        let def = enum_def(&["Friend", "<script>alert(1)</script>"]);
        assert_eq!(coerce_enum(&json!("<script>alert(1)</script>"), &def), None);
        assert_eq!(def.safe_options(), vec!["Friend"]);
    }

    #[test]
    fn array_splits_dedups_and_caps() {
        let parsed = coerce_array(&json!("brave, kind; brave | curious"), 40).expect("array");
        assert_eq!(parsed, vec!["brave", "kind", "curious"]);

        let many: Vec<String> = (0..40).map(|i| format!("item{i}")).collect();
        let parsed = coerce_array(&json!(many), 40).expect("array");
        assert_eq!(parsed.len(), MAX_ARRAY_ITEMS);
    }

    #[test]
    fn array_truncates_items() {
        let parsed = coerce_array(&json!(["abcdefghij"]), 4).expect("array");
        assert_eq!(parsed, vec!["abcd"]);
    }

    #[test]
    fn text_takes_first_line_only() {
        let parsed = coerce_text(&json!("first line\nsecond line"), 40).expect("text");
        assert_eq!(parsed, "first line");
        assert_eq!(coerce_text(&json!("   \n"), 40), None);
    }

    #[test]
    fn numeric_def_clamps_to_declared_bounds() {
        let mut def = CustomStatDef::numeric("tension");
        def.min = -10;
        def.max = 10;
        assert_eq!(def.clamp(25), 10);
        assert_eq!(def.clamp(-25), -10);
    }
}
