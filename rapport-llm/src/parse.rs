//! Response parsing — oracle text into typed, clamped values.
//!
//! The parser never fails: unparseable input yields an empty result and the
//! orchestrator's repair ladder takes it from there. Everything the oracle
//! can plausibly get wrong — prose around the JSON, name drift, numeric
//! strings, off-vocabulary moods — is tolerated and normalised here.

use serde_json::{Map, Value};
use tracing::debug;

use rapport_core::config::TrackerConfig;
use rapport_core::custom::{self, CustomStatDef, CustomStatKind, CustomValue};
use rapport_core::merge::{NumericChange, ParsedExtraction, ParsedParticipant};
use rapport_core::mood;
use rapport_core::types::{name_key, Dimension};

/// What one oracle call was asked to produce.
#[derive(Debug, Clone, Copy)]
pub enum ParseTarget<'a> {
    /// Every enabled stat for every participant, in one payload.
    Unified,
    /// One numeric dimension, as absolute values.
    Dimension(Dimension),
    /// Mood only.
    Mood,
    /// Last thought only.
    Thought,
    /// One custom stat.
    Custom(&'a CustomStatDef),
}

impl ParseTarget<'_> {
    /// Short label for progress reporting and debug traces.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            ParseTarget::Unified => "unified".to_string(),
            ParseTarget::Dimension(d) => d.as_str().to_string(),
            ParseTarget::Mood => "mood".to_string(),
            ParseTarget::Thought => "last_thought".to_string(),
            ParseTarget::Custom(def) => def.id.clone(),
        }
    }
}

/// Parsing context: who is on stage, and how values are bounded.
#[derive(Debug, Clone, Copy)]
pub struct ParserContext<'a> {
    /// Active participant names (canonical spellings).
    pub active: &'a [String],
    /// Engine configuration — aliases, custom defs, delta ceiling, lexicon.
    pub config: &'a TrackerConfig,
}

/// Parse raw oracle text into per-participant values.
///
/// Total: malformed input produces an empty [`ParsedExtraction`].
#[must_use]
pub fn parse_response(
    raw: &str,
    target: &ParseTarget<'_>,
    ctx: &ParserContext<'_>,
) -> ParsedExtraction {
    let mut result = ParsedExtraction::default();
    let Some(root) = extract_json(raw) else {
        debug!(target = %target.label(), "no JSON object found in oracle text");
        return result;
    };
    let Some(root) = root.as_object() else {
        return result;
    };

    // Shape A: {"characters": [{"name": ..., ...}, ...]}
    if let Some(rows) = root.get("characters").and_then(Value::as_array) {
        for row in rows {
            let Some(row) = row.as_object() else { continue };
            let Some(raw_name) = row.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(name) = resolve_name(raw_name, ctx) else {
                debug!(%raw_name, "dropping unresolvable character name");
                continue;
            };
            let parsed = parse_fields(row, target, ctx);
            result.participants.entry(name).or_default().absorb(parsed);
        }
        return result;
    }

    // Shape B: object keyed directly by participant name.
    for (raw_name, value) in root {
        let Some(name) = resolve_name(raw_name, ctx) else {
            debug!(%raw_name, "dropping unresolvable participant key");
            continue;
        };
        let parsed = match value {
            Value::Object(fields) => parse_fields(fields, target, ctx),
            other => parse_scalar(other, target, ctx),
        };
        result.participants.entry(name).or_default().absorb(parsed);
    }
    result
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Pull a JSON object out of free-form oracle text.
///
/// Tries a strict parse first, then the first balanced `{...}` substring.
#[must_use]
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = strip_code_fences(raw.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let candidate = balanced_object(trimmed)?;
    serde_json::from_str::<Value>(candidate)
        .ok()
        .filter(Value::is_object)
}

/// Strip a leading/trailing Markdown code fence, if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let inner = trimmed.trim_start_matches("```");
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim_end_matches("```").trim()
}

/// The first balanced top-level `{...}` substring, string-aware.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------------

/// Match an oracle-provided name to an active participant.
///
/// Exact match, then case/space-insensitive, then the alias table (also
/// case/space-insensitive). Unresolvable names are dropped by the caller.
#[must_use]
pub fn resolve_name(raw: &str, ctx: &ParserContext<'_>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(exact) = ctx.active.iter().find(|n| n.as_str() == trimmed) {
        return Some(exact.clone());
    }

    let key = name_key(trimmed);
    if let Some(relaxed) = ctx.active.iter().find(|n| name_key(n) == key) {
        return Some(relaxed.clone());
    }

    let canonical = ctx
        .config
        .aliases
        .iter()
        .find(|(alias, _)| name_key(alias) == key)
        .map(|(_, canonical)| canonical)?;
    let canonical_key = name_key(canonical);
    ctx.active
        .iter()
        .find(|n| name_key(n) == canonical_key)
        .cloned()
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Parse a field object for one participant.
fn parse_fields(
    fields: &Map<String, Value>,
    target: &ParseTarget<'_>,
    ctx: &ParserContext<'_>,
) -> ParsedParticipant {
    let mut parsed = ParsedParticipant::default();

    match target {
        ParseTarget::Unified => {
            for dimension in Dimension::ALL {
                let delta_key = format!("{dimension}_delta");
                if let Some(delta) = fields.get(&delta_key).and_then(coerce_integer) {
                    parsed.numeric.insert(
                        dimension,
                        NumericChange::Delta(clamp_delta(delta, ctx.config.merge.max_delta_per_turn)),
                    );
                } else if let Some(value) = fields.get(dimension.as_str()).and_then(coerce_integer)
                {
                    parsed
                        .numeric
                        .insert(dimension, NumericChange::Set(value.clamp(0, 100)));
                }
            }
            for def in &ctx.config.custom_stats {
                if let Some(value) = field_ci(fields, &def.id) {
                    absorb_custom(&mut parsed, def, value, ctx);
                }
            }
            parse_mood_field(fields, &mut parsed, ctx);
            parse_thought_field(fields, &mut parsed);
        }
        ParseTarget::Dimension(dimension) => {
            if let Some(delta) = fields.get("delta").and_then(coerce_integer) {
                parsed.numeric.insert(
                    *dimension,
                    NumericChange::Delta(clamp_delta(delta, ctx.config.merge.max_delta_per_turn)),
                );
            } else if let Some(value) = fields
                .get("value")
                .or_else(|| fields.get(dimension.as_str()))
                .and_then(coerce_integer)
            {
                parsed
                    .numeric
                    .insert(*dimension, NumericChange::Set(value.clamp(0, 100)));
            }
        }
        ParseTarget::Mood => parse_mood_field(fields, &mut parsed, ctx),
        ParseTarget::Thought => parse_thought_field(fields, &mut parsed),
        ParseTarget::Custom(def) => {
            if let Some(value) = field_ci(fields, &def.id).or_else(|| fields.get("value")) {
                absorb_custom(&mut parsed, def, value, ctx);
            }
        }
    }

    if let Some(confidence) = fields.get("confidence").and_then(coerce_float) {
        parsed.confidence = Some(confidence.clamp(0.0, 1.0) as f32);
    }

    parsed
}

/// Parse a bare (non-object) value for one participant.
fn parse_scalar(
    value: &Value,
    target: &ParseTarget<'_>,
    ctx: &ParserContext<'_>,
) -> ParsedParticipant {
    let mut parsed = ParsedParticipant::default();
    match target {
        ParseTarget::Dimension(dimension) => {
            if let Some(number) = coerce_integer(value) {
                parsed
                    .numeric
                    .insert(*dimension, NumericChange::Set(number.clamp(0, 100)));
            }
        }
        ParseTarget::Mood => {
            if let Some(raw) = value.as_str() {
                parsed.mood = Some(mood::coerce(raw, &ctx.config.mood_lexicon));
            }
        }
        ParseTarget::Thought => {
            if let Some(raw) = value.as_str() {
                let line = raw.lines().next().unwrap_or("").trim();
                if !line.is_empty() {
                    parsed.last_thought = Some(line.to_string());
                }
            }
        }
        ParseTarget::Custom(def) => absorb_custom(&mut parsed, def, value, ctx),
        ParseTarget::Unified => {}
    }
    parsed
}

fn parse_mood_field(
    fields: &Map<String, Value>,
    parsed: &mut ParsedParticipant,
    ctx: &ParserContext<'_>,
) {
    if let Some(raw) = fields.get("mood").and_then(Value::as_str) {
        if !raw.trim().is_empty() {
            parsed.mood = Some(mood::coerce(raw, &ctx.config.mood_lexicon));
        }
    }
}

fn parse_thought_field(fields: &Map<String, Value>, parsed: &mut ParsedParticipant) {
    let raw = fields
        .get("last_thought")
        .or_else(|| fields.get("lastThought"))
        .or_else(|| fields.get("thought"))
        .and_then(Value::as_str);
    if let Some(raw) = raw {
        let line = raw.lines().next().unwrap_or("").trim();
        if !line.is_empty() {
            parsed.last_thought = Some(line.to_string());
        }
    }
}

/// Coerce and record one custom-stat value according to its declared kind.
fn absorb_custom(
    parsed: &mut ParsedParticipant,
    def: &CustomStatDef,
    value: &Value,
    ctx: &ParserContext<'_>,
) {
    match def.kind {
        CustomStatKind::Numeric => {
            if let Some(number) = coerce_integer(value) {
                let ceiling = ctx.config.custom_max_delta(def);
                parsed
                    .custom_numeric
                    .insert(def.id.clone(), NumericChange::Delta(clamp_delta(number, ceiling)));
            }
        }
        CustomStatKind::Boolean => {
            if let Some(flag) = custom::coerce_boolean(value) {
                parsed
                    .custom_other
                    .insert(def.id.clone(), CustomValue::Bool(flag));
            }
        }
        CustomStatKind::EnumSingle => {
            if let Some(option) = custom::coerce_enum(value, def) {
                parsed
                    .custom_other
                    .insert(def.id.clone(), CustomValue::Enum(option));
            }
        }
        CustomStatKind::TextShort => {
            if let Some(text) = custom::coerce_text(value, def.max_len) {
                parsed
                    .custom_other
                    .insert(def.id.clone(), CustomValue::Text(text));
            }
        }
        CustomStatKind::Array => {
            if let Some(items) = custom::coerce_array(value, def.max_len) {
                parsed
                    .custom_other
                    .insert(def.id.clone(), CustomValue::List(items));
            }
        }
    }
}

/// Case-insensitive field lookup.
fn field_ci<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields
        .get(key)
        .or_else(|| {
            let wanted = key.to_lowercase();
            fields
                .iter()
                .find(|(k, _)| k.to_lowercase() == wanted)
                .map(|(_, v)| v)
        })
}

/// Accept a JSON number or numeric string; round to integer.
fn coerce_integer(value: &Value) -> Option<i64> {
    coerce_float(value).map(|f| f.round() as i64)
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn clamp_delta(delta: i64, ceiling: i64) -> i64 {
    delta.clamp(-ceiling, ceiling)
}
