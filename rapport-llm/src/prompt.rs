//! Prompt protocols for extraction calls.
//!
//! Every protocol is a versioned, testable artifact; assembly is plain
//! template interpolation. The orchestrator layers repair overrides on top
//! of these bases — see the `repair` module.

use rapport_core::config::TrackerConfig;
use rapport_core::custom::{CustomStatDef, CustomStatKind};
use rapport_core::mood::Mood;
use rapport_core::types::{Dimension, TrackerSnapshot};

/// Unified protocol: one call covers every enabled stat for every active
/// participant.
pub const UNIFIED_PROTOCOL: &str = r#"You are a relationship-state analyst for an ongoing roleplay conversation.
Read the recent conversation and judge how each listed character's feelings have shifted THIS turn.

Characters to assess: {participants}

{trend_block}Recent conversation:
{context}

For every listed character, estimate the per-turn change (delta) in each stat.
Deltas are small signed integers in [-{max_delta}, {max_delta}]; 0 means no change.
{rules}"confidence" is your certainty in this assessment, 0.0-1.0.

Return JSON in exactly this shape:
{{"characters": [{{"name": "<character>"{field_list}}}]}}"#;

/// Sequential protocol for one numeric dimension.
pub const DIMENSION_PROTOCOL: &str = r#"You are a relationship-state analyst for an ongoing roleplay conversation.
Judge each listed character's current {dimension} ({dimension_hint}).

Characters to assess: {participants}

{trend_block}Recent conversation:
{context}

Values are integers from 0 (none) to 100 (absolute); a typical per-turn shift is within {max_delta} points of the previous value.
Return JSON mapping each character name to a value:
{{"<character>": <0-100>, ...}}"#;

/// Sequential protocol for mood.
pub const MOOD_PROTOCOL: &str = r#"You are a relationship-state analyst for an ongoing roleplay conversation.
Name each listed character's current mood.

Characters to assess: {participants}

Recent conversation:
{context}

Mood must be exactly one of: {mood_vocabulary}.
Return JSON mapping each character name to a mood:
{{"<character>": {{"mood": "<mood>", "confidence": <0.0-1.0>}}, ...}}"#;

/// Sequential protocol for the last thought.
pub const THOUGHT_PROTOCOL: &str = r#"You are a relationship-state analyst for an ongoing roleplay conversation.
Write each listed character's current private thought in one short line.

Characters to assess: {participants}

Recent conversation:
{context}

Return JSON mapping each character name to a thought:
{{"<character>": {{"last_thought": "<one line>"}}, ...}}"#;

/// Sequential protocol for one custom stat.
pub const CUSTOM_STAT_PROTOCOL: &str = r#"You are a relationship-state analyst for an ongoing roleplay conversation.
Judge the custom stat "{stat_id}" for each listed character THIS turn.
{stat_rules}

Characters to assess: {participants}

Recent conversation:
{context}

Return JSON mapping each character name to a value:
{{"<character>": {{"{stat_id}": <value>}}, ...}}"#;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Everything needed to render one extraction prompt.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    /// Active participant names.
    pub participants: &'a [String],
    /// Rendered recent-conversation text.
    pub context_text: &'a str,
    /// Recent snapshots, newest first, for trend context.
    pub history: &'a [TrackerSnapshot],
    /// Engine configuration.
    pub config: &'a TrackerConfig,
}

impl PromptContext<'_> {
    fn participants_line(&self) -> String {
        self.participants.join(", ")
    }

    fn trend_block(&self) -> String {
        format_trends(self.history, self.participants)
    }

    fn max_delta(&self) -> String {
        self.config.merge.max_delta_per_turn.to_string()
    }
}

/// Render the unified prompt covering every enabled stat.
#[must_use]
pub fn unified_prompt(ctx: &PromptContext<'_>) -> String {
    let mut fields = Vec::new();
    for dimension in ctx.config.dimensions.enabled_numeric() {
        fields.push(format!(", \"{dimension}_delta\": <int>"));
    }
    if ctx.config.dimensions.mood {
        fields.push(", \"mood\": \"<mood>\"".to_string());
    }
    if ctx.config.dimensions.last_thought {
        fields.push(", \"last_thought\": \"<one line>\"".to_string());
    }
    for def in &ctx.config.custom_stats {
        fields.push(format!(", \"{}\": {}", def.id, custom_placeholder(def)));
    }
    fields.push(", \"confidence\": <0.0-1.0>".to_string());

    let mut rules = String::new();
    if ctx.config.dimensions.mood {
        rules.push_str(&format!(
            "Mood must be exactly one of: {}.\n",
            Mood::vocabulary_line()
        ));
    }
    if ctx.config.dimensions.last_thought {
        rules.push_str("\"last_thought\" is one short line of the character's private thought right now.\n");
    }

    render_template(
        UNIFIED_PROTOCOL,
        &[
            ("participants", &ctx.participants_line()),
            ("trend_block", &ctx.trend_block()),
            ("context", ctx.context_text),
            ("max_delta", &ctx.max_delta()),
            ("rules", &rules),
            ("field_list", &fields.concat()),
        ],
    )
}

/// Render the sequential prompt for one numeric dimension.
#[must_use]
pub fn dimension_prompt(ctx: &PromptContext<'_>, dimension: Dimension) -> String {
    render_template(
        DIMENSION_PROTOCOL,
        &[
            ("participants", &ctx.participants_line()),
            ("trend_block", &ctx.trend_block()),
            ("context", ctx.context_text),
            ("max_delta", &ctx.max_delta()),
            ("dimension", dimension.as_str()),
            ("dimension_hint", dimension_hint(dimension)),
        ],
    )
}

/// Render the sequential mood prompt.
#[must_use]
pub fn mood_prompt(ctx: &PromptContext<'_>) -> String {
    render_template(
        MOOD_PROTOCOL,
        &[
            ("participants", &ctx.participants_line()),
            ("context", ctx.context_text),
            ("mood_vocabulary", &Mood::vocabulary_line()),
        ],
    )
}

/// Render the sequential last-thought prompt.
#[must_use]
pub fn thought_prompt(ctx: &PromptContext<'_>) -> String {
    render_template(
        THOUGHT_PROTOCOL,
        &[
            ("participants", &ctx.participants_line()),
            ("context", ctx.context_text),
        ],
    )
}

/// Render the sequential prompt for one custom stat.
#[must_use]
pub fn custom_stat_prompt(ctx: &PromptContext<'_>, def: &CustomStatDef) -> String {
    render_template(
        CUSTOM_STAT_PROTOCOL,
        &[
            ("participants", &ctx.participants_line()),
            ("context", ctx.context_text),
            ("stat_id", &def.id),
            ("stat_rules", &custom_rules(def, ctx.config)),
        ],
    )
}

fn dimension_hint(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Affection => "warmth toward the other person",
        Dimension::Trust => "belief in the other person's reliability",
        Dimension::Desire => "romantic or physical attraction",
        Dimension::Connection => "felt closeness and understanding",
    }
}

fn custom_placeholder(def: &CustomStatDef) -> String {
    match def.kind {
        CustomStatKind::Numeric => "<int delta>".to_string(),
        CustomStatKind::Boolean => "<true|false>".to_string(),
        CustomStatKind::EnumSingle => format!("\"<one of: {}>\"", def.safe_options().join(", ")),
        CustomStatKind::TextShort => "\"<one line>\"".to_string(),
        CustomStatKind::Array => "[\"<item>\", ...]".to_string(),
    }
}

fn custom_rules(def: &CustomStatDef, config: &TrackerConfig) -> String {
    match def.kind {
        CustomStatKind::Numeric => format!(
            "The value is a signed integer delta in [-{0}, {0}].",
            config.custom_max_delta(def)
        ),
        CustomStatKind::Boolean => "The value is true or false.".to_string(),
        CustomStatKind::EnumSingle => format!(
            "The value must be exactly one of: {}.",
            def.safe_options().join(", ")
        ),
        CustomStatKind::TextShort => {
            format!("The value is one line of at most {} characters.", def.max_len)
        }
        CustomStatKind::Array => format!(
            "The value is a list of short phrases, each at most {} characters.",
            def.max_len
        ),
    }
}

/// Format recent snapshots as a short trend block, newest first.
/// Empty when there is no history.
#[must_use]
pub fn format_trends(history: &[TrackerSnapshot], participants: &[String]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Recent stat trends (newest first):".to_string()];
    for snapshot in history.iter().take(3) {
        for name in participants {
            let mut parts = Vec::new();
            for dimension in Dimension::ALL {
                if let Some(value) = snapshot.statistics.numeric(dimension).get(name) {
                    parts.push(format!("{dimension} {value}"));
                }
            }
            if let Some(mood) = snapshot.statistics.mood.get(name) {
                parts.push(format!("mood {mood}"));
            }
            if !parts.is_empty() {
                lines.push(format!("- {name}: {}", parts.join(", ")));
            }
        }
    }
    if lines.len() == 1 {
        return String::new();
    }
    lines.push(String::new());
    lines.join("\n")
}
