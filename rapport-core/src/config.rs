//! Configuration for the rapport engine.
//!
//! Maps directly to `rapport.toml`. Every knob has a serde default and is
//! clamped into its documented range by [`TrackerConfig::normalized`], so a
//! hand-edited config file can never push the engine outside its envelope.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::custom::CustomStatDef;
use crate::mood::{Mood, MoodLexicon};
use crate::types::Dimension;

/// Top-level tracker configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Which dimensions are tracked at all.
    #[serde(default)]
    pub dimensions: DimensionToggles,
    /// Oracle call scheduling and retry settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Merge arithmetic tuning.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Activity resolution settings.
    #[serde(default)]
    pub activity: ActivityConfig,
    /// Default values used for backfill and baseline synthesis.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Host-declared custom stats.
    #[serde(default)]
    pub custom_stats: Vec<CustomStatDef>,
    /// Alias table: alternate spelling → canonical participant name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Mood synonym table.
    #[serde(default)]
    pub mood_lexicon: MoodLexicon,
}

impl TrackerConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RapportError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| crate::RapportError::Config(e.to_string()))?;
        Ok(config.normalized())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Clamp every knob into its documented range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.extraction.max_concurrent_calls = self.extraction.max_concurrent_calls.clamp(1, 8);
        self.extraction.context_messages = self.extraction.context_messages.clamp(1, 40);
        self.extraction.max_retries_per_stat = self.extraction.max_retries_per_stat.min(4);
        self.merge.max_delta_per_turn = self.merge.max_delta_per_turn.clamp(1, 30);
        self.merge.confidence_dampening = self.merge.confidence_dampening.clamp(0.0, 1.0);
        self.merge.mood_stickiness = self.merge.mood_stickiness.clamp(0.0, 1.0);
        self.activity.lookback = self.activity.lookback.clamp(1, 25);
        self
    }

    /// The per-turn delta ceiling for one custom numeric stat.
    #[must_use]
    pub fn custom_max_delta(&self, def: &CustomStatDef) -> i64 {
        def.max_delta.unwrap_or(self.merge.max_delta_per_turn)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Per-dimension enable toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionToggles {
    /// Track affection.
    #[serde(default = "default_true")]
    pub affection: bool,
    /// Track trust.
    #[serde(default = "default_true")]
    pub trust: bool,
    /// Track desire.
    #[serde(default = "default_true")]
    pub desire: bool,
    /// Track connection.
    #[serde(default = "default_true")]
    pub connection: bool,
    /// Track mood.
    #[serde(default = "default_true")]
    pub mood: bool,
    /// Track the free-text last thought.
    #[serde(default = "default_true")]
    pub last_thought: bool,
}

impl Default for DimensionToggles {
    fn default() -> Self {
        Self {
            affection: true,
            trust: true,
            desire: true,
            connection: true,
            mood: true,
            last_thought: true,
        }
    }
}

impl DimensionToggles {
    /// Whether a numeric dimension is enabled.
    #[must_use]
    pub fn numeric_enabled(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Affection => self.affection,
            Dimension::Trust => self.trust,
            Dimension::Desire => self.desire,
            Dimension::Connection => self.connection,
        }
    }

    /// The enabled numeric dimensions, in canonical order.
    #[must_use]
    pub fn enabled_numeric(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.numeric_enabled(*d))
            .collect()
    }
}

/// How the oracle produces its text: one combined call, or one per stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// One oracle call per attempt covering every enabled stat.
    #[default]
    Unified,
    /// One call per stat, fanned out under the concurrency ceiling.
    Sequential,
}

/// Oracle call scheduling and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Unified vs sequential extraction.
    #[serde(default)]
    pub mode: ExtractionMode,
    /// Concurrency ceiling for sequential mode, 1–8.
    #[serde(default = "default_3")]
    pub max_concurrent_calls: u32,
    /// Repair-ladder length per stat, 0–4.
    #[serde(default = "default_2")]
    pub max_retries_per_stat: u32,
    /// Whether the stricter "return ONLY JSON" rung is used at all.
    #[serde(default = "default_true")]
    pub strict_json_repair: bool,
    /// How many recent messages of context the oracle sees, 1–40.
    #[serde(default = "default_10")]
    pub context_messages: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Unified,
            max_concurrent_calls: 3,
            max_retries_per_stat: 2,
            strict_json_repair: true,
            context_messages: 10,
        }
    }
}

/// Merge arithmetic tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Per-turn ceiling on any single numeric delta, 1–30.
    #[serde(default = "default_15")]
    pub max_delta_per_turn: i64,
    /// How much an uncertain extraction is discounted, 0–1.
    #[serde(default = "default_dampening")]
    pub confidence_dampening: f32,
    /// Resistance to mood changes on weak evidence, 0–1.
    #[serde(default = "default_stickiness")]
    pub mood_stickiness: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_delta_per_turn: 15,
            confidence_dampening: 0.65,
            mood_stickiness: 0.6,
        }
    }
}

/// Activity resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// When disabled, every known participant is always active.
    #[serde(default = "default_true")]
    pub auto_detect_active: bool,
    /// Recency window in trackable messages, 1–25.
    #[serde(default = "default_5")]
    pub lookback: usize,
    /// Departure-cue vocabulary.
    #[serde(default)]
    pub departure: DepartureLexicon,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            auto_detect_active: true,
            lookback: 5,
            departure: DepartureLexicon::default(),
        }
    }
}

/// Data-driven vocabulary for detecting "X left the scene" narration.
///
/// A cue is a user message naming a participant together with one verb and
/// one place term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartureLexicon {
    /// Movement/stay verbs.
    pub verbs: Vec<String>,
    /// Location and direction nouns.
    pub places: Vec<String>,
}

impl Default for DepartureLexicon {
    fn default() -> Self {
        let verbs = [
            "left", "walked", "went", "headed", "stormed", "ran", "stepped", "stayed in",
            "is in", "remained in", "retreated",
        ];
        let places = [
            "room", "outside", "away", "home", "door", "kitchen", "garden", "upstairs",
            "downstairs", "bathroom", "bed", "hall", "balcony", "car", "office",
        ];
        Self {
            verbs: verbs.iter().map(|s| (*s).to_string()).collect(),
            places: places.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Default values used for backfill and baseline synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Global numeric defaults per dimension.
    #[serde(default = "default_numeric_defaults")]
    pub numeric: BTreeMap<Dimension, u8>,
    /// Default mood.
    #[serde(default)]
    pub mood: Mood,
    /// Per-participant overrides, keyed by display name.
    #[serde(default)]
    pub per_participant: BTreeMap<String, ParticipantDefaults>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            numeric: default_numeric_defaults(),
            mood: Mood::Neutral,
            per_participant: BTreeMap::new(),
        }
    }
}

impl DefaultsConfig {
    /// The default for one numeric dimension and participant, preferring the
    /// per-participant override.
    #[must_use]
    pub fn numeric_for(&self, name: &str, dimension: Dimension) -> u8 {
        let key = crate::types::name_key(name);
        self.per_participant
            .iter()
            .find(|(n, _)| crate::types::name_key(n) == key)
            .and_then(|(_, overrides)| overrides.numeric.get(&dimension).copied())
            .or_else(|| self.numeric.get(&dimension).copied())
            .unwrap_or(50)
    }

    /// The default mood for one participant.
    #[must_use]
    pub fn mood_for(&self, name: &str) -> Mood {
        let key = crate::types::name_key(name);
        self.per_participant
            .iter()
            .find(|(n, _)| crate::types::name_key(n) == key)
            .and_then(|(_, overrides)| overrides.mood)
            .unwrap_or(self.mood)
    }
}

/// Per-participant default overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantDefaults {
    /// Numeric overrides per dimension.
    #[serde(default)]
    pub numeric: BTreeMap<Dimension, u8>,
    /// Mood override.
    #[serde(default)]
    pub mood: Option<Mood>,
}

fn default_numeric_defaults() -> BTreeMap<Dimension, u8> {
    let mut map = BTreeMap::new();
    map.insert(Dimension::Affection, 50);
    map.insert(Dimension::Trust, 40);
    map.insert(Dimension::Desire, 30);
    map.insert(Dimension::Connection, 40);
    map
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_2() -> u32 {
    2
}
fn default_3() -> u32 {
    3
}
fn default_5() -> usize {
    5
}
fn default_10() -> usize {
    10
}
fn default_15() -> i64 {
    15
}
fn default_dampening() -> f32 {
    0.65
}
fn default_stickiness() -> f32 {
    0.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let config = TrackerConfig::default().normalized();
        assert_eq!(config.extraction.max_concurrent_calls, 3);
        assert_eq!(config.merge.max_delta_per_turn, 15);
        assert!((config.merge.confidence_dampening - 0.65).abs() < f32::EPSILON);
    }

    #[test]
    fn normalization_clamps_out_of_range_knobs() {
        let mut config = TrackerConfig::default();
        config.extraction.max_concurrent_calls = 99;
        config.merge.max_delta_per_turn = 0;
        config.merge.mood_stickiness = 7.0;
        config.activity.lookback = 0;

        let config = config.normalized();
        assert_eq!(config.extraction.max_concurrent_calls, 8);
        assert_eq!(config.merge.max_delta_per_turn, 1);
        assert!((config.merge.mood_stickiness - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.activity.lookback, 1);
    }

    #[test]
    fn toml_round_trip_with_custom_stat() {
        let toml_str = r#"
            [extraction]
            mode = "sequential"
            max_concurrent_calls = 2

            [merge]
            max_delta_per_turn = 10

            [[custom_stats]]
            id = "suspicion"
            kind = "numeric"
            max = 100

            [aliases]
            "ali" = "Alice"
        "#;
        let config = TrackerConfig::from_toml(toml_str).expect("parse");
        assert_eq!(config.extraction.mode, ExtractionMode::Sequential);
        assert_eq!(config.custom_stats.len(), 1);
        assert_eq!(config.aliases.get("ali").map(String::as_str), Some("Alice"));
    }

    #[test]
    fn per_participant_defaults_override_globals() {
        let mut config = TrackerConfig::default();
        let mut overrides = ParticipantDefaults::default();
        overrides.numeric.insert(Dimension::Affection, 80);
        overrides.mood = Some(Mood::Happy);
        config
            .defaults
            .per_participant
            .insert("Alice".into(), overrides);

        assert_eq!(config.defaults.numeric_for("alice ", Dimension::Affection), 80);
        assert_eq!(config.defaults.numeric_for("Alice", Dimension::Trust), 40);
        assert_eq!(config.defaults.numeric_for("Bob", Dimension::Affection), 50);
        assert_eq!(config.defaults.mood_for("ALICE"), Mood::Happy);
        assert_eq!(config.defaults.mood_for("Bob"), Mood::Neutral);
    }
}
