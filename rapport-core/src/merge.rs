//! Merge engine — parsed oracle output onto the previous snapshot.
//!
//! Deterministic and pure: same parsed input, previous snapshot, and
//! settings always produce the same new snapshot. All the arithmetic that
//! keeps state bounded and monotone-feeling lives here: confidence
//! dampening, mood stickiness, clamping, and default backfill.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::custom::{CustomStatKind, CustomValue};
use crate::mood::Mood;
use crate::types::{clamp_stat, name_key, Dimension, TrackerSnapshot};

// ---------------------------------------------------------------------------
// Parsed input
// ---------------------------------------------------------------------------

/// One numeric adjustment from the oracle: a bounded signed delta, or an
/// absolute target the value is pulled toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NumericChange {
    /// Signed per-turn adjustment, already clamped to the delta ceiling.
    Delta(i64),
    /// Absolute target, already clamped to the stat's bounds.
    Set(i64),
}

/// Everything the parser recovered for one participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedParticipant {
    /// Built-in numeric changes.
    #[serde(default)]
    pub numeric: BTreeMap<Dimension, NumericChange>,
    /// Parsed mood, already coerced onto the vocabulary.
    #[serde(default)]
    pub mood: Option<Mood>,
    /// Parsed last thought.
    #[serde(default)]
    pub last_thought: Option<String>,
    /// Oracle-reported confidence, clamped to [0, 1].
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Custom numeric changes, keyed by stat id.
    #[serde(default)]
    pub custom_numeric: BTreeMap<String, NumericChange>,
    /// Custom non-numeric values, keyed by stat id.
    #[serde(default)]
    pub custom_other: BTreeMap<String, CustomValue>,
}

impl ParsedParticipant {
    /// Whether nothing at all was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numeric.is_empty()
            && self.mood.is_none()
            && self.last_thought.is_none()
            && self.custom_numeric.is_empty()
            && self.custom_other.is_empty()
    }

    /// Fold another parse result for the same participant into this one.
    /// Later fields win; used to combine per-stat calls in sequential mode.
    pub fn absorb(&mut self, other: ParsedParticipant) {
        self.numeric.extend(other.numeric);
        if other.mood.is_some() {
            self.mood = other.mood;
        }
        if other.last_thought.is_some() {
            self.last_thought = other.last_thought;
        }
        if other.confidence.is_some() {
            self.confidence = other.confidence;
        }
        self.custom_numeric.extend(other.custom_numeric);
        self.custom_other.extend(other.custom_other);
    }
}

/// The aggregated parse result for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedExtraction {
    /// Per-participant results, keyed by canonical display name.
    pub participants: BTreeMap<String, ParsedParticipant>,
}

impl ParsedExtraction {
    /// Whether no participant carries any parsed value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.values().all(ParsedParticipant::is_empty)
    }

    /// Fold another extraction into this one, participant by participant.
    pub fn absorb(&mut self, other: ParsedExtraction) {
        for (name, parsed) in other.participants {
            self.participants.entry(name).or_default().absorb(parsed);
        }
    }

    /// Borrow one participant's parse result by case/space-insensitive name.
    #[must_use]
    pub fn participant(&self, name: &str) -> Option<&ParsedParticipant> {
        let key = name_key(name);
        self.participants
            .iter()
            .find(|(n, _)| name_key(n) == key)
            .map(|(_, p)| p)
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge parsed oracle output onto the previous snapshot.
///
/// Active participants receive updates, backfill, and stickiness checks;
/// everyone else is carried over from the previous snapshot untouched.
#[must_use]
pub fn merge(
    parsed: &ParsedExtraction,
    previous: &TrackerSnapshot,
    active: &[String],
    config: &TrackerConfig,
) -> TrackerSnapshot {
    // Start from the previous snapshot so inactive participants persist.
    let mut next = TrackerSnapshot {
        id: crate::types::SnapshotId::new(),
        timestamp: chrono::Utc::now(),
        active_participants: active.to_vec(),
        statistics: previous.statistics.clone(),
        custom_numeric: previous.custom_numeric.clone(),
        custom_other: previous.custom_other.clone(),
    };

    for name in active {
        let participant = parsed.participant(name);
        let confidence = participant
            .and_then(|p| p.confidence)
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let weight = f64::from(1.0 - config.merge.confidence_dampening * (1.0 - confidence));

        // --- Built-in numeric dimensions ---
        for dimension in Dimension::ALL {
            if !config.dimensions.numeric_enabled(dimension) {
                continue;
            }
            let map = next.statistics.numeric_mut(dimension);
            let previous_value = lookup(map, name).map(i64::from);
            let change = participant.and_then(|p| p.numeric.get(&dimension).copied());

            let merged = match (previous_value, change) {
                (Some(prev), Some(change)) => apply_numeric(prev, change, weight, 0, 100),
                (Some(prev), None) => prev,
                (None, Some(NumericChange::Set(v))) => v.clamp(0, 100),
                (None, Some(NumericChange::Delta(d))) => {
                    // No recorded value yet: the delta adjusts the default.
                    let base = i64::from(config.defaults.numeric_for(name, dimension));
                    apply_numeric(base, NumericChange::Delta(d), weight, 0, 100)
                }
                (None, None) => i64::from(config.defaults.numeric_for(name, dimension)),
            };
            insert(map, name, clamp_stat(merged));
        }

        // --- Mood, with stickiness ---
        if config.dimensions.mood {
            let previous_mood = lookup(&next.statistics.mood, name);
            let parsed_mood = participant.and_then(|p| p.mood);
            let merged = match (previous_mood, parsed_mood) {
                (Some(prev), Some(new)) if new != prev => {
                    // Signal strength is the oracle's confidence; absent
                    // confidence counts as full strength.
                    let signal = participant.and_then(|p| p.confidence).unwrap_or(1.0);
                    if signal > 1.0 - config.merge.mood_stickiness {
                        new
                    } else {
                        prev
                    }
                }
                (Some(prev), _) => prev,
                (None, Some(new)) => new,
                (None, None) => config.defaults.mood_for(name),
            };
            insert(&mut next.statistics.mood, name, merged);
        }

        // --- Last thought: overwrite when present, else retain ---
        if config.dimensions.last_thought {
            if let Some(thought) = participant.and_then(|p| p.last_thought.clone()) {
                insert(&mut next.statistics.last_thought, name, thought);
            } else if lookup(&next.statistics.last_thought, name).is_none() {
                insert(&mut next.statistics.last_thought, name, String::new());
            }
        }

        // --- Custom stats ---
        for def in &config.custom_stats {
            match def.kind {
                CustomStatKind::Numeric => {
                    let map = next.custom_numeric.entry(def.id.clone()).or_default();
                    let previous_value = lookup(map, name);
                    let change =
                        participant.and_then(|p| p.custom_numeric.get(&def.id).copied());
                    let merged = match (previous_value, change) {
                        (Some(prev), Some(change)) => {
                            apply_numeric(prev, change, weight, def.min, def.max)
                        }
                        (Some(prev), None) => prev,
                        (None, Some(NumericChange::Set(v))) => def.clamp(v),
                        (None, Some(NumericChange::Delta(d))) => apply_numeric(
                            def.clamp(def.default_numeric),
                            NumericChange::Delta(d),
                            weight,
                            def.min,
                            def.max,
                        ),
                        (None, None) => def.clamp(def.default_numeric),
                    };
                    insert(map, name, merged);
                }
                CustomStatKind::Boolean
                | CustomStatKind::EnumSingle
                | CustomStatKind::TextShort
                | CustomStatKind::Array => {
                    let map = next.custom_other.entry(def.id.clone()).or_default();
                    if let Some(value) =
                        participant.and_then(|p| p.custom_other.get(&def.id).cloned())
                    {
                        insert(map, name, value);
                    } else if lookup(map, name).is_none() {
                        if let Some(default) = default_custom_value(def) {
                            insert(map, name, default);
                        }
                    }
                }
            }
        }
    }

    next
}

/// Kind-appropriate backfill for a non-numeric custom stat.
fn default_custom_value(def: &crate::custom::CustomStatDef) -> Option<CustomValue> {
    match def.kind {
        CustomStatKind::Numeric => None,
        CustomStatKind::Boolean => Some(CustomValue::Bool(false)),
        CustomStatKind::EnumSingle => def
            .safe_options()
            .first()
            .map(|o| CustomValue::Enum((*o).to_string())),
        CustomStatKind::TextShort => Some(CustomValue::Text(String::new())),
        CustomStatKind::Array => Some(CustomValue::List(Vec::new())),
    }
}

/// Apply one numeric change under the confidence weight, clamped to bounds.
fn apply_numeric(prev: i64, change: NumericChange, weight: f64, min: i64, max: i64) -> i64 {
    let target = match change {
        NumericChange::Delta(d) => prev as f64 + d as f64 * weight,
        NumericChange::Set(v) => prev as f64 + (v as f64 - prev as f64) * weight,
    };
    (target.round() as i64).clamp(min, max)
}

/// Case/space-insensitive map lookup by participant name.
fn lookup<V: Clone>(map: &BTreeMap<String, V>, name: &str) -> Option<V> {
    let key = name_key(name);
    map.iter()
        .find(|(n, _)| name_key(n) == key)
        .map(|(_, v)| v.clone())
}

/// Insert under the existing spelling of `name` if one is present.
fn insert<V>(map: &mut BTreeMap<String, V>, name: &str, value: V) {
    let key = name_key(name);
    let existing = map.keys().find(|n| name_key(n) == key).cloned();
    map.insert(existing.unwrap_or_else(|| name.to_string()), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed_with(name: &str, participant: ParsedParticipant) -> ParsedExtraction {
        let mut parsed = ParsedExtraction::default();
        parsed.participants.insert(name.to_string(), participant);
        parsed
    }

    fn previous_with_affection(name: &str, value: u8) -> TrackerSnapshot {
        let mut snapshot = TrackerSnapshot::empty(vec![name.to_string()]);
        snapshot.statistics.affection.insert(name.into(), value);
        snapshot.statistics.mood.insert(name.into(), Mood::Happy);
        snapshot
            .statistics
            .last_thought
            .insert(name.into(), "earlier thought".into());
        for dimension in [Dimension::Trust, Dimension::Desire, Dimension::Connection] {
            snapshot
                .statistics
                .numeric_mut(dimension)
                .insert(name.into(), 40);
        }
        snapshot
    }

    #[test]
    fn full_confidence_applies_full_delta() {
        let mut participant = ParsedParticipant::default();
        participant
            .numeric
            .insert(Dimension::Affection, NumericChange::Delta(10));
        participant.confidence = Some(1.0);

        let merged = merge(
            &parsed_with("Alice", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.affection["Alice"], 60);
    }

    #[test]
    fn zero_confidence_is_dampened() {
        let mut participant = ParsedParticipant::default();
        participant
            .numeric
            .insert(Dimension::Affection, NumericChange::Delta(10));
        participant.confidence = Some(0.0);

        let merged = merge(
            &parsed_with("Alice", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        // weight = 1 - 0.65 = 0.35 → 50 + 3.5 ≈ 54
        assert_eq!(merged.statistics.affection["Alice"], 54);
    }

    #[test]
    fn absent_participant_keeps_previous_value() {
        let merged = merge(
            &ParsedExtraction::default(),
            &previous_with_affection("Alice", 72),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.affection["Alice"], 72);
    }

    #[test]
    fn low_signal_mood_change_is_rejected() {
        let mut participant = ParsedParticipant::default();
        participant.mood = Some(Mood::Sad);
        participant.confidence = Some(0.2);

        let merged = merge(
            &parsed_with("Alice", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        // stickiness 0.6 → threshold 0.4; 0.2 is too weak.
        assert_eq!(merged.statistics.mood["Alice"], Mood::Happy);
    }

    #[test]
    fn strong_signal_mood_change_is_adopted() {
        let mut participant = ParsedParticipant::default();
        participant.mood = Some(Mood::Sad);
        participant.confidence = Some(0.9);

        let merged = merge(
            &parsed_with("Alice", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.mood["Alice"], Mood::Sad);
    }

    #[test]
    fn first_mood_adopts_without_stickiness() {
        let mut participant = ParsedParticipant::default();
        participant.mood = Some(Mood::Curious);
        participant.confidence = Some(0.1);

        let merged = merge(
            &parsed_with("Bob", participant),
            &TrackerSnapshot::empty(vec![]),
            &["Bob".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.mood["Bob"], Mood::Curious);
    }

    #[test]
    fn backfill_covers_every_enabled_dimension() {
        let merged = merge(
            &ParsedExtraction::default(),
            &TrackerSnapshot::empty(vec![]),
            &["Carol".to_string()],
            &TrackerConfig::default(),
        );
        for dimension in Dimension::ALL {
            assert!(
                merged.statistics.numeric(dimension).contains_key("Carol"),
                "missing backfill for {dimension}"
            );
        }
        assert!(merged.statistics.mood.contains_key("Carol"));
        assert!(merged.statistics.last_thought.contains_key("Carol"));
    }

    #[test]
    fn inactive_participants_are_untouched() {
        let mut previous = previous_with_affection("Alice", 64);
        previous.statistics.affection.insert("Bob".into(), 12);

        let mut participant = ParsedParticipant::default();
        participant
            .numeric
            .insert(Dimension::Affection, NumericChange::Delta(15));

        let merged = merge(
            &parsed_with("Alice", participant),
            &previous,
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.affection["Bob"], 12);
        assert!(!merged.active_participants.contains(&"Bob".to_string()));
    }

    #[test]
    fn set_change_pulls_toward_target_under_confidence() {
        let mut participant = ParsedParticipant::default();
        participant
            .numeric
            .insert(Dimension::Affection, NumericChange::Set(100));
        participant.confidence = Some(0.0);

        let merged = merge(
            &parsed_with("Alice", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        // weight 0.35: 50 + (100-50)*0.35 = 67.5 → 68
        assert_eq!(merged.statistics.affection["Alice"], 68);
    }

    #[test]
    fn thought_overwrites_when_present_and_retains_otherwise() {
        let mut participant = ParsedParticipant::default();
        participant.last_thought = Some("a new thought".into());
        let merged = merge(
            &parsed_with("Alice", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.last_thought["Alice"], "a new thought");

        let merged = merge(
            &ParsedExtraction::default(),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.last_thought["Alice"], "earlier thought");
    }

    #[test]
    fn custom_numeric_respects_declared_bounds() {
        let mut config = TrackerConfig::default();
        let mut def = crate::custom::CustomStatDef::numeric("tension");
        def.min = 0;
        def.max = 10;
        def.default_numeric = 5;
        config.custom_stats.push(def);

        let mut participant = ParsedParticipant::default();
        participant
            .custom_numeric
            .insert("tension".into(), NumericChange::Delta(15));

        let merged = merge(
            &parsed_with("Alice", participant),
            &TrackerSnapshot::empty(vec![]),
            &["Alice".to_string()],
            &config,
        );
        assert_eq!(merged.custom_numeric["tension"]["Alice"], 10);
    }

    #[test]
    fn non_numeric_customs_backfill_kind_defaults() {
        let mut config = TrackerConfig::default();
        let mut flag = crate::custom::CustomStatDef::numeric("secret_known");
        flag.kind = CustomStatKind::Boolean;
        config.custom_stats.push(flag);
        let mut standing = crate::custom::CustomStatDef::numeric("standing");
        standing.kind = CustomStatKind::EnumSingle;
        standing.options = vec!["Stranger".into(), "Friend".into()];
        config.custom_stats.push(standing);

        let merged = merge(
            &ParsedExtraction::default(),
            &TrackerSnapshot::empty(vec![]),
            &["Alice".to_string()],
            &config,
        );
        assert_eq!(
            merged.custom_other["secret_known"]["Alice"],
            CustomValue::Bool(false)
        );
        assert_eq!(
            merged.custom_other["standing"]["Alice"],
            CustomValue::Enum("Stranger".into())
        );
    }

    #[test]
    fn parsed_name_matching_is_case_and_space_insensitive() {
        let mut participant = ParsedParticipant::default();
        participant
            .numeric
            .insert(Dimension::Affection, NumericChange::Delta(5));

        let merged = merge(
            &parsed_with("alice ", participant),
            &previous_with_affection("Alice", 50),
            &["Alice".to_string()],
            &TrackerConfig::default(),
        );
        assert_eq!(merged.statistics.affection["Alice"], 55);
        // The original spelling stays the map key.
        assert!(!merged.statistics.affection.contains_key("alice "));
    }
}
