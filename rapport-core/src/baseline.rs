//! Baseline synthesis — a first snapshot when no previous state exists.
//!
//! The very first extraction run needs a "previous" snapshot to merge into.
//! Configured per-participant overrides win; otherwise a lexical scan of
//! recent messages over affect-laden keyword families biases the defaults
//! away from a flat midpoint, and the dominant family picks the mood.

use crate::chat::ChatMessage;
use crate::config::TrackerConfig;
use crate::mood::Mood;
use crate::types::{clamp_stat, name_key, Dimension, TrackerSnapshot};

/// Affect-laden keyword families used by the lexical scan.
#[derive(Debug, Clone)]
pub struct KeywordFamilies {
    /// Warm, friendly, approving words.
    pub positive: Vec<String>,
    /// Hostile, cold, fearful words.
    pub negative: Vec<String>,
    /// Romance and attraction words.
    pub romantic: Vec<String>,
}

impl Default for KeywordFamilies {
    fn default() -> Self {
        let positive = [
            "smile", "laugh", "thank", "warm", "happy", "kind", "gentle", "friend",
            "help", "trust", "hug", "comfort", "relieved", "glad",
        ];
        let negative = [
            "angry", "glare", "shout", "cold", "afraid", "cry", "hate", "hurt",
            "betray", "scowl", "threat", "fear", "annoyed", "suspicious",
        ];
        let romantic = [
            "kiss", "blush", "love", "flirt", "caress", "darling", "sweetheart",
            "longing", "tender", "embrace", "desire", "heart races",
        ];
        Self {
            positive: positive.iter().map(|s| (*s).to_string()).collect(),
            negative: negative.iter().map(|s| (*s).to_string()).collect(),
            romantic: romantic.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Per-family hit counts for one participant.
#[derive(Debug, Clone, Copy, Default)]
struct FamilyCounts {
    positive: i64,
    negative: i64,
    romantic: i64,
}

/// Synthesize a baseline snapshot for the given participants.
///
/// The scan covers the configured context window of recent messages; a
/// message counts toward a participant if it was spoken by them or mentions
/// their name.
#[must_use]
pub fn synthesize(
    participants: &[String],
    history: &[ChatMessage],
    config: &TrackerConfig,
    families: &KeywordFamilies,
) -> TrackerSnapshot {
    let window = config.extraction.context_messages.max(1);
    let recent: Vec<&ChatMessage> = history.iter().rev().take(window).collect();

    let mut snapshot = TrackerSnapshot::empty(participants.to_vec());

    for name in participants {
        let overridden = config
            .defaults
            .per_participant
            .keys()
            .any(|n| name_key(n) == name_key(name));

        let counts = if overridden {
            FamilyCounts::default()
        } else {
            count_families(name, &recent, families)
        };

        for dimension in Dimension::ALL {
            if !config.dimensions.numeric_enabled(dimension) {
                continue;
            }
            let base = i64::from(config.defaults.numeric_for(name, dimension));
            let biased = if overridden {
                base
            } else {
                base + bias_for(dimension, counts)
            };
            snapshot
                .statistics
                .numeric_mut(dimension)
                .insert(name.clone(), clamp_stat(biased));
        }

        if config.dimensions.mood {
            let mood = if overridden {
                config.defaults.mood_for(name)
            } else {
                dominant_mood(counts, config.defaults.mood_for(name))
            };
            snapshot.statistics.mood.insert(name.clone(), mood);
        }

        if config.dimensions.last_thought {
            snapshot
                .statistics
                .last_thought
                .insert(name.clone(), String::new());
        }

        for def in &config.custom_stats {
            if def.kind == crate::custom::CustomStatKind::Numeric {
                snapshot
                    .custom_numeric
                    .entry(def.id.clone())
                    .or_default()
                    .insert(name.clone(), def.clamp(def.default_numeric));
            }
        }
    }

    snapshot
}

/// Count keyword-family hits for one participant over the recent window.
fn count_families(
    name: &str,
    recent: &[&ChatMessage],
    families: &KeywordFamilies,
) -> FamilyCounts {
    let needle = name.trim().to_lowercase();
    let mut counts = FamilyCounts::default();

    for message in recent {
        let text = message.content.to_lowercase();
        let spoken_by = message
            .speaker()
            .is_some_and(|s| name_key(s) == name_key(name));
        if !spoken_by && !text.contains(&needle) {
            continue;
        }
        counts.positive += hits(&text, &families.positive);
        counts.negative += hits(&text, &families.negative);
        counts.romantic += hits(&text, &families.romantic);
    }

    counts
}

fn hits(text: &str, words: &[String]) -> i64 {
    words
        .iter()
        .filter(|w| text.contains(w.to_lowercase().as_str()))
        .count() as i64
}

/// Bias one dimension's default by the observed keyword counts.
fn bias_for(dimension: Dimension, counts: FamilyCounts) -> i64 {
    let swing = counts.positive - counts.negative;
    match dimension {
        Dimension::Affection => swing * 3 + counts.romantic * 2,
        Dimension::Trust => swing * 2,
        Dimension::Desire => counts.romantic * 4,
        Dimension::Connection => swing * 2 + counts.romantic,
    }
}

/// Pick the baseline mood from the dominant keyword family.
fn dominant_mood(counts: FamilyCounts, fallback: Mood) -> Mood {
    let top = counts.positive.max(counts.negative).max(counts.romantic);
    if top == 0 {
        return fallback;
    }
    if counts.romantic == top {
        Mood::Loving
    } else if counts.positive == top {
        Mood::Happy
    } else {
        Mood::Sad
    }
}
