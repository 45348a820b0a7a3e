//! Property-Based Tests for the Merge Engine
//!
//! Uses `proptest` to verify merge invariants under random inputs: whatever
//! the oracle reported and whatever state came before, merged values stay
//! bounded, confidence discounts monotonically, and a no-op merge is exact.

use proptest::prelude::*;

use rapport_core::config::TrackerConfig;
use rapport_core::merge::{merge, NumericChange, ParsedExtraction, ParsedParticipant};
use rapport_core::mood::Mood;
use rapport_core::types::{Dimension, TrackerSnapshot};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn previous_snapshot(affection: u8) -> TrackerSnapshot {
    let mut snapshot = TrackerSnapshot::empty(vec!["Alice".to_string()]);
    for dimension in Dimension::ALL {
        snapshot
            .statistics
            .numeric_mut(dimension)
            .insert("Alice".into(), affection);
    }
    snapshot.statistics.mood.insert("Alice".into(), Mood::Happy);
    snapshot
        .statistics
        .last_thought
        .insert("Alice".into(), "thinking".into());
    snapshot
}

fn parsed_delta(delta: i64, confidence: Option<f32>) -> ParsedExtraction {
    let mut participant = ParsedParticipant::default();
    for dimension in Dimension::ALL {
        participant
            .numeric
            .insert(dimension, NumericChange::Delta(delta));
    }
    participant.confidence = confidence;
    let mut parsed = ParsedExtraction::default();
    parsed.participants.insert("Alice".into(), participant);
    parsed
}

fn active() -> Vec<String> {
    vec!["Alice".to_string()]
}

// ---------------------------------------------------------------------------
// Property: merged numeric values are always in [0, 100]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn merged_values_always_clamped(
        previous in 0u8..=100,
        delta in -30i64..=30,
        confidence in 0.0f32..=1.0,
    ) {
        let merged = merge(
            &parsed_delta(delta, Some(confidence)),
            &previous_snapshot(previous),
            &active(),
            &TrackerConfig::default(),
        );
        for dimension in Dimension::ALL {
            let value = merged.statistics.numeric(dimension)["Alice"];
            prop_assert!(value <= 100);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: lower confidence never moves the value further from previous
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn confidence_discount_is_monotone(
        previous in 0u8..=100,
        delta in -15i64..=15,
        high in 0.0f32..=1.0,
        low in 0.0f32..=1.0,
    ) {
        prop_assume!(high >= low);
        let config = TrackerConfig::default();
        let snapshot = previous_snapshot(previous);

        let with_high = merge(&parsed_delta(delta, Some(high)), &snapshot, &active(), &config);
        let with_low = merge(&parsed_delta(delta, Some(low)), &snapshot, &active(), &config);

        let prev = i64::from(previous);
        let moved_high =
            (i64::from(with_high.statistics.affection["Alice"]) - prev).abs();
        let moved_low =
            (i64::from(with_low.statistics.affection["Alice"]) - prev).abs();
        prop_assert!(moved_low <= moved_high);
    }
}

// ---------------------------------------------------------------------------
// Property: zero deltas at full confidence reproduce the previous snapshot
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn zero_delta_full_confidence_is_identity(previous in 0u8..=100) {
        let merged = merge(
            &parsed_delta(0, Some(1.0)),
            &previous_snapshot(previous),
            &active(),
            &TrackerConfig::default(),
        );
        for dimension in Dimension::ALL {
            prop_assert_eq!(merged.statistics.numeric(dimension)["Alice"], previous);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: every active participant ends fully defined
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn backfill_leaves_no_gaps(name in "[A-Z][a-z]{2,8}") {
        let merged = merge(
            &ParsedExtraction::default(),
            &TrackerSnapshot::empty(vec![]),
            &[name.clone()],
            &TrackerConfig::default(),
        );
        for dimension in Dimension::ALL {
            prop_assert!(merged.statistics.numeric(dimension).contains_key(&name));
        }
        prop_assert!(merged.statistics.mood.contains_key(&name));
        prop_assert!(merged.statistics.last_thought.contains_key(&name));
    }
}

// ---------------------------------------------------------------------------
// Property: dampening never amplifies a delta
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn dampened_delta_never_overshoots(
        previous in 0u8..=100,
        delta in -15i64..=15,
        confidence in 0.0f32..=1.0,
    ) {
        let merged = merge(
            &parsed_delta(delta, Some(confidence)),
            &previous_snapshot(previous),
            &active(),
            &TrackerConfig::default(),
        );
        let prev = i64::from(previous);
        let moved = (i64::from(merged.statistics.affection["Alice"]) - prev).abs();
        // Rounding can add at most half a point on top of the raw delta.
        prop_assert!(moved <= delta.abs() + 1);
    }
}
