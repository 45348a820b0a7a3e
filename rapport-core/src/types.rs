//! Core type definitions for the rapport engine.
//!
//! Participant names are the join key across chat history, defaults, and
//! statistics maps — there is no separate participant ID. Names are trimmed
//! and de-duplicated case-insensitively wherever a set of them is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::custom::CustomValue;
use crate::mood::Mood;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier for a persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    /// Create a new random snapshot ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Participant names
// ---------------------------------------------------------------------------

/// Trim a display name into its canonical form.
#[must_use]
pub fn canonical_name(raw: &str) -> String {
    raw.trim().to_string()
}

/// Case- and whitespace-insensitive key for name matching and dedup.
#[must_use]
pub fn name_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Trim, drop empties, and de-duplicate names case-insensitively,
/// keeping first-seen spelling and order.
#[must_use]
pub fn dedup_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for name in names {
        let canonical = canonical_name(name.as_ref());
        if canonical.is_empty() {
            continue;
        }
        if seen.insert(name_key(&canonical)) {
            out.push(canonical);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tracked dimensions
// ---------------------------------------------------------------------------

/// The built-in numeric relationship dimensions, each an integer in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Warmth toward the counterpart.
    Affection,
    /// Belief in the counterpart's reliability.
    Trust,
    /// Romantic or physical attraction.
    Desire,
    /// Felt closeness and understanding.
    Connection,
}

impl Dimension {
    /// Every numeric dimension.
    pub const ALL: [Dimension; 4] = [
        Dimension::Affection,
        Dimension::Trust,
        Dimension::Desire,
        Dimension::Connection,
    ];

    /// Lower-case field name used in oracle payloads and config keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Affection => "affection",
            Dimension::Trust => "trust",
            Dimension::Desire => "desire",
            Dimension::Connection => "connection",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp an arbitrary integer onto the [0, 100] stat scale.
#[must_use]
pub fn clamp_stat(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

// ---------------------------------------------------------------------------
// Statistics snapshot
// ---------------------------------------------------------------------------

/// One map per tracked dimension, each keyed by participant display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Affection values, 0–100.
    #[serde(default)]
    pub affection: BTreeMap<String, u8>,
    /// Trust values, 0–100.
    #[serde(default)]
    pub trust: BTreeMap<String, u8>,
    /// Desire values, 0–100.
    #[serde(default)]
    pub desire: BTreeMap<String, u8>,
    /// Connection values, 0–100.
    #[serde(default)]
    pub connection: BTreeMap<String, u8>,
    /// Current mood label per participant.
    #[serde(default)]
    pub mood: BTreeMap<String, Mood>,
    /// Free-text "last thought" per participant.
    #[serde(default)]
    pub last_thought: BTreeMap<String, String>,
}

impl StatisticsSnapshot {
    /// Borrow the map for one numeric dimension.
    #[must_use]
    pub fn numeric(&self, dimension: Dimension) -> &BTreeMap<String, u8> {
        match dimension {
            Dimension::Affection => &self.affection,
            Dimension::Trust => &self.trust,
            Dimension::Desire => &self.desire,
            Dimension::Connection => &self.connection,
        }
    }

    /// Mutably borrow the map for one numeric dimension.
    pub fn numeric_mut(&mut self, dimension: Dimension) -> &mut BTreeMap<String, u8> {
        match dimension {
            Dimension::Affection => &mut self.affection,
            Dimension::Trust => &mut self.trust,
            Dimension::Desire => &mut self.desire,
            Dimension::Connection => &mut self.connection,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker snapshot
// ---------------------------------------------------------------------------

/// Immutable per-turn state record. A new snapshot is always built by the
/// merge engine; existing snapshots are never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Snapshot identity, for storage and debug correlation.
    pub id: SnapshotId,
    /// Wall-clock time the snapshot was produced.
    pub timestamp: DateTime<Utc>,
    /// Participants that were active for the turn this snapshot records.
    pub active_participants: Vec<String>,
    /// Built-in dimension maps.
    pub statistics: StatisticsSnapshot,
    /// Custom numeric stats: stat id → participant name → value.
    #[serde(default)]
    pub custom_numeric: BTreeMap<String, BTreeMap<String, i64>>,
    /// Custom non-numeric stats: stat id → participant name → value.
    #[serde(default)]
    pub custom_other: BTreeMap<String, BTreeMap<String, CustomValue>>,
}

impl TrackerSnapshot {
    /// Create an empty snapshot for the given active set.
    #[must_use]
    pub fn empty(active_participants: Vec<String>) -> Self {
        Self {
            id: SnapshotId::new(),
            timestamp: Utc::now(),
            active_participants,
            statistics: StatisticsSnapshot::default(),
            custom_numeric: BTreeMap::new(),
            custom_other: BTreeMap::new(),
        }
    }

    /// Every participant name that appears anywhere in this snapshot.
    #[must_use]
    pub fn known_participants(&self) -> Vec<String> {
        let mut names: Vec<&String> = Vec::new();
        names.extend(self.active_participants.iter());
        for dimension in Dimension::ALL {
            names.extend(self.statistics.numeric(dimension).keys());
        }
        names.extend(self.statistics.mood.keys());
        names.extend(self.statistics.last_thought.keys());
        for per_stat in self.custom_numeric.values() {
            names.extend(per_stat.keys());
        }
        for per_stat in self.custom_other.values() {
            names.extend(per_stat.keys());
        }
        dedup_names(names.into_iter().map(String::as_str))
    }
}

// ---------------------------------------------------------------------------
// Activity analysis
// ---------------------------------------------------------------------------

/// Derived view of who is on stage this turn, and why.
///
/// Recomputed from chat history every run — history may have been edited,
/// swiped, or extended since the last one. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityAnalysis {
    /// Every participant known to the scene.
    pub all_participants: Vec<String>,
    /// The subset eligible for state updates this turn.
    pub active_participants: Vec<String>,
    /// Human-readable decision per participant name.
    pub reasons: BTreeMap<String, String>,
    /// The recency window (message count) that was applied.
    pub lookback_window: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_is_case_insensitive_and_keeps_first_spelling() {
        let names = dedup_names(["Alice", " alice ", "BOB", "bob", "", "  "]);
        assert_eq!(names, vec!["Alice".to_string(), "BOB".to_string()]);
    }

    #[test]
    fn name_key_ignores_interior_whitespace() {
        assert_eq!(name_key("Mary Ann"), name_key("maryann"));
        assert_ne!(name_key("Mary"), name_key("MaryAnn"));
    }

    #[test]
    fn clamp_stat_bounds() {
        assert_eq!(clamp_stat(-5), 0);
        assert_eq!(clamp_stat(50), 50);
        assert_eq!(clamp_stat(900), 100);
    }

    #[test]
    fn known_participants_unions_all_maps() {
        let mut snapshot = TrackerSnapshot::empty(vec!["Alice".into()]);
        snapshot.statistics.trust.insert("Bob".into(), 40);
        snapshot
            .custom_numeric
            .entry("suspicion".into())
            .or_default()
            .insert("Carol".into(), 10);

        let known = snapshot.known_participants();
        assert_eq!(known.len(), 3);
        assert!(known.contains(&"Carol".to_string()));
    }

    #[test]
    fn snapshot_serde_round_trip() {
        let mut snapshot = TrackerSnapshot::empty(vec!["Alice".into()]);
        snapshot.statistics.affection.insert("Alice".into(), 72);
        snapshot.statistics.mood.insert("Alice".into(), Mood::Happy);

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: TrackerSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, snapshot);
    }
}
