//! Mood vocabulary and coercion.
//!
//! Mood is a closed vocabulary: whatever the oracle emits, coercion always
//! lands on one of the fifteen labels below. The synonym table is data, not
//! code, so hosts can extend it without touching the matcher.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed mood vocabulary — fifteen labels, `Neutral` included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mood {
    /// No dominant feeling.
    Neutral,
    /// Generally positive, upbeat.
    Happy,
    /// Quiet satisfaction.
    Content,
    /// High-energy positive.
    Excited,
    /// Teasing, mischievous.
    Playful,
    /// Warm attachment.
    Loving,
    /// Head-over-heels romantic absorption.
    #[serde(rename = "In Love")]
    InLove,
    /// Wants to know more.
    Curious,
    /// Self-conscious, flustered.
    Embarrassed,
    /// Worried, on edge.
    Anxious,
    /// Low, unhappy.
    Sad,
    /// Hostile, heated.
    Angry,
    /// Blocked or irritated.
    Frustrated,
    /// Possessive resentment of a rival.
    Jealous,
    /// Fearful.
    Afraid,
}

impl Mood {
    /// Every label in the vocabulary.
    pub const ALL: [Mood; 15] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Content,
        Mood::Excited,
        Mood::Playful,
        Mood::Loving,
        Mood::InLove,
        Mood::Curious,
        Mood::Embarrassed,
        Mood::Anxious,
        Mood::Sad,
        Mood::Angry,
        Mood::Frustrated,
        Mood::Jealous,
        Mood::Afraid,
    ];

    /// Display label as shown to hosts and requested from the oracle.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Mood::Neutral => "Neutral",
            Mood::Happy => "Happy",
            Mood::Content => "Content",
            Mood::Excited => "Excited",
            Mood::Playful => "Playful",
            Mood::Loving => "Loving",
            Mood::InLove => "In Love",
            Mood::Curious => "Curious",
            Mood::Embarrassed => "Embarrassed",
            Mood::Anxious => "Anxious",
            Mood::Sad => "Sad",
            Mood::Angry => "Angry",
            Mood::Frustrated => "Frustrated",
            Mood::Jealous => "Jealous",
            Mood::Afraid => "Afraid",
        }
    }

    /// Comma-separated label list, for embedding in oracle protocols.
    #[must_use]
    pub fn vocabulary_line() -> String {
        Mood::ALL
            .iter()
            .map(|m| m.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Mood {
    fn default() -> Self {
        Mood::Neutral
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Curated synonym table mapping free-form mood words onto the vocabulary.
///
/// Checked after exact matching fails, before substring matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodLexicon {
    /// `(synonym, label)` pairs; synonyms are matched case-insensitively.
    pub synonyms: Vec<(String, Mood)>,
}

impl Default for MoodLexicon {
    fn default() -> Self {
        let table: &[(&str, Mood)] = &[
            ("calm", Mood::Content),
            ("peaceful", Mood::Content),
            ("relaxed", Mood::Content),
            ("serene", Mood::Content),
            ("cheerful", Mood::Happy),
            ("joyful", Mood::Happy),
            ("glad", Mood::Happy),
            ("delighted", Mood::Happy),
            ("ecstatic", Mood::Excited),
            ("thrilled", Mood::Excited),
            ("eager", Mood::Excited),
            ("flirty", Mood::Playful),
            ("teasing", Mood::Playful),
            ("mischievous", Mood::Playful),
            ("affectionate", Mood::Loving),
            ("tender", Mood::Loving),
            ("fond", Mood::Loving),
            ("smitten", Mood::InLove),
            ("infatuated", Mood::InLove),
            ("lovestruck", Mood::InLove),
            ("intrigued", Mood::Curious),
            ("inquisitive", Mood::Curious),
            ("shy", Mood::Embarrassed),
            ("flustered", Mood::Embarrassed),
            ("bashful", Mood::Embarrassed),
            ("worried", Mood::Anxious),
            ("nervous", Mood::Anxious),
            ("uneasy", Mood::Anxious),
            ("tense", Mood::Anxious),
            ("exhausted", Mood::Sad),
            ("tired", Mood::Sad),
            ("depressed", Mood::Sad),
            ("melancholy", Mood::Sad),
            ("gloomy", Mood::Sad),
            ("heartbroken", Mood::Sad),
            ("mad", Mood::Angry),
            ("furious", Mood::Angry),
            ("enraged", Mood::Angry),
            ("irritated", Mood::Frustrated),
            ("annoyed", Mood::Frustrated),
            ("exasperated", Mood::Frustrated),
            ("envious", Mood::Jealous),
            ("possessive", Mood::Jealous),
            ("scared", Mood::Afraid),
            ("terrified", Mood::Afraid),
            ("frightened", Mood::Afraid),
        ];
        Self {
            synonyms: table
                .iter()
                .map(|(s, m)| ((*s).to_string(), *m))
                .collect(),
        }
    }
}

/// Coerce a free-form mood string onto the closed vocabulary.
///
/// Total: always returns a valid label. Resolution order is exact label
/// match, synonym table, substring match (labels sorted longest-first so
/// "In Love" wins over shorter overlaps), then `Neutral`.
#[must_use]
pub fn coerce(raw: &str, lexicon: &MoodLexicon) -> Mood {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return Mood::Neutral;
    }

    // --- 1. Exact label match ---
    for mood in Mood::ALL {
        if mood.label().to_lowercase() == needle {
            return mood;
        }
    }

    // --- 2. Synonym table ---
    for (synonym, mood) in &lexicon.synonyms {
        if synonym.to_lowercase() == needle {
            return *mood;
        }
    }

    // --- 3. Substring match, longest label first ---
    let mut by_length: Vec<Mood> = Mood::ALL.to_vec();
    by_length.sort_by_key(|m| std::cmp::Reverse(m.label().len()));
    for mood in by_length {
        let label = mood.label().to_lowercase();
        if needle.contains(&label) || label.contains(&needle) {
            return mood;
        }
    }

    // --- 4. Fallback ---
    Mood::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_has_fifteen_labels() {
        assert_eq!(Mood::ALL.len(), 15);
        assert!(Mood::ALL.contains(&Mood::Neutral));
    }

    #[test]
    fn exact_match_ignores_case_and_whitespace() {
        let lexicon = MoodLexicon::default();
        assert_eq!(coerce("  HAPPY ", &lexicon), Mood::Happy);
        assert_eq!(coerce("in love", &lexicon), Mood::InLove);
    }

    #[test]
    fn synonyms_resolve() {
        let lexicon = MoodLexicon::default();
        assert_eq!(coerce("exhausted", &lexicon), Mood::Sad);
        assert_eq!(coerce("Calm", &lexicon), Mood::Content);
        assert_eq!(coerce("smitten", &lexicon), Mood::InLove);
    }

    #[test]
    fn substring_prefers_longer_labels() {
        let lexicon = MoodLexicon::default();
        // "deeply in love" contains both "In Love" and "Loving"-adjacent text;
        // the longer label must win.
        assert_eq!(coerce("deeply in love", &lexicon), Mood::InLove);
        assert_eq!(coerce("quite happy today", &lexicon), Mood::Happy);
    }

    #[test]
    fn garbage_falls_back_to_neutral() {
        let lexicon = MoodLexicon::default();
        assert_eq!(coerce("", &lexicon), Mood::Neutral);
        assert_eq!(coerce("zzzzqqq", &lexicon), Mood::Neutral);
    }

    #[test]
    fn label_round_trips_through_serde() {
        let json = serde_json::to_string(&Mood::InLove).expect("serialize");
        assert_eq!(json, "\"In Love\"");
        let back: Mood = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Mood::InLove);
    }
}
