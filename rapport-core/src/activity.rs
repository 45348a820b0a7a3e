//! Activity resolution — who is on stage this turn, and why.
//!
//! Pure function of conversation history and configuration. Every decision
//! records a human-readable reason per participant; the reasons are part of
//! the contract, not incidental logging, because hosts surface them when a
//! participant unexpectedly drops off or sticks around.

use std::collections::BTreeMap;

use crate::chat::{ChatMessage, MessageFilter, MessageRole};
use crate::config::{ActivityConfig, DepartureLexicon};
use crate::types::{canonical_name, dedup_names, name_key, ActivityAnalysis};

/// The participant roster for the current scene.
#[derive(Debug, Clone)]
pub enum SceneRoster {
    /// One-on-one scene. When `name` is `None`, the most recent trackable
    /// speaker in history is used as the counterpart of last resort.
    Solo {
        /// The visible counterpart, if the host knows it.
        name: Option<String>,
    },
    /// Group scene with an explicit member list.
    Group {
        /// Current group members.
        members: Vec<String>,
        /// Members excluded from tracking.
        disabled: Vec<String>,
    },
}

/// A departure cue found in a user message.
#[derive(Debug, Clone, Copy)]
struct DepartureCue {
    /// Absolute index of the cueing message in the history slice.
    message_index: usize,
}

/// Decide which participants are active for this turn.
///
/// Deterministic given identical history and config; performs no I/O.
#[must_use]
pub fn resolve(
    history: &[ChatMessage],
    roster: &SceneRoster,
    config: &ActivityConfig,
    filter: &dyn MessageFilter,
) -> ActivityAnalysis {
    let lookback = config.lookback.max(1);

    // Trackable turns, oldest first: (absolute index, speaker).
    let trackable: Vec<(usize, String)> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| filter.is_trackable(m))
        .filter_map(|(i, m)| m.speaker().map(|s| (i, canonical_name(s))))
        .collect();

    // --- 1. Participant universe ---
    let all_participants = participant_universe(roster, &trackable);

    let mut reasons: BTreeMap<String, String> = BTreeMap::new();
    let mut active: Vec<String> = Vec::new();

    // --- 2. Auto-detect disabled: everyone is active ---
    if !config.auto_detect_active {
        for name in &all_participants {
            reasons.insert(name.clone(), "auto-detect disabled; always active".into());
        }
        return ActivityAnalysis {
            active_participants: all_participants.clone(),
            all_participants,
            reasons,
            lookback_window: lookback,
        };
    }

    // --- 3. Recency window ---
    let recent: Vec<&(usize, String)> = trackable.iter().rev().take(lookback).collect();
    for name in &all_participants {
        let key = name_key(name);
        if recent.iter().any(|(_, s)| name_key(s) == key) {
            reasons.insert(name.clone(), format!("spoke in last {lookback} messages"));
            active.push(name.clone());
        }
    }

    // --- 4. Persistence window (anti-flicker) ---
    let persistence_window = (lookback * 3).max(12);
    let wider: Vec<&(usize, String)> = trackable.iter().rev().take(persistence_window).collect();
    for name in &all_participants {
        if active.iter().any(|a| name_key(a) == name_key(name)) {
            continue;
        }
        let key = name_key(name);
        if let Some(position) = wider.iter().position(|(_, s)| name_key(s) == key) {
            let ago = position + 1;
            reasons.insert(
                name.clone(),
                format!("last spoke {ago} messages ago (within persistence window)"),
            );
            active.push(name.clone());
        }
    }

    // --- 5. Departure-cue override ---
    let cue_window = (lookback * 3).max(6);
    for name in &all_participants {
        let Some(cue) = latest_departure_cue(history, name, &config.departure, cue_window) else {
            continue;
        };
        if spoke_after(&trackable, name, cue.message_index) {
            continue;
        }
        let before = active.len();
        active.retain(|a| name_key(a) != name_key(name));
        if active.len() != before || !reasons.contains_key(name) {
            reasons.insert(
                name.clone(),
                format!("departed (cue at message #{})", cue.message_index),
            );
        }
    }

    // --- 6. Fallback when nothing is active ---
    if active.is_empty() {
        tracing::debug!("activity: no active participants; applying visibility fallback");
        for name in &all_participants {
            let visible = match latest_departure_cue(history, name, &config.departure, cue_window) {
                Some(cue) => spoke_after(&trackable, name, cue.message_index),
                None => true,
            };
            if visible {
                reasons.insert(name.clone(), "fallback: visible in scene".into());
                active.push(name.clone());
            }
        }
    }
    if active.is_empty() {
        for name in &all_participants {
            reasons.insert(name.clone(), "fallback: tracking all participants".into());
        }
        active = all_participants.clone();
    }

    // Silent participants outside every window still get a reason.
    for name in &all_participants {
        reasons
            .entry(name.clone())
            .or_insert_with(|| "inactive: not seen in any window".into());
    }

    ActivityAnalysis {
        active_participants: active,
        all_participants,
        reasons,
        lookback_window: lookback,
    }
}

/// Build the participant universe for the scene.
fn participant_universe(roster: &SceneRoster, trackable: &[(usize, String)]) -> Vec<String> {
    match roster {
        SceneRoster::Solo { name } => {
            if let Some(name) = name {
                dedup_names([name.as_str()])
            } else {
                // Last resort: the most recent trackable speaker.
                trackable
                    .last()
                    .map(|(_, s)| vec![s.clone()])
                    .unwrap_or_default()
            }
        }
        SceneRoster::Group { members, disabled } => {
            let mut names: Vec<&str> = members.iter().map(String::as_str).collect();
            names.extend(trackable.iter().map(|(_, s)| s.as_str()));
            let universe = dedup_names(names);
            let disabled_keys: Vec<String> = disabled.iter().map(|d| name_key(d)).collect();
            universe
                .into_iter()
                .filter(|n| !disabled_keys.contains(&name_key(n)))
                .collect()
        }
    }
}

/// Find the most recent departure cue for `name` within the last
/// `window` user-authored messages.
fn latest_departure_cue(
    history: &[ChatMessage],
    name: &str,
    lexicon: &DepartureLexicon,
    window: usize,
) -> Option<DepartureCue> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    history
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, m)| m.role == MessageRole::User)
        .take(window)
        .find(|(_, m)| {
            let text = m.content.to_lowercase();
            text.contains(&needle)
                && lexicon.verbs.iter().any(|v| text.contains(&v.to_lowercase()))
                && lexicon.places.iter().any(|p| text.contains(&p.to_lowercase()))
        })
        .map(|(i, _)| DepartureCue { message_index: i })
}

/// Whether `name` has a trackable turn after the given absolute index.
fn spoke_after(trackable: &[(usize, String)], name: &str, after: usize) -> bool {
    let key = name_key(name);
    trackable
        .iter()
        .any(|(i, s)| *i > after && name_key(s) == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::DefaultMessageFilter;

    fn group(members: &[&str]) -> SceneRoster {
        SceneRoster::Group {
            members: members.iter().map(|s| (*s).to_string()).collect(),
            disabled: Vec::new(),
        }
    }

    fn config() -> ActivityConfig {
        ActivityConfig::default()
    }

    #[test]
    fn recent_speakers_are_active() {
        let history = vec![
            ChatMessage::user("hi everyone"),
            ChatMessage::assistant("Alice", "Hello!"),
            ChatMessage::assistant("Bob", "Hey."),
        ];
        let analysis = resolve(&history, &group(&["Alice", "Bob"]), &config(), &DefaultMessageFilter);
        assert_eq!(analysis.active_participants.len(), 2);
        assert!(analysis.reasons["Alice"].contains("spoke in last"));
    }

    #[test]
    fn universe_unions_history_speakers_into_roster() {
        let history = vec![ChatMessage::assistant("Carol", "I was here all along.")];
        let analysis = resolve(&history, &group(&["Alice"]), &config(), &DefaultMessageFilter);
        assert!(analysis.all_participants.contains(&"Carol".to_string()));
    }

    #[test]
    fn disabled_members_are_excluded() {
        let roster = SceneRoster::Group {
            members: vec!["Alice".into(), "Bob".into()],
            disabled: vec!["bob".into()],
        };
        let history = vec![ChatMessage::assistant("Bob", "Ignore me.")];
        let analysis = resolve(&history, &roster, &config(), &DefaultMessageFilter);
        assert!(!analysis.all_participants.contains(&"Bob".to_string()));
    }

    #[test]
    fn persistence_window_keeps_briefly_silent_speakers() {
        let mut history = vec![ChatMessage::assistant("Alice", "I'll be quiet now.")];
        for i in 0..8 {
            history.push(ChatMessage::assistant("Bob", format!("line {i}")));
        }
        let analysis = resolve(&history, &group(&["Alice", "Bob"]), &config(), &DefaultMessageFilter);
        // Alice is outside the 5-message recency window but inside the
        // persistence window, so she must not flicker off.
        assert!(analysis.active_participants.contains(&"Alice".to_string()));
        assert!(analysis.reasons["Alice"].contains("persistence window"));
    }

    #[test]
    fn departure_cue_deactivates_until_next_line() {
        let history = vec![
            ChatMessage::assistant("Alice", "I'm tired."),
            ChatMessage::user("Alice walked into her room."),
            ChatMessage::assistant("Bob", "Guess it's just us."),
        ];
        let analysis = resolve(&history, &group(&["Alice", "Bob"]), &config(), &DefaultMessageFilter);
        assert!(!analysis.active_participants.contains(&"Alice".to_string()));
        assert!(analysis.reasons["Alice"].contains("cue at message #1"));

        // A later Alice line supersedes the cue.
        let mut extended = history;
        extended.push(ChatMessage::assistant("Alice", "Actually, I'm back."));
        let analysis = resolve(&extended, &group(&["Alice", "Bob"]), &config(), &DefaultMessageFilter);
        assert!(analysis.active_participants.contains(&"Alice".to_string()));
    }

    #[test]
    fn fallback_activates_visible_participants() {
        // Nobody has spoken a trackable line, but only Bob has departed.
        let history = vec![
            ChatMessage::user("Bob left the room in a huff."),
            ChatMessage::user("It's quiet in here."),
        ];
        let analysis = resolve(&history, &group(&["Alice", "Bob"]), &config(), &DefaultMessageFilter);
        assert_eq!(analysis.active_participants, vec!["Alice".to_string()]);
        assert!(analysis.reasons["Alice"].contains("fallback"));
    }

    #[test]
    fn fallback_to_all_when_everyone_departed() {
        let history = vec![
            ChatMessage::user("Alice left the room."),
            ChatMessage::user("Bob left the room too."),
        ];
        let analysis = resolve(&history, &group(&["Alice", "Bob"]), &config(), &DefaultMessageFilter);
        assert_eq!(analysis.active_participants.len(), 2);
    }

    #[test]
    fn solo_scene_tracks_exactly_one_name() {
        let roster = SceneRoster::Solo {
            name: Some("Alice".into()),
        };
        let history = vec![ChatMessage::assistant("Alice", "Just me.")];
        let analysis = resolve(&history, &roster, &config(), &DefaultMessageFilter);
        assert_eq!(analysis.all_participants, vec!["Alice".to_string()]);
    }

    #[test]
    fn solo_scene_falls_back_to_last_speaker() {
        let roster = SceneRoster::Solo { name: None };
        let history = vec![
            ChatMessage::assistant("Mystery", "Who am I?"),
            ChatMessage::user("hello?"),
        ];
        let analysis = resolve(&history, &roster, &config(), &DefaultMessageFilter);
        assert_eq!(analysis.all_participants, vec!["Mystery".to_string()]);
    }

    #[test]
    fn auto_detect_disabled_activates_everyone() {
        let mut cfg = config();
        cfg.auto_detect_active = false;
        let history = vec![ChatMessage::user("quiet day")];
        let analysis = resolve(&history, &group(&["Alice", "Bob"]), &cfg, &DefaultMessageFilter);
        assert_eq!(analysis.active_participants.len(), 2);
        assert!(analysis.reasons["Alice"].contains("auto-detect disabled"));
    }
}
