//! Structured debug trace of one extraction run.
//!
//! Write-only diagnostic artifact: nothing in merge logic reads it. Hosts
//! surface it in an inspector panel when users ask "why did trust jump?".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rapport_core::merge::ParsedExtraction;

/// Why an extraction run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTrigger {
    /// A new character turn arrived.
    NewMessage,
    /// The user regenerated/swiped a turn.
    Swipe,
    /// The user edited history.
    Edit,
    /// The user asked for a refresh.
    Manual,
}

impl ExtractionTrigger {
    /// Short label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionTrigger::NewMessage => "new_message",
            ExtractionTrigger::Swipe => "swipe",
            ExtractionTrigger::Edit => "edit",
            ExtractionTrigger::Manual => "manual",
        }
    }
}

/// Metadata for one oracle call (one ladder rung of one unit of work).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTrace {
    /// Which unit of work this call served.
    pub label: String,
    /// 1-based attempt number within the unit's repair ladder.
    pub attempt: u32,
    /// Which repair strategy shaped the prompt.
    pub strategy: String,
    /// Prompt size in characters.
    pub prompt_chars: usize,
    /// Token ceiling the call ran under.
    pub max_tokens: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Raw oracle text, when the call returned any.
    pub raw_text: Option<String>,
    /// Normalized error message, when the call failed.
    pub error: Option<String>,
    /// How many participants the parse recovered.
    pub parsed_participants: usize,
}

/// Full trace of one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugRecord {
    /// The run this record belongs to.
    pub run_id: u64,
    /// What started the run.
    pub trigger: ExtractionTrigger,
    /// Message index the run targeted, when tied to one.
    pub target_message_index: Option<usize>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Every oracle call made, in completion order.
    pub calls: Vec<CallTrace>,
    /// The aggregated parse result the merge consumed.
    pub parsed: ParsedExtraction,
    /// Whether the run was discarded as stale.
    pub stale: bool,
}

impl DebugRecord {
    /// Start a record for a new run.
    #[must_use]
    pub fn begin(run_id: u64, trigger: ExtractionTrigger, target_message_index: Option<usize>) -> Self {
        Self {
            run_id,
            trigger,
            target_message_index,
            started_at: Utc::now(),
            calls: Vec::new(),
            parsed: ParsedExtraction::default(),
            stale: false,
        }
    }

    /// Total oracle calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Calls that ended in an error.
    #[must_use]
    pub fn failed_calls(&self) -> usize {
        self.calls.iter().filter(|c| c.error.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_failures() {
        let mut record = DebugRecord::begin(1, ExtractionTrigger::NewMessage, Some(4));
        record.calls.push(CallTrace {
            label: "unified".into(),
            attempt: 1,
            strategy: "base".into(),
            prompt_chars: 1200,
            max_tokens: 400,
            duration_ms: 350,
            raw_text: Some("{}".into()),
            error: None,
            parsed_participants: 0,
        });
        record.calls.push(CallTrace {
            label: "unified".into(),
            attempt: 2,
            strategy: "strict-json".into(),
            prompt_chars: 1300,
            max_tokens: 400,
            duration_ms: 50,
            raw_text: None,
            error: Some("connection refused".into()),
            parsed_participants: 0,
        });
        assert_eq!(record.call_count(), 2);
        assert_eq!(record.failed_calls(), 1);
    }
}
