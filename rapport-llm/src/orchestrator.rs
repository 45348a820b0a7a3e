//! Extraction orchestration — scheduling, retries, staleness, aggregation.
//!
//! One `run` drives a whole extraction: it plans the oracle calls for the
//! configured mode, fans them out under the concurrency ceiling, walks each
//! unit's repair ladder, discards superseded results, synthesizes a baseline
//! when no previous snapshot exists, and hands the aggregate to the merge
//! engine. Callers own persistence and UI; progress comes back through a
//! callback.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use rapport_core::baseline::{self, KeywordFamilies};
use rapport_core::chat::ChatMessage;
use rapport_core::config::{ExtractionMode, TrackerConfig};
use rapport_core::merge::{self, ParsedExtraction};
use rapport_core::types::{ActivityAnalysis, Dimension, TrackerSnapshot};

use crate::debug::{CallTrace, DebugRecord, ExtractionTrigger};
use crate::error::OracleError;
use crate::oracle::{Oracle, TokenLimits};
use crate::parse::{self, ParseTarget, ParserContext};
use crate::prompt::{self, PromptContext};
use crate::repair::{self, RepairStrategy};
use crate::session::{ExtractionSession, RunHandle};

/// Progress callback: `(completed, total, label)`.
pub type ProgressCallback = dyn Fn(usize, usize, &str) + Send + Sync;

/// Inputs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// What started the run.
    pub trigger: ExtractionTrigger,
    /// Message index the run targets, when tied to one.
    pub target_message_index: Option<usize>,
    /// Rendered recent-conversation text shown to the oracle.
    pub context_text: String,
    /// Who is on stage, per the activity resolver.
    pub analysis: ActivityAnalysis,
    /// Recent raw history, used only for baseline synthesis.
    pub history: Vec<ChatMessage>,
    /// The previous snapshot, if one exists for this conversation.
    pub previous: Option<TrackerSnapshot>,
    /// Recent snapshots (newest first) for trend context.
    pub snapshot_history: Vec<TrackerSnapshot>,
}

/// What a committed run produced.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// The merged snapshot.
    pub snapshot: TrackerSnapshot,
    /// Full diagnostic trace.
    pub debug: DebugRecord,
}

/// One schedulable oracle call chain (a stat, or the unified payload).
#[derive(Debug, Clone)]
enum WorkUnit {
    Unified,
    Dimension(Dimension),
    Mood,
    Thought,
    Custom(usize),
}

/// Shared, owned inputs the fan-out tasks read.
struct SharedInputs {
    config: TrackerConfig,
    active: Vec<String>,
    context_text: String,
    snapshot_history: Vec<TrackerSnapshot>,
}

/// The extraction scheduler.
pub struct ExtractionOrchestrator {
    oracle: Arc<dyn Oracle>,
    config: TrackerConfig,
    limits: TokenLimits,
}

impl ExtractionOrchestrator {
    /// Create an orchestrator over one oracle and configuration.
    #[must_use]
    pub fn new(oracle: Arc<dyn Oracle>, config: TrackerConfig) -> Self {
        Self {
            oracle,
            config: config.normalized(),
            limits: TokenLimits::default(),
        }
    }

    /// Override the resolved token limits used for every call.
    #[must_use]
    pub fn with_token_limits(mut self, limits: TokenLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run one extraction.
    ///
    /// Returns `None` when the run was superseded or cancelled before it
    /// could commit — a normal occurrence, not a fault. All per-call
    /// failures are absorbed: the merge is best-effort over whatever was
    /// parsed successfully, and untouched stats keep their previous values.
    pub async fn run(
        &self,
        session: &ExtractionSession,
        request: ExtractionRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Option<ExtractionOutcome> {
        let handle = session.begin_run();
        let mut record = DebugRecord::begin(
            handle.run_id(),
            request.trigger,
            request.target_message_index,
        );
        debug!(
            run_id = handle.run_id(),
            trigger = request.trigger.as_str(),
            "extraction run started"
        );

        let plan = self.plan_units();
        let total = plan.len();
        let shared = Arc::new(SharedInputs {
            config: self.config.clone(),
            active: request.analysis.active_participants.clone(),
            context_text: request.context_text.clone(),
            snapshot_history: request.snapshot_history.clone(),
        });
        let traces: Arc<Mutex<Vec<CallTrace>>> = Arc::new(Mutex::new(Vec::new()));
        let semaphore = Arc::new(Semaphore::new(
            self.config.extraction.max_concurrent_calls as usize,
        ));

        let mut join_set: JoinSet<ParsedExtraction> = JoinSet::new();
        for unit in plan {
            let oracle = Arc::clone(&self.oracle);
            let shared = Arc::clone(&shared);
            let traces = Arc::clone(&traces);
            let semaphore = Arc::clone(&semaphore);
            let handle = handle.clone();
            let limits = self.limits;
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return ParsedExtraction::default();
                };
                run_unit(&unit, oracle.as_ref(), &shared, &handle, limits, &traces).await
            });
        }

        // All calls for this run complete (or are cancelled) before any
        // merge happens; partial results of an unfinished run never commit.
        let mut aggregate = ParsedExtraction::default();
        let mut done = 0usize;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(parsed) => aggregate.absorb(parsed),
                Err(join_error) => warn!(%join_error, "extraction task panicked"),
            }
            done += 1;
            if handle.is_current() {
                if let Some(progress) = on_progress {
                    progress(done, total, "extraction");
                }
            }
        }
        record.calls = std::mem::take(&mut *traces.lock());
        record.parsed = aggregate.clone();

        if !handle.is_current() {
            // Superseded: drop everything, including pending progress.
            record.stale = true;
            debug!(run_id = handle.run_id(), "stale run discarded");
            return None;
        }

        // --- Baseline: first run for this conversation ---
        let previous = request.previous.unwrap_or_else(|| {
            debug!("no previous snapshot; synthesizing baseline");
            baseline::synthesize(
                &request.analysis.active_participants,
                &request.history,
                &self.config,
                &KeywordFamilies::default(),
            )
        });

        let snapshot = merge::merge(
            &aggregate,
            &previous,
            &request.analysis.active_participants,
            &self.config,
        );
        session.set_last_committed(snapshot.id);
        debug!(
            run_id = handle.run_id(),
            calls = record.call_count(),
            failed = record.failed_calls(),
            "extraction run committed"
        );
        Some(ExtractionOutcome {
            snapshot,
            debug: record,
        })
    }

    /// Plan the units of work for the configured mode.
    fn plan_units(&self) -> Vec<WorkUnit> {
        match self.config.extraction.mode {
            ExtractionMode::Unified => vec![WorkUnit::Unified],
            ExtractionMode::Sequential => {
                let mut plan: Vec<WorkUnit> = self
                    .config
                    .dimensions
                    .enabled_numeric()
                    .into_iter()
                    .map(WorkUnit::Dimension)
                    .collect();
                if self.config.dimensions.mood {
                    plan.push(WorkUnit::Mood);
                }
                if self.config.dimensions.last_thought {
                    plan.push(WorkUnit::Thought);
                }
                for index in 0..self.config.custom_stats.len() {
                    plan.push(WorkUnit::Custom(index));
                }
                plan
            }
        }
    }
}

/// Drive one unit of work through its repair ladder.
///
/// Strictly sequential within the unit; concurrency happens across units.
async fn run_unit(
    unit: &WorkUnit,
    oracle: &dyn Oracle,
    shared: &SharedInputs,
    handle: &RunHandle,
    limits: TokenLimits,
    traces: &Mutex<Vec<CallTrace>>,
) -> ParsedExtraction {
    let prompt_ctx = PromptContext {
        participants: &shared.active,
        context_text: &shared.context_text,
        history: &shared.snapshot_history,
        config: &shared.config,
    };
    let (base_prompt, target) = match unit {
        WorkUnit::Unified => (prompt::unified_prompt(&prompt_ctx), ParseTarget::Unified),
        WorkUnit::Dimension(dimension) => (
            prompt::dimension_prompt(&prompt_ctx, *dimension),
            ParseTarget::Dimension(*dimension),
        ),
        WorkUnit::Mood => (prompt::mood_prompt(&prompt_ctx), ParseTarget::Mood),
        WorkUnit::Thought => (prompt::thought_prompt(&prompt_ctx), ParseTarget::Thought),
        WorkUnit::Custom(index) => {
            let def = &shared.config.custom_stats[*index];
            (
                prompt::custom_stat_prompt(&prompt_ctx, def),
                ParseTarget::Custom(def),
            )
        }
    };
    let label = target.label();

    let required = required_fields(unit, &shared.config);
    let ladder = repair::repair_ladder(
        shared.config.extraction.strict_json_repair,
        shared.config.extraction.max_retries_per_stat,
        &required,
    );
    let parser_ctx = ParserContext {
        active: &shared.active,
        config: &shared.config,
    };

    let mut best = ParsedExtraction::default();
    for (index, strategy) in ladder.iter().enumerate() {
        let attempt = index as u32 + 1;
        // A field-mandatory rung only names the fields still missing.
        let strategy = match strategy {
            RepairStrategy::RequireFields(fields) => RepairStrategy::RequireFields(
                fields
                    .iter()
                    .filter(|f| !field_satisfied(&best, &shared.active, f))
                    .cloned()
                    .collect(),
            ),
            other => other.clone(),
        };
        let prompt_text = strategy.apply(&base_prompt);
        let started = Instant::now();

        // One abortable call: supersession fails it immediately with an
        // abort, which is clean cancellation — never retried.
        let result = tokio::select! {
            biased;
            () = handle.cancelled() => Err(OracleError::Aborted),
            generated = oracle.generate(&prompt_text, &limits) => generated,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let parsed = parse::parse_response(&output.text, &target, &parser_ctx);
                let participant_count = parsed.participants.len();
                traces.lock().push(CallTrace {
                    label: label.clone(),
                    attempt,
                    strategy: strategy.to_string(),
                    prompt_chars: prompt_text.chars().count(),
                    max_tokens: limits.max_tokens,
                    duration_ms,
                    raw_text: Some(output.text),
                    error: None,
                    parsed_participants: participant_count,
                });

                if !parsed.is_empty() {
                    best = parsed;
                }
                if is_satisfied(&best, &shared.active, &required) {
                    break;
                }
                debug!(
                    %label,
                    attempt,
                    "parse incomplete; {}",
                    if attempt as usize == ladder.len() {
                        "accepting partial result"
                    } else {
                        "climbing repair ladder"
                    }
                );
            }
            Err(OracleError::Aborted) => {
                traces.lock().push(abort_trace(&label, attempt, &strategy, duration_ms));
                debug!(%label, attempt, "oracle call aborted by supersession");
                return ParsedExtraction::default();
            }
            Err(error) => {
                warn!(%label, attempt, %error, "oracle call failed");
                traces.lock().push(CallTrace {
                    label: label.clone(),
                    attempt,
                    strategy: strategy.to_string(),
                    prompt_chars: prompt_text.chars().count(),
                    max_tokens: limits.max_tokens,
                    duration_ms,
                    raw_text: None,
                    error: Some(error.to_string()),
                    parsed_participants: 0,
                });
            }
        }
    }
    best
}

fn abort_trace(label: &str, attempt: u32, strategy: &RepairStrategy, duration_ms: u64) -> CallTrace {
    CallTrace {
        label: label.to_string(),
        attempt,
        strategy: strategy.to_string(),
        prompt_chars: 0,
        max_tokens: 0,
        duration_ms,
        raw_text: None,
        error: Some("aborted".to_string()),
        parsed_participants: 0,
    }
}

/// Fields whose absence keeps the repair ladder climbing.
fn required_fields(unit: &WorkUnit, config: &TrackerConfig) -> Vec<String> {
    match unit {
        WorkUnit::Unified => {
            let mut fields = Vec::new();
            if config.dimensions.mood {
                fields.push("mood".to_string());
            }
            if config.dimensions.last_thought {
                fields.push("last_thought".to_string());
            }
            fields
        }
        WorkUnit::Mood => vec!["mood".to_string()],
        WorkUnit::Thought => vec!["last_thought".to_string()],
        WorkUnit::Dimension(_) | WorkUnit::Custom(_) => Vec::new(),
    }
}

/// Whether a parse covers every required field for every active participant.
fn is_satisfied(parsed: &ParsedExtraction, active: &[String], required: &[String]) -> bool {
    if parsed.is_empty() {
        return false;
    }
    if active.iter().any(|name| parsed.participant(name).is_none()) {
        return false;
    }
    required
        .iter()
        .all(|field| field_satisfied(parsed, active, field))
}

/// Whether one required field is present for every active participant.
fn field_satisfied(parsed: &ParsedExtraction, active: &[String], field: &str) -> bool {
    active.iter().all(|name| {
        parsed.participant(name).is_some_and(|participant| match field {
            "mood" => participant.mood.is_some(),
            "last_thought" => participant.last_thought.is_some(),
            _ => true,
        })
    })
}
