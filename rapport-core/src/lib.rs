//! # Rapport Core Library
//!
//! Host-agnostic relationship-state engine for multi-turn conversations.
//!
//! Every scene participant gets a tracked state record — affection, trust,
//! desire, connection, mood, a free-text last thought, and any host-declared
//! custom stats — inferred turn by turn from an external text generator and
//! kept bounded no matter what that generator emits:
//!
//! - **Activity** — who is on stage this turn, with a reason per name
//! - **Baseline** — a first snapshot synthesised from configured defaults
//!   and a lexical scan of recent messages
//! - **Merge** — confidence-dampened deltas, mood stickiness, clamping,
//!   and default backfill, all deterministic
//! - **Storage** — a narrow snapshot contract with in-memory and SQLite
//!   adapters
//!
//! The oracle-facing half (prompts, parsing, orchestration) lives in the
//! companion `rapport-llm` crate.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod activity;
pub mod baseline;
pub mod chat;
pub mod config;
pub mod custom;
pub mod error;
pub mod merge;
pub mod mood;
pub mod storage;
pub mod types;

pub use config::TrackerConfig;
pub use error::RapportError;
pub use types::{ActivityAnalysis, StatisticsSnapshot, TrackerSnapshot};
