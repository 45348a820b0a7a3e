//! Repair-strategy ladder for malformed oracle output.
//!
//! Retries are not blind re-sends: each rung transforms the prompt to pin
//! the oracle down further. The ladder is an ordered list of tagged
//! strategies consumed by the orchestrator, so the whole retry state
//! machine is auditable from one place.

use std::fmt;

/// Appended by [`RepairStrategy::StrictJson`].
pub const STRICT_JSON_OVERRIDE: &str = "\n\nIMPORTANT: Return ONLY a single JSON object. \
No prose, no code fences, no explanation — the response must start with '{' and end with '}'.";

/// Appended per field by [`RepairStrategy::RequireFields`].
pub const REQUIRE_FIELD_OVERRIDE: &str =
    "\nMANDATORY: include a non-empty \"{field}\" value for every listed character.";

/// One rung of the repair ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStrategy {
    /// The base prompt, unchanged.
    Base,
    /// Base prompt plus the "return ONLY JSON" override.
    StrictJson,
    /// Strict prompt plus field-specific mandatory-inclusion overrides.
    RequireFields(Vec<String>),
}

impl RepairStrategy {
    /// Apply this strategy to the base prompt.
    #[must_use]
    pub fn apply(&self, base_prompt: &str) -> String {
        match self {
            RepairStrategy::Base => base_prompt.to_string(),
            RepairStrategy::StrictJson => format!("{base_prompt}{STRICT_JSON_OVERRIDE}"),
            RepairStrategy::RequireFields(fields) => {
                let mut prompt = format!("{base_prompt}{STRICT_JSON_OVERRIDE}");
                for field in fields {
                    prompt.push_str(&REQUIRE_FIELD_OVERRIDE.replace("{field}", field));
                }
                prompt
            }
        }
    }
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairStrategy::Base => write!(f, "base"),
            RepairStrategy::StrictJson => write!(f, "strict-json"),
            RepairStrategy::RequireFields(fields) => {
                write!(f, "require-fields({})", fields.join(","))
            }
        }
    }
}

/// Build the ladder for one unit of work.
///
/// The ladder has at most `max_retries + 1` rungs: the base attempt, then a
/// strict-JSON attempt (when `strict_json_repair` is on), then
/// field-mandatory attempts for `required_fields`. With strict repair off,
/// partial results are accepted immediately — the ladder is just the base.
#[must_use]
pub fn repair_ladder(
    strict_json_repair: bool,
    max_retries: u32,
    required_fields: &[String],
) -> Vec<RepairStrategy> {
    let mut ladder = vec![RepairStrategy::Base];
    if !strict_json_repair {
        return ladder;
    }
    ladder.push(RepairStrategy::StrictJson);
    if !required_fields.is_empty() {
        ladder.push(RepairStrategy::RequireFields(required_fields.to_vec()));
    }
    ladder.truncate(max_retries as usize + 1);
    ladder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_orders_base_strict_fields() {
        let ladder = repair_ladder(true, 4, &["mood".to_string()]);
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0], RepairStrategy::Base);
        assert_eq!(ladder[1], RepairStrategy::StrictJson);
        assert!(matches!(ladder[2], RepairStrategy::RequireFields(_)));
    }

    #[test]
    fn strict_repair_off_accepts_partial_results() {
        let ladder = repair_ladder(false, 4, &["mood".to_string()]);
        assert_eq!(ladder, vec![RepairStrategy::Base]);
    }

    #[test]
    fn max_retries_truncates_the_ladder() {
        let ladder = repair_ladder(true, 0, &["mood".to_string()]);
        assert_eq!(ladder, vec![RepairStrategy::Base]);

        let ladder = repair_ladder(true, 1, &["mood".to_string()]);
        assert_eq!(ladder.len(), 2);
    }

    #[test]
    fn strategies_transform_the_prompt() {
        let base = "Assess the scene.";
        assert_eq!(RepairStrategy::Base.apply(base), base);

        let strict = RepairStrategy::StrictJson.apply(base);
        assert!(strict.contains("ONLY a single JSON object"));

        let fields = RepairStrategy::RequireFields(vec!["mood".into(), "last_thought".into()])
            .apply(base);
        assert!(fields.contains("\"mood\""));
        assert!(fields.contains("\"last_thought\""));
    }
}
