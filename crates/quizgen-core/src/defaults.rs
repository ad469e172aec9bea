//! Centralized default constants for quizgen.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration structs (`OrchestratorConfig`, `GatewayConfig`, `PoolConfig`)
//! fall back to these when no override is supplied.

// =============================================================================
// REVIEW
// =============================================================================

/// Maximum regenerations allowed per question.
pub const MAX_REGENERATIONS: u32 = 5;

// =============================================================================
// INTAKE / DEDUP
// =============================================================================

/// Recency window (days) within which identical content reuses prior analysis.
pub const DEDUP_WINDOW_DAYS: i64 = 30;

/// Maximum characters of combined content sent to topic analysis.
pub const MAX_ANALYSIS_CHARS: usize = 150_000;

/// Maximum characters of topic content sent with a generation call.
pub const MAX_TOPIC_CONTENT_CHARS: usize = 5_000;

/// Maximum characters of an old question quoted in a regeneration call.
pub const MAX_OLD_QUESTION_CHARS: usize = 500;

/// Separator used when a user merges two topic titles.
pub const TOPIC_MERGE_SEPARATOR: &str = " & ";

// =============================================================================
// GENERATION
// =============================================================================

/// Upper bound on questions per request.
pub const MAX_QUESTIONS_PER_REQUEST: u32 = 500;

/// Fixed part of the inline generation time budget (seconds).
pub const GENERATION_BUDGET_BASE_SECS: u64 = 120;

/// Per-question part of the inline generation time budget (seconds).
pub const GENERATION_BUDGET_PER_QUESTION_SECS: u64 = 20;

/// Recent question texts passed to the generator to avoid near-duplicates.
pub const AVOID_CONTEXT_QUESTIONS: usize = 10;

/// Options a multiple-choice question is topped up to with generated distractors.
pub const DISTRACTOR_TARGET: usize = 4;

/// Default difficulty distribution (percent).
pub const DIFFICULTY_DISTRIBUTION: [(&str, u32); 3] = [("easy", 20), ("medium", 60), ("hard", 20)];

/// Default cognitive-level distribution (percent).
pub const COGNITIVE_DISTRIBUTION: [(&str, u32); 6] = [
    ("remember", 20),
    ("understand", 25),
    ("apply", 25),
    ("analyze", 15),
    ("evaluate", 10),
    ("create", 5),
];

// =============================================================================
// INFERENCE GATEWAY
// =============================================================================

/// Default AI gateway base URL.
pub const GATEWAY_URL: &str = "http://127.0.0.1:8000";

/// Timeout for gateway requests in seconds.
pub const GATEWAY_TIMEOUT_SECS: u64 = 180;

/// Default gateway quality tier.
pub const GATEWAY_QUALITY: &str = "balanced";

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Maximum pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// Wait for a free connection before failing, in seconds.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connections are closed after this many seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// `application_name` reported to PostgreSQL.
pub const DB_APPLICATION_NAME: &str = "quizgen";

// =============================================================================
// EVENTS
// =============================================================================

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_distributions_sum_to_100() {
        let difficulty: u32 = DIFFICULTY_DISTRIBUTION.iter().map(|(_, p)| p).sum();
        let cognitive: u32 = COGNITIVE_DISTRIBUTION.iter().map(|(_, p)| p).sum();
        assert_eq!(difficulty, 100);
        assert_eq!(cognitive, 100);
    }

    #[test]
    fn test_generation_budget_is_positive() {
        assert!(GENERATION_BUDGET_BASE_SECS > 0);
        assert!(GENERATION_BUDGET_PER_QUESTION_SECS > 0);
    }
}
