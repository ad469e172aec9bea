//! Orchestrator configuration.

use std::time::Duration;

use quizgen_core::defaults;

/// Settings injected into the orchestrator at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Regenerations allowed per question.
    pub max_regenerations: u32,
    /// Window (days) in which identical content reuses prior topics.
    pub dedup_window_days: i64,
    /// Upper bound on a request's total question count.
    pub max_questions_per_request: u32,
    pub generation_budget_base_secs: u64,
    pub generation_budget_per_question_secs: u64,
    /// Characters of combined content sent to analysis.
    pub max_analysis_chars: usize,
    /// Characters of topic content sent with each generation call.
    pub max_topic_content_chars: usize,
    /// Recent question texts passed to the generator.
    pub avoid_context_questions: usize,
    /// Options a multiple-choice draft is topped up to.
    pub distractor_target: usize,
    pub topic_merge_separator: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_regenerations: defaults::MAX_REGENERATIONS,
            dedup_window_days: defaults::DEDUP_WINDOW_DAYS,
            max_questions_per_request: defaults::MAX_QUESTIONS_PER_REQUEST,
            generation_budget_base_secs: defaults::GENERATION_BUDGET_BASE_SECS,
            generation_budget_per_question_secs: defaults::GENERATION_BUDGET_PER_QUESTION_SECS,
            max_analysis_chars: defaults::MAX_ANALYSIS_CHARS,
            max_topic_content_chars: defaults::MAX_TOPIC_CONTENT_CHARS,
            avoid_context_questions: defaults::AVOID_CONTEXT_QUESTIONS,
            distractor_target: defaults::DISTRACTOR_TARGET,
            topic_merge_separator: defaults::TOPIC_MERGE_SEPARATOR.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl OrchestratorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `QUIZGEN_MAX_REGENERATIONS` | `5` |
    /// | `QUIZGEN_DEDUP_WINDOW_DAYS` | `30` |
    /// | `QUIZGEN_MAX_QUESTIONS` | `500` |
    /// | `QUIZGEN_BUDGET_BASE_SECS` | `120` |
    /// | `QUIZGEN_BUDGET_PER_QUESTION_SECS` | `20` |
    /// | `QUIZGEN_MAX_ANALYSIS_CHARS` | `150000` |
    /// | `QUIZGEN_MAX_TOPIC_CONTENT_CHARS` | `5000` |
    /// | `QUIZGEN_AVOID_CONTEXT` | `10` |
    /// | `QUIZGEN_DISTRACTOR_TARGET` | `4` |
    /// | `QUIZGEN_TOPIC_MERGE_SEPARATOR` | `" & "` |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_regenerations: env_parse("QUIZGEN_MAX_REGENERATIONS").unwrap_or(d.max_regenerations),
            dedup_window_days: env_parse("QUIZGEN_DEDUP_WINDOW_DAYS").unwrap_or(d.dedup_window_days),
            max_questions_per_request: env_parse("QUIZGEN_MAX_QUESTIONS")
                .unwrap_or(d.max_questions_per_request)
                .max(1),
            generation_budget_base_secs: env_parse("QUIZGEN_BUDGET_BASE_SECS")
                .unwrap_or(d.generation_budget_base_secs),
            generation_budget_per_question_secs: env_parse("QUIZGEN_BUDGET_PER_QUESTION_SECS")
                .unwrap_or(d.generation_budget_per_question_secs),
            max_analysis_chars: env_parse("QUIZGEN_MAX_ANALYSIS_CHARS")
                .unwrap_or(d.max_analysis_chars),
            max_topic_content_chars: env_parse("QUIZGEN_MAX_TOPIC_CONTENT_CHARS")
                .unwrap_or(d.max_topic_content_chars),
            avoid_context_questions: env_parse("QUIZGEN_AVOID_CONTEXT")
                .unwrap_or(d.avoid_context_questions),
            distractor_target: env_parse("QUIZGEN_DISTRACTOR_TARGET").unwrap_or(d.distractor_target),
            topic_merge_separator: std::env::var("QUIZGEN_TOPIC_MERGE_SEPARATOR")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(d.topic_merge_separator),
        }
    }

    /// Inline generation budget for a request of `total` questions.
    pub fn generation_budget(&self, total: u32) -> Duration {
        Duration::from_secs(
            self.generation_budget_base_secs
                + self.generation_budget_per_question_secs * u64::from(total),
        )
    }

    pub fn with_max_regenerations(mut self, max: u32) -> Self {
        self.max_regenerations = max;
        self
    }

    pub fn with_dedup_window_days(mut self, days: i64) -> Self {
        self.dedup_window_days = days;
        self
    }

    pub fn with_max_questions(mut self, max: u32) -> Self {
        self.max_questions_per_request = max;
        self
    }

    /// Set both parts of the generation budget.
    pub fn with_generation_budget(mut self, base_secs: u64, per_question_secs: u64) -> Self {
        self.generation_budget_base_secs = base_secs;
        self.generation_budget_per_question_secs = per_question_secs;
        self
    }

    pub fn with_max_analysis_chars(mut self, chars: usize) -> Self {
        self.max_analysis_chars = chars;
        self
    }

    pub fn with_distractor_target(mut self, target: usize) -> Self {
        self.distractor_target = target;
        self
    }
}
