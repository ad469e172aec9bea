//! Mock AI backend for deterministic testing.
//!
//! Produces drafts with a valid answer shape for every question type, so
//! orchestrator tests can run without a gateway.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quizgen_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_topics(["Cell Biology", "Photosynthesis"])
//!     .with_failing_topic("Genetics");
//! assert_eq!(backend.call_count("generate"), 0);
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quizgen_core::{
    AnalysisBackend, AnalyzedTopic, AnswerDraft, CognitiveLevel, Difficulty, Error,
    GenerationBackend, GenerationCall, QuestionDraft, QuestionType, RegenerationCall, Result,
};

/// Error text returned for failing generation calls.
pub const GENERATION_UNAVAILABLE: &str = "AI question generation is temporarily unavailable";

/// Error text returned for failing analysis calls.
pub const ANALYSIS_UNAVAILABLE: &str = "AI topic analysis is temporarily unavailable";

/// Mock backend implementing both analysis and generation.
#[derive(Clone)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    sequence: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    topics: Vec<AnalyzedTopic>,
    fail_analysis: bool,
    fail_regeneration: bool,
    failing_topics: HashSet<String>,
    /// Multiple-choice drafts come back with only two options.
    short_options: bool,
    /// Essay drafts come back without a model answer.
    essay_without_key: bool,
    /// Every draft comes back with an answer shape its type rejects.
    invalid_shapes: bool,
    latency_ms: u64,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationBackend {
    /// Create a mock that analyzes into a single "General" topic.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig {
                topics: vec![AnalyzedTopic {
                    title: "General".to_string(),
                    level: 1,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            call_log: Arc::new(Mutex::new(Vec::new())),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Topics returned by `analyze`, as bare titles.
    pub fn with_topics<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.config).topics = titles
            .into_iter()
            .map(|t| AnalyzedTopic {
                title: t.into(),
                description: "Generated by the mock analyzer".to_string(),
                level: 1,
                content_excerpt: "Mock excerpt".to_string(),
                ..Default::default()
            })
            .collect();
        self
    }

    /// Topics returned by `analyze`, fully specified.
    pub fn with_analyzed_topics(mut self, topics: Vec<AnalyzedTopic>) -> Self {
        Arc::make_mut(&mut self.config).topics = topics;
        self
    }

    pub fn with_failing_analysis(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_analysis = true;
        self
    }

    pub fn with_failing_regeneration(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_regeneration = true;
        self
    }

    /// Generation calls for this topic title fail.
    pub fn with_failing_topic(mut self, title: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .failing_topics
            .insert(title.into());
        self
    }

    pub fn with_short_options(mut self) -> Self {
        Arc::make_mut(&mut self.config).short_options = true;
        self
    }

    pub fn with_essay_without_key(mut self) -> Self {
        Arc::make_mut(&mut self.config).essay_without_key = true;
        self
    }

    pub fn with_invalid_shapes(mut self) -> Self {
        Arc::make_mut(&mut self.config).invalid_shapes = true;
        self
    }

    /// Simulated latency per call, observed through `tokio::time`.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of calls to one operation.
    pub fn call_count(&self, operation: &str) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    async fn record(&self, operation: &str, input: impl Into<String>) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.into(),
        });
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn next(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn draft(&self, qtype: QuestionType, difficulty: Difficulty, body: String) -> QuestionDraft {
        let answers = if self.config.invalid_shapes {
            invalid_answers(qtype)
        } else {
            answers_for(qtype, self.config.short_options)
        };
        let general_feedback = match qtype {
            QuestionType::Essay if self.config.essay_without_key => String::new(),
            QuestionType::Essay => "Model answer: a complete explanation.".to_string(),
            _ => "Review the topic material.".to_string(),
        };
        QuestionDraft {
            question_type: qtype,
            difficulty,
            cognitive_level: CognitiveLevel::Understand,
            body,
            general_feedback,
            ai_reasoning: "Deterministic mock output".to_string(),
            answers,
        }
    }
}

fn answers_for(qtype: QuestionType, short: bool) -> Vec<AnswerDraft> {
    match qtype {
        QuestionType::MultipleChoice | QuestionType::Scenario => {
            let mut answers = vec![AnswerDraft::new("Correct option", 1.0)];
            let wrong = if short { 1 } else { 3 };
            answers.extend((1..=wrong).map(|i| AnswerDraft::new(format!("Wrong option {}", i), 0.0)));
            answers
        }
        QuestionType::MultipleResponse if short => vec![
            AnswerDraft::new("Correct option", 1.0),
            AnswerDraft::new("Wrong option", 0.0),
        ],
        QuestionType::MultipleResponse => vec![
            AnswerDraft::new("First correct option", 0.5),
            AnswerDraft::new("Second correct option", 0.5),
            AnswerDraft::new("Wrong option 1", 0.0),
            AnswerDraft::new("Wrong option 2", 0.0),
        ],
        QuestionType::TrueFalse => vec![
            AnswerDraft::new("True", 1.0),
            AnswerDraft::new("False", 0.0),
        ],
        QuestionType::ShortAnswer => vec![AnswerDraft::new("photosynthesis", 1.0)],
        QuestionType::Essay => Vec::new(),
        QuestionType::Matching => vec![
            AnswerDraft::new("Mitochondria -> ATP production", 1.0),
            AnswerDraft::new("Ribosome -> Protein synthesis", 1.0),
            AnswerDraft::new("Nucleus -> Genetic material", 1.0),
        ],
    }
}

fn invalid_answers(qtype: QuestionType) -> Vec<AnswerDraft> {
    match qtype {
        QuestionType::Essay => vec![AnswerDraft::new("Essays take no options", 1.0)],
        _ => vec![AnswerDraft::new("Only option", 0.0)],
    }
}

fn dominant(call: &GenerationCall) -> Difficulty {
    call.difficulty_distribution
        .iter()
        .max_by_key(|(d, pct)| (**pct, std::cmp::Reverse(**d)))
        .map(|(d, _)| *d)
        .unwrap_or(Difficulty::Medium)
}

#[async_trait]
impl AnalysisBackend for MockGenerationBackend {
    async fn analyze(&self, content: &str) -> Result<Vec<AnalyzedTopic>> {
        self.record("analyze", content).await;
        if self.config.fail_analysis {
            return Err(Error::Upstream(ANALYSIS_UNAVAILABLE.to_string()));
        }
        Ok(self.config.topics.clone())
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, call: &GenerationCall) -> Result<Vec<QuestionDraft>> {
        self.record(
            "generate",
            format!("{}:{}:{}", call.topic_title, call.question_type, call.count),
        )
        .await;
        if self.config.failing_topics.contains(&call.topic_title) {
            return Err(Error::Upstream(GENERATION_UNAVAILABLE.to_string()));
        }
        let difficulty = dominant(call);
        Ok((0..call.count)
            .map(|_| {
                let n = self.next();
                self.draft(
                    call.question_type,
                    difficulty,
                    format!(
                        "Mock {} question {} about {}?",
                        call.question_type, n, call.topic_title
                    ),
                )
            })
            .collect())
    }

    async fn regenerate(&self, call: &RegenerationCall) -> Result<QuestionDraft> {
        self.record("regenerate", call.previous.body.clone()).await;
        if self.config.fail_regeneration {
            return Err(Error::Upstream(GENERATION_UNAVAILABLE.to_string()));
        }
        let n = self.next();
        Ok(self.draft(
            call.previous.question_type,
            call.previous.difficulty,
            format!(
                "Regenerated {} question {} about {}?",
                call.previous.question_type, n, call.topic_title
            ),
        ))
    }

    async fn generate_distractors(
        &self,
        question_text: &str,
        _correct_answer: &str,
        _difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<String>> {
        self.record("generate_distractors", question_text).await;
        Ok((1..=count).map(|i| format!("Plausible distractor {}", i)).collect())
    }

    async fn generate_answer_key(&self, question_text: &str) -> Result<String> {
        self.record("generate_answer_key", question_text).await;
        Ok(format!("Model answer for: {}", question_text))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
