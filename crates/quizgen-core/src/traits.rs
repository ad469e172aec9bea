//! Core traits for quizgen abstractions.
//!
//! Repositories persist the orchestrator's own entities. The AI backends, the
//! content extractors, the destination question store and the host access
//! policy are external collaborators behind these interfaces so they can be
//! swapped for in-memory or mock implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fingerprint::DedupKey;
use crate::models::*;
use crate::question_type::QuestionType;
use crate::topics::TopicMerge;

// =============================================================================
// REQUEST REPOSITORY
// =============================================================================

/// Repository for generation requests.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Insert a new request in `pending`.
    async fn insert(&self, req: CreateRequest) -> Result<GenerationRequest>;

    /// Fetch a request by ID.
    async fn get(&self, id: Uuid) -> Result<Option<GenerationRequest>>;

    /// Most recent completed request matching the key that still has topics.
    async fn find_reusable(&self, key: &DedupKey) -> Result<Option<GenerationRequest>>;

    /// Persist status, error, configuration and timestamps.
    ///
    /// Compare-and-set: fails with `Error::Conflict` unless the stored status
    /// still equals `expected`.
    async fn save_transition(
        &self,
        request: &GenerationRequest,
        expected: RequestStatus,
    ) -> Result<()>;

    /// Requests in a collection, newest first.
    async fn list_for_collection(&self, collection_id: i64) -> Result<Vec<GenerationRequest>>;
}

// =============================================================================
// TOPIC REPOSITORY
// =============================================================================

/// Repository for topics belonging to a request.
#[async_trait]
pub trait TopicRepository: Send + Sync {
    /// Insert topics after any existing ones, preserving the given order.
    async fn insert_many(&self, request_id: Uuid, topics: Vec<NewTopic>) -> Result<Vec<Topic>>;

    /// All topics of a request in display order.
    async fn list(&self, request_id: Uuid) -> Result<Vec<Topic>>;

    /// Select exactly `selected`; every other topic is deselected with quota 0.
    async fn set_selection(&self, request_id: Uuid, selected: &[Uuid]) -> Result<u64>;

    /// Write quotas for the given topics in one batched statement.
    async fn set_quotas(&self, request_id: Uuid, quotas: &[(Uuid, u32)]) -> Result<u64>;

    /// Apply merges: reassign absorbed topics' questions to the kept topic,
    /// update the kept topic, then delete the absorbed topics. One transaction.
    async fn apply_merges(&self, request_id: Uuid, merges: &[TopicMerge]) -> Result<()>;

    /// Rename a topic.
    async fn rename(&self, request_id: Uuid, topic_id: Uuid, title: &str) -> Result<()>;

    /// Delete topics (their questions and answers cascade).
    async fn delete_many(&self, request_id: Uuid, ids: &[Uuid]) -> Result<u64>;

    /// Delete every topic of a request.
    async fn delete_for_request(&self, request_id: Uuid) -> Result<u64>;
}

// =============================================================================
// QUESTION REPOSITORY
// =============================================================================

/// Per-status question counts for one request.
pub type StatusCounts = BTreeMap<QuestionStatus, u64>;

/// Repository for generated questions and their answers.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Insert questions with their answers.
    async fn insert_many(&self, questions: Vec<NewQuestion>) -> Result<Vec<Question>>;

    /// Fetch one question with answers.
    async fn get(&self, id: Uuid) -> Result<Option<Question>>;

    /// Fetch many questions in one round trip. Missing ids are simply absent.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Question>>;

    /// Questions of a request matching the filter, oldest first.
    async fn list(&self, request_id: Uuid, filter: &QuestionFilter) -> Result<Vec<Question>>;

    /// Batched status change guarded by the allowed prior statuses.
    ///
    /// Rows not in `allowed_from` are left untouched; returns rows changed.
    async fn set_status(
        &self,
        ids: &[Uuid],
        to: QuestionStatus,
        allowed_from: &[QuestionStatus],
    ) -> Result<u64>;

    /// Replace a question's content with a regenerated draft.
    ///
    /// Increments `regeneration_count` and resets status to `pending`, only
    /// while the count is below `max_regenerations` and the question is not
    /// deployed. Otherwise fails with `Error::Conflict`.
    async fn replace_draft(
        &self,
        id: Uuid,
        draft: &QuestionDraft,
        quality_score: f32,
        max_regenerations: u32,
    ) -> Result<Question>;

    /// Record destination store ids right after import.
    async fn record_store_ids(&self, pairs: &[(Uuid, i64)]) -> Result<u64>;

    /// Rewrite answer sort order; `order` must list every answer id once.
    async fn reorder_answers(&self, question_id: Uuid, order: &[Uuid]) -> Result<()>;

    /// Delete questions and their answers.
    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64>;

    /// Delete every question of a request.
    async fn delete_for_request(&self, request_id: Uuid) -> Result<u64>;

    /// Question counts by status.
    async fn count_by_status(&self, request_id: Uuid) -> Result<StatusCounts>;
}

// =============================================================================
// AI BACKENDS
// =============================================================================

/// Topic analysis service.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Extract candidate topics from combined content text.
    async fn analyze(&self, content: &str) -> Result<Vec<AnalyzedTopic>>;
}

/// One generation call: `count` questions of one type for one topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationCall {
    pub topic_title: String,
    pub topic_content: String,
    pub question_type: QuestionType,
    pub count: u32,
    pub difficulty_distribution: BTreeMap<Difficulty, u32>,
    pub cognitive_distribution: BTreeMap<CognitiveLevel, u32>,
    /// Recent question texts the generator should not repeat.
    pub avoid: Vec<String>,
}

/// A regeneration call for one existing question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegenerationCall {
    pub topic_title: String,
    pub topic_content: String,
    pub previous: QuestionDraft,
}

/// Question generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Draft new questions for one slot.
    async fn generate(&self, call: &GenerationCall) -> Result<Vec<QuestionDraft>>;

    /// Draft a replacement for an existing question (same type and slot).
    async fn regenerate(&self, call: &RegenerationCall) -> Result<QuestionDraft>;

    /// Plausible wrong answers for a question.
    async fn generate_distractors(
        &self,
        question_text: &str,
        correct_answer: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<String>>;

    /// Model answer key for an essay question.
    async fn generate_answer_key(&self, question_text: &str) -> Result<String>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// =============================================================================
// CONTENT EXTRACTION
// =============================================================================

/// Scope passed to extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionContext {
    pub owner_id: i64,
    pub collection_id: i64,
}

/// Text extracted from one source, or one item of a bulk scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub name: String,
    /// Format label shown in the topic marker, e.g. "Lesson", "File".
    pub kind_label: String,
    pub text: String,
}

/// Turns one kind of content source into text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Source kind this extractor handles.
    fn kind(&self) -> SourceKind;

    /// Extract normalized text sections from a source.
    async fn extract(
        &self,
        source: &ContentSource,
        ctx: &ExtractionContext,
    ) -> Result<Vec<ExtractedSection>>;
}

// =============================================================================
// DESTINATION STORE
// =============================================================================

/// Publish state of a question version in the destination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Ready,
    Hidden,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Ready => "ready",
            VersionStatus::Hidden => "hidden",
        }
    }

    /// `draft` is the only non-terminal publish state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VersionStatus::Draft)
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(VersionStatus::Draft),
            "ready" => Ok(VersionStatus::Ready),
            "hidden" => Ok(VersionStatus::Hidden),
            other => Err(Error::Validation(format!("unknown version status '{}'", other))),
        }
    }
}

/// A question in the shape the destination store imports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreQuestion {
    /// Orchestrator question id, echoed back in outcomes.
    pub source_id: Uuid,
    pub question_type: QuestionType,
    pub name: String,
    pub body: String,
    pub general_feedback: String,
    pub answers: Vec<AnswerDraft>,
}

impl From<&Question> for StoreQuestion {
    fn from(q: &Question) -> Self {
        let name: String = q.body.chars().take(80).collect();
        Self {
            source_id: q.id,
            question_type: q.question_type,
            name,
            body: q.body.clone(),
            general_feedback: q.general_feedback.clone(),
            answers: q.to_draft().answers,
        }
    }
}

/// Per-item outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub source_id: Uuid,
    pub result: std::result::Result<i64, String>,
}

/// Per-item outcome of attaching a store question to a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOutcome {
    pub store_question_id: i64,
    pub result: std::result::Result<(), String>,
}

/// Which store questions to read linkage for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    Collection(i64),
    Questions(Vec<i64>),
}

/// Linkage facts about one store question, read in one batched query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkageRecord {
    pub store_question_id: i64,
    /// Store type name as recorded by the store.
    pub question_type: String,
    /// Legacy category field on the bank entry.
    pub entry_category_id: Option<i64>,
    /// Category from the authoritative reference record, if one exists.
    pub reference_category_id: Option<i64>,
    /// Whether the type-specific payload record exists.
    pub has_payload: bool,
    pub version_status: VersionStatus,
}

/// Externally owned question bank and quiz assembly API.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Find or create a named category in a collection.
    async fn ensure_category(&self, collection_id: i64, name: &str) -> Result<i64>;

    /// Import questions into a category.
    async fn import_questions(
        &self,
        category_id: i64,
        questions: &[StoreQuestion],
    ) -> Result<Vec<ImportOutcome>>;

    /// Create an empty quiz container.
    async fn create_quiz(&self, collection_id: i64, name: &str) -> Result<i64>;

    /// Attach store questions to a quiz. Already attached ids succeed unchanged.
    async fn attach_to_quiz(
        &self,
        quiz_id: i64,
        store_question_ids: &[i64],
    ) -> Result<Vec<AttachOutcome>>;

    /// Read linkage records for a scope.
    async fn linkage_records(&self, scope: &StoreScope) -> Result<Vec<LinkageRecord>>;

    /// Overwrite the legacy category of many entries in one update.
    async fn set_entry_category(&self, category_id: i64, store_question_ids: &[i64])
        -> Result<u64>;

    /// Move many versions to a publish state in one update.
    async fn set_version_status(
        &self,
        store_question_ids: &[i64],
        status: VersionStatus,
    ) -> Result<u64>;
}

// =============================================================================
// ACCESS POLICY
// =============================================================================

/// Host permission check for collection-scoped actions.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn can_manage_collection(&self, actor: &Actor, collection_id: i64) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_version_status_terminal() {
        assert!(!VersionStatus::Draft.is_terminal());
        assert!(VersionStatus::Ready.is_terminal());
        assert!(VersionStatus::Hidden.is_terminal());
        assert_eq!("ready".parse::<VersionStatus>().unwrap(), VersionStatus::Ready);
        assert!("published".parse::<VersionStatus>().is_err());
    }

    #[test]
    fn test_store_question_from_question() {
        let now = Utc::now();
        let qid = Uuid::new_v4();
        let question = Question {
            id: qid,
            request_id: Uuid::nil(),
            topic_id: Uuid::nil(),
            question_type: QuestionType::TrueFalse,
            difficulty: Difficulty::Easy,
            cognitive_level: CognitiveLevel::Remember,
            body: "The mitochondrion is the powerhouse of the cell.".into(),
            general_feedback: String::new(),
            ai_reasoning: String::new(),
            status: QuestionStatus::Approved,
            regeneration_count: 0,
            quality_score: 80.0,
            store_question_id: None,
            answers: vec![
                Answer {
                    id: Uuid::new_v4(),
                    question_id: qid,
                    body: "False".into(),
                    weight: 0.0,
                    feedback: String::new(),
                    sort_order: 1,
                },
                Answer {
                    id: Uuid::new_v4(),
                    question_id: qid,
                    body: "True".into(),
                    weight: 1.0,
                    feedback: String::new(),
                    sort_order: 0,
                },
            ],
            created_at: now,
            updated_at: now,
        };
        let store = StoreQuestion::from(&question);
        assert_eq!(store.source_id, qid);
        assert_eq!(store.answers[0].body, "True");
        assert_eq!(store.answers.len(), 2);
    }
}
