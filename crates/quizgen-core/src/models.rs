//! Data model for generation requests, topics, questions, and answers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::question_type::QuestionType;

/// Generates `as_str`, `Display` and `FromStr` for a unit enum stored as text.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stable lowercase name used in storage and on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// All variants in declaration order.
            pub fn all() -> &'static [$name] {
                &[$($name::$variant),+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::Validation(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

// =============================================================================
// REQUEST
// =============================================================================

/// Lifecycle status of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Request exists, no content processed yet.
    Pending,
    /// Fingerprint computed, analysis in progress.
    Analyzing,
    /// Topics persisted and deduplicated, awaiting selection.
    TopicsReady,
    /// Distributions chosen and quotas computed.
    Configured,
    /// Generation running inline.
    Generating,
    /// Every planned generation call returned.
    Completed,
    /// Unrecoverable error captured in `error`.
    Failed,
}

text_enum!(RequestStatus {
    Pending => "pending",
    Analyzing => "analyzing",
    TopicsReady => "topics_ready",
    Configured => "configured",
    Generating => "generating",
    Completed => "completed",
    Failed => "failed",
});

/// A descriptor of uploaded file content (hashed by name and size).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    /// Host storage reference used by the file extractor.
    pub reference: String,
}

/// A reference to an existing host activity (page, lesson, book...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRef {
    pub id: i64,
    /// Activity module kind, e.g. "page", "lesson", "scorm".
    pub kind: String,
    pub name: String,
}

/// Flags asking the host to scan the whole collection for content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkScan {
    pub whole_collection: bool,
    pub include_resources: bool,
    pub include_activities: bool,
}

impl BulkScan {
    pub fn is_enabled(&self) -> bool {
        self.whole_collection || self.include_resources || self.include_activities
    }
}

/// All content inputs of a prospective request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInputs {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub activities: Vec<ActivityRef>,
    #[serde(default)]
    pub bulk: BulkScan,
}

impl ContentInputs {
    /// True when no source of any kind was supplied.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map(str::trim).unwrap_or("").is_empty()
            && self.files.is_empty()
            && self.urls.is_empty()
            && self.activities.is_empty()
            && !self.bulk.is_enabled()
    }

    /// Flatten into the ordered source descriptors persisted on the request.
    pub fn to_sources(&self) -> Vec<ContentSource> {
        let mut sources = Vec::new();
        if let Some(text) = self.text.as_ref().filter(|t| !t.trim().is_empty()) {
            sources.push(ContentSource::ManualText { text: text.clone() });
        }
        sources.extend(self.files.iter().cloned().map(ContentSource::File));
        sources.extend(
            self.urls
                .iter()
                .map(|url| ContentSource::Url { url: url.clone() }),
        );
        sources.extend(self.activities.iter().cloned().map(ContentSource::Activity));
        if self.bulk.is_enabled() {
            sources.push(ContentSource::BulkScan(self.bulk));
        }
        sources
    }
}

/// Kind of content source, used to route extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ManualText,
    File,
    Url,
    Activity,
    BulkScan,
}

text_enum!(SourceKind {
    ManualText => "manual_text",
    File => "file",
    Url => "url",
    Activity => "activity",
    BulkScan => "bulk_scan",
});

/// One persisted content source descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSource {
    ManualText { text: String },
    File(FileRef),
    Url { url: String },
    Activity(ActivityRef),
    BulkScan(BulkScan),
}

impl ContentSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ContentSource::ManualText { .. } => SourceKind::ManualText,
            ContentSource::File(_) => SourceKind::File,
            ContentSource::Url { .. } => SourceKind::Url,
            ContentSource::Activity(_) => SourceKind::Activity,
            ContentSource::BulkScan(_) => SourceKind::BulkScan,
        }
    }

    /// Short human label used in topic section markers.
    pub fn label(&self) -> String {
        match self {
            ContentSource::ManualText { .. } => "Provided text".to_string(),
            ContentSource::File(f) => f.name.clone(),
            ContentSource::Url { url } => url.clone(),
            ContentSource::Activity(a) => a.name.clone(),
            ContentSource::BulkScan(_) => "Collection content".to_string(),
        }
    }
}

/// Difficulty level of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

text_enum!(Difficulty {
    Easy => "easy",
    Medium => "medium",
    Hard => "hard",
});

/// Cognitive (Bloom's taxonomy) level of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

text_enum!(CognitiveLevel {
    Remember => "remember",
    Understand => "understand",
    Apply => "apply",
    Analyze => "analyze",
    Evaluate => "evaluate",
    Create => "create",
});

/// User-chosen generation configuration for a request.
///
/// Counts and percentages are unsigned, so every distribution value is
/// non-negative by construction. Validation lives in [`crate::quota`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub total: u32,
    pub type_counts: BTreeMap<QuestionType, u32>,
    pub difficulty_distribution: BTreeMap<Difficulty, u32>,
    pub cognitive_distribution: BTreeMap<CognitiveLevel, u32>,
}

impl GenerationConfig {
    /// Configuration with default difficulty and cognitive distributions.
    pub fn new(total: u32, type_counts: BTreeMap<QuestionType, u32>) -> Self {
        Self {
            total,
            type_counts,
            difficulty_distribution: default_difficulty_distribution(),
            cognitive_distribution: default_cognitive_distribution(),
        }
    }

    /// Sum of all per-type counts.
    pub fn type_count_sum(&self) -> u32 {
        self.type_counts.values().sum()
    }

    pub fn with_difficulty(mut self, dist: BTreeMap<Difficulty, u32>) -> Self {
        self.difficulty_distribution = dist;
        self
    }

    pub fn with_cognitive(mut self, dist: BTreeMap<CognitiveLevel, u32>) -> Self {
        self.cognitive_distribution = dist;
        self
    }
}

/// Default difficulty distribution from [`crate::defaults`].
pub fn default_difficulty_distribution() -> BTreeMap<Difficulty, u32> {
    crate::defaults::DIFFICULTY_DISTRIBUTION
        .iter()
        .filter_map(|(name, pct)| name.parse().ok().map(|d| (d, *pct)))
        .collect()
}

/// Default cognitive-level distribution from [`crate::defaults`].
pub fn default_cognitive_distribution() -> BTreeMap<CognitiveLevel, u32> {
    crate::defaults::COGNITIVE_DISTRIBUTION
        .iter()
        .filter_map(|(name, pct)| name.parse().ok().map(|c| (c, *pct)))
        .collect()
}

/// One content-to-quiz job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    /// Host user that owns the request.
    pub owner_id: i64,
    /// Host collection (course) the request belongs to.
    pub collection_id: i64,
    pub status: RequestStatus,
    pub content_hash: String,
    pub content_sources: Vec<ContentSource>,
    pub configuration: Option<GenerationConfig>,
    /// Set only while `status = failed`.
    pub error: Option<String>,
    /// Completed request whose topics were cloned at intake.
    pub reused_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for inserting a new request.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub owner_id: i64,
    pub collection_id: i64,
    pub content_hash: String,
    pub content_sources: Vec<ContentSource>,
    pub reused_from: Option<Uuid>,
}

// =============================================================================
// TOPIC
// =============================================================================

/// A candidate subject area derived from analyzed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub request_id: Uuid,
    pub title: String,
    pub description: String,
    pub content_excerpt: String,
    pub learning_objectives: Vec<String>,
    /// Hierarchy level (1 = top-level section).
    pub level: i16,
    /// Display order within the request.
    pub sort_order: i32,
    pub selected: bool,
    pub quota: u32,
}

/// A topic ready to be inserted (no id yet).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTopic {
    pub title: String,
    pub description: String,
    pub content_excerpt: String,
    pub learning_objectives: Vec<String>,
    pub level: i16,
    pub selected: bool,
    pub quota: u32,
}

impl NewTopic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            level: 1,
            ..Default::default()
        }
    }
}

impl From<&Topic> for NewTopic {
    /// Deep copy used when cloning a topic set into a new request.
    fn from(topic: &Topic) -> Self {
        Self {
            title: topic.title.clone(),
            description: topic.description.clone(),
            content_excerpt: topic.content_excerpt.clone(),
            learning_objectives: topic.learning_objectives.clone(),
            level: topic.level,
            selected: false,
            quota: 0,
        }
    }
}

/// Topic as returned by the external analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedTopic {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_level")]
    pub level: i16,
    #[serde(default)]
    pub subtopics: Vec<AnalyzedTopic>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub content_excerpt: String,
}

fn default_level() -> i16 {
    1
}

// =============================================================================
// QUESTION
// =============================================================================

/// Review status of a generated question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Approved,
    Rejected,
    Deployed,
}

text_enum!(QuestionStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Deployed => "deployed",
});

/// One option/response of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub body: String,
    /// Fractional credit; > 0 means (partially) correct.
    pub weight: f64,
    pub feedback: String,
    pub sort_order: i32,
}

impl Answer {
    pub fn is_correct(&self) -> bool {
        self.weight > 0.0
    }
}

/// An answer produced by the generator, before persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub body: String,
    pub weight: f64,
    #[serde(default)]
    pub feedback: String,
}

impl AnswerDraft {
    pub fn new(body: impl Into<String>, weight: f64) -> Self {
        Self {
            body: body.into(),
            weight,
            feedback: String::new(),
        }
    }

    pub fn is_correct(&self) -> bool {
        self.weight > 0.0
    }
}

/// A question produced by the generator, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub cognitive_level: CognitiveLevel,
    pub body: String,
    #[serde(default)]
    pub general_feedback: String,
    #[serde(default)]
    pub ai_reasoning: String,
    #[serde(default)]
    pub answers: Vec<AnswerDraft>,
}

/// A question ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub request_id: Uuid,
    pub topic_id: Uuid,
    pub draft: QuestionDraft,
    pub quality_score: f32,
}

/// One generated assessment item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub request_id: Uuid,
    pub topic_id: Uuid,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub cognitive_level: CognitiveLevel,
    pub body: String,
    pub general_feedback: String,
    pub ai_reasoning: String,
    pub status: QuestionStatus,
    pub regeneration_count: u32,
    pub quality_score: f32,
    /// Destination store id once imported.
    pub store_question_id: Option<i64>,
    pub answers: Vec<Answer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    /// Answers in display order.
    pub fn sorted_answers(&self) -> Vec<&Answer> {
        let mut answers: Vec<&Answer> = self.answers.iter().collect();
        answers.sort_by_key(|a| a.sort_order);
        answers
    }

    /// Convert back into a draft (used as regeneration context).
    pub fn to_draft(&self) -> QuestionDraft {
        QuestionDraft {
            question_type: self.question_type,
            difficulty: self.difficulty,
            cognitive_level: self.cognitive_level,
            body: self.body.clone(),
            general_feedback: self.general_feedback.clone(),
            ai_reasoning: self.ai_reasoning.clone(),
            answers: self
                .sorted_answers()
                .into_iter()
                .map(|a| AnswerDraft {
                    body: a.body.clone(),
                    weight: a.weight,
                    feedback: a.feedback.clone(),
                })
                .collect(),
        }
    }
}

/// Filter for listing questions.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub status: Option<QuestionStatus>,
    pub topic_id: Option<Uuid>,
    pub question_type: Option<QuestionType>,
}

impl QuestionFilter {
    pub fn matches(&self, q: &Question) -> bool {
        self.status.map_or(true, |s| q.status == s)
            && self.topic_id.map_or(true, |t| q.topic_id == t)
            && self.question_type.map_or(true, |t| q.question_type == t)
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// The acting host user, supplied by the host session context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Whether this actor may act on an entity owned by `owner_id`.
    pub fn owns(&self, owner_id: i64) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_status_round_trip_text() {
        for status in RequestStatus::all() {
            let parsed: RequestStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        assert!("stuck".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_storage_text() {
        let json = serde_json::to_string(&RequestStatus::TopicsReady).unwrap();
        assert_eq!(json, "\"topics_ready\"");
    }

    #[test]
    fn test_content_inputs_empty() {
        assert!(ContentInputs::default().is_empty());
        let whitespace = ContentInputs {
            text: Some("   ".into()),
            ..Default::default()
        };
        assert!(whitespace.is_empty());

        let bulk = ContentInputs {
            bulk: BulkScan {
                whole_collection: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!bulk.is_empty());
    }

    #[test]
    fn test_to_sources_order() {
        let inputs = ContentInputs {
            text: Some("Photosynthesis".into()),
            files: vec![FileRef {
                name: "notes.pdf".into(),
                size: 10,
                reference: "f1".into(),
            }],
            urls: vec!["https://example.org".into()],
            activities: vec![ActivityRef {
                id: 7,
                kind: "page".into(),
                name: "Intro".into(),
            }],
            bulk: BulkScan::default(),
        };
        let kinds: Vec<SourceKind> = inputs.to_sources().iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::ManualText,
                SourceKind::File,
                SourceKind::Url,
                SourceKind::Activity
            ]
        );
    }

    #[test]
    fn test_content_source_serde_tagged() {
        let source = ContentSource::Url {
            url: "https://example.org".into(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["kind"], "url");
        let back: ContentSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_default_distributions() {
        let d = default_difficulty_distribution();
        assert_eq!(d[&Difficulty::Medium], 60);
        let c = default_cognitive_distribution();
        assert_eq!(c.len(), 6);
        assert_eq!(c[&CognitiveLevel::Create], 5);
    }

    #[test]
    fn test_new_topic_from_topic_resets_selection() {
        let topic = Topic {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            title: "Cell Biology".into(),
            description: "Cells".into(),
            content_excerpt: "All living things".into(),
            learning_objectives: vec!["Describe a cell".into()],
            level: 1,
            sort_order: 3,
            selected: true,
            quota: 4,
        };
        let copy = NewTopic::from(&topic);
        assert_eq!(copy.title, "Cell Biology");
        assert!(!copy.selected);
        assert_eq!(copy.quota, 0);
    }

    #[test]
    fn test_actor_ownership() {
        assert!(Actor::user(3).owns(3));
        assert!(!Actor::user(3).owns(4));
        assert!(Actor::admin(1).owns(4));
    }
}
