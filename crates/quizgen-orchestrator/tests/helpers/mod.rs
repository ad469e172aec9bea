//! Shared setup for orchestrator integration tests.
//!
//! Everything runs against the in-memory repositories, the in-memory question
//! bank and the deterministic mock backend.

#![allow(dead_code)]

use std::sync::Arc;

use quizgen_db::{MemoryQuestionBank, MemoryRepository};
use quizgen_inference::MockGenerationBackend;
use quizgen_orchestrator::{
    Actor, ContentInputs, GenerationConfig, GenerationControl, GenerationReport,
    GenerationRequest, Orchestrator, OrchestratorConfig, Question, QuestionFilter, QuestionType,
    Topic,
};
use uuid::Uuid;

pub const COLLECTION: i64 = 42;

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub repo: Arc<MemoryRepository>,
    pub bank: Arc<MemoryQuestionBank>,
    pub ai: MockGenerationBackend,
}

pub fn harness(ai: MockGenerationBackend) -> Harness {
    harness_with_config(ai, OrchestratorConfig::default())
}

pub fn harness_with_config(ai: MockGenerationBackend, config: OrchestratorConfig) -> Harness {
    let repo = Arc::new(MemoryRepository::new());
    let bank = Arc::new(MemoryQuestionBank::new());
    let orchestrator = Orchestrator::builder()
        .with_repository(repo.clone())
        .with_ai(Arc::new(ai.clone()))
        .with_store(bank.clone())
        .with_config(config)
        .build()
        .expect("build orchestrator");
    Harness {
        orchestrator,
        repo,
        bank,
        ai,
    }
}

pub fn text_inputs(text: &str) -> ContentInputs {
    ContentInputs {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

pub fn config(total: u32, counts: &[(QuestionType, u32)]) -> GenerationConfig {
    GenerationConfig::new(total, counts.iter().copied().collect())
}

pub fn ids(topics: &[Topic]) -> Vec<Uuid> {
    topics.iter().map(|t| t.id).collect()
}

/// Create a request from text and return it with its analyzed topics.
pub async fn topics_ready(
    h: &Harness,
    actor: &Actor,
    text: &str,
) -> (GenerationRequest, Vec<Topic>) {
    let request = h
        .orchestrator
        .create_request(actor, COLLECTION, text_inputs(text))
        .await
        .expect("create request");
    let topics = h
        .orchestrator
        .list_topics(actor, request.id)
        .await
        .expect("list topics");
    (request, topics)
}

/// Create, configure over every topic, and generate.
pub async fn generated(
    h: &Harness,
    actor: &Actor,
    text: &str,
    config: GenerationConfig,
) -> (GenerationRequest, GenerationReport) {
    let (request, topics) = topics_ready(h, actor, text).await;
    let report = h
        .orchestrator
        .configure_and_generate(
            actor,
            request.id,
            config,
            &ids(&topics),
            &GenerationControl::new(),
        )
        .await
        .expect("generate");
    (request, report)
}

pub async fn questions(h: &Harness, actor: &Actor, request_id: Uuid) -> Vec<Question> {
    h.orchestrator
        .list_questions(actor, request_id, &QuestionFilter::default())
        .await
        .expect("list questions")
}
