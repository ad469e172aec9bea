//! The orchestrator service and its builder.
//!
//! Operations are grouped by concern in sibling modules (`intake`, `topics`,
//! `generation`, `review`, `deployment`, `repair`, `admin`), each adding an
//! `impl Orchestrator` block. This module holds the shared plumbing: loading
//! owned entities, persisting lifecycle transitions and failing requests.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use quizgen_core::{
    AccessPolicy, Actor, AnalysisBackend, DestinationStore, Error, EventBus, GenerationBackend,
    GenerationRequest, OrchestratorEvent, Question, QuestionRepository, RequestRepository,
    RequestStatus, Result, TopicRepository,
};
use quizgen_db::Database;

use crate::access::AllowAllPolicy;
use crate::config::OrchestratorConfig;
use crate::extraction::ExtractionRegistry;

/// Generation request lifecycle orchestrator.
///
/// Cheap to clone; every collaborator is shared behind an `Arc`.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) requests: Arc<dyn RequestRepository>,
    pub(crate) topics: Arc<dyn TopicRepository>,
    pub(crate) questions: Arc<dyn QuestionRepository>,
    pub(crate) analysis: Arc<dyn AnalysisBackend>,
    pub(crate) generation: Arc<dyn GenerationBackend>,
    pub(crate) store: Arc<dyn DestinationStore>,
    pub(crate) access: Arc<dyn AccessPolicy>,
    pub(crate) extraction: Arc<ExtractionRegistry>,
    pub(crate) events: EventBus,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Event bus for following request progress.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Fail with `Forbidden` unless the host lets the actor manage the collection.
    pub(crate) async fn authorize_collection(&self, actor: &Actor, collection_id: i64) -> Result<()> {
        if self.access.can_manage_collection(actor, collection_id).await? {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "user {} cannot manage collection {}",
                actor.user_id, collection_id
            )))
        }
    }

    /// Load a request the actor owns. Foreign requests look absent.
    pub(crate) async fn load_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<GenerationRequest> {
        match self.requests.get(request_id).await? {
            Some(request) if actor.owns(request.owner_id) => Ok(request),
            _ => Err(Error::NotFound(format!("request {}", request_id))),
        }
    }

    /// Load a question and its owning request.
    pub(crate) async fn load_question(
        &self,
        actor: &Actor,
        question_id: Uuid,
    ) -> Result<(GenerationRequest, Question)> {
        let question = self
            .questions
            .get(question_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("question {}", question_id)))?;
        let request = self
            .load_request(actor, question.request_id)
            .await
            .map_err(|_| Error::NotFound(format!("question {}", question_id)))?;
        Ok((request, question))
    }

    /// Apply a transition in memory and persist it with compare-and-set.
    pub(crate) async fn advance(
        &self,
        actor: &Actor,
        request: &mut GenerationRequest,
        to: RequestStatus,
    ) -> Result<()> {
        let prior = request.transition(to, Utc::now())?;
        self.persist(actor, request, prior).await
    }

    /// Persist an already-applied transition from `prior`.
    pub(crate) async fn persist(
        &self,
        actor: &Actor,
        request: &GenerationRequest,
        prior: RequestStatus,
    ) -> Result<()> {
        self.requests.save_transition(request, prior).await?;
        info!(
            subsystem = "orchestrator",
            component = "lifecycle",
            request_id = %request.id,
            from = %prior,
            to = %request.status,
            "Request status changed"
        );
        self.events.emit(
            OrchestratorEvent::RequestStatusChanged {
                request_id: request.id,
                from: prior,
                to: request.status,
                error: request.error.clone(),
            },
            Some(actor.user_id),
        );
        Ok(())
    }

    /// Move a request to `failed` with the cause's message kept verbatim.
    ///
    /// Returns the `RequestFailed` error to surface to the caller.
    pub(crate) async fn fail_request(
        &self,
        actor: &Actor,
        request: &mut GenerationRequest,
        cause: Error,
    ) -> Error {
        let message = cause.failure_message();
        match request.fail(message.clone(), Utc::now()) {
            Ok(prior) => {
                if let Err(e) = self.persist(actor, request, prior).await {
                    error!(
                        subsystem = "orchestrator",
                        component = "lifecycle",
                        request_id = %request.id,
                        error = %e,
                        "Failed to record request failure"
                    );
                }
            }
            Err(e) => {
                error!(
                    subsystem = "orchestrator",
                    component = "lifecycle",
                    request_id = %request.id,
                    error = %e,
                    "Request could not be moved to failed"
                );
            }
        }
        Error::RequestFailed {
            request_id: request.id,
            message,
        }
    }
}

/// Builder for an [`Orchestrator`].
pub struct OrchestratorBuilder {
    requests: Option<Arc<dyn RequestRepository>>,
    topics: Option<Arc<dyn TopicRepository>>,
    questions: Option<Arc<dyn QuestionRepository>>,
    analysis: Option<Arc<dyn AnalysisBackend>>,
    generation: Option<Arc<dyn GenerationBackend>>,
    store: Option<Arc<dyn DestinationStore>>,
    access: Arc<dyn AccessPolicy>,
    extraction: Option<ExtractionRegistry>,
    events: Option<EventBus>,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            requests: None,
            topics: None,
            questions: None,
            analysis: None,
            generation: None,
            store: None,
            access: Arc::new(AllowAllPolicy),
            extraction: None,
            events: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Use one implementation for all three repositories.
    pub fn with_repository<R>(mut self, repo: Arc<R>) -> Self
    where
        R: RequestRepository + TopicRepository + QuestionRepository + 'static,
    {
        self.requests = Some(repo.clone());
        self.topics = Some(repo.clone());
        self.questions = Some(repo);
        self
    }

    /// Use the PostgreSQL repositories and question bank.
    pub fn with_database(mut self, db: &Database) -> Self {
        self.requests = Some(Arc::new(db.requests.clone()));
        self.topics = Some(Arc::new(db.topics.clone()));
        self.questions = Some(Arc::new(db.questions.clone()));
        self.store = Some(Arc::new(db.bank.clone()));
        self
    }

    pub fn with_requests(mut self, repo: Arc<dyn RequestRepository>) -> Self {
        self.requests = Some(repo);
        self
    }

    pub fn with_topics(mut self, repo: Arc<dyn TopicRepository>) -> Self {
        self.topics = Some(repo);
        self
    }

    pub fn with_questions(mut self, repo: Arc<dyn QuestionRepository>) -> Self {
        self.questions = Some(repo);
        self
    }

    /// Use one backend for both analysis and generation.
    pub fn with_ai<B>(mut self, backend: Arc<B>) -> Self
    where
        B: AnalysisBackend + GenerationBackend + 'static,
    {
        self.analysis = Some(backend.clone());
        self.generation = Some(backend);
        self
    }

    pub fn with_analysis(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.analysis = Some(backend);
        self
    }

    pub fn with_generation(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.generation = Some(backend);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DestinationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access = policy;
        self
    }

    /// Set the extraction registry. Defaults to the built-in extractors.
    pub fn with_extraction_registry(mut self, registry: ExtractionRegistry) -> Self {
        self.extraction = Some(registry);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator. Fails with `Error::Config` naming a missing collaborator.
    pub fn build(self) -> Result<Orchestrator> {
        fn required<T>(value: Option<T>, name: &str) -> Result<T> {
            value.ok_or_else(|| Error::Config(format!("orchestrator requires {}", name)))
        }

        let extraction = match self.extraction {
            Some(registry) => registry,
            None => ExtractionRegistry::with_builtin()?,
        };

        Ok(Orchestrator {
            requests: required(self.requests, "a request repository")?,
            topics: required(self.topics, "a topic repository")?,
            questions: required(self.questions, "a question repository")?,
            analysis: required(self.analysis, "an analysis backend")?,
            generation: required(self.generation, "a generation backend")?,
            store: required(self.store, "a destination store")?,
            access: self.access,
            extraction: Arc::new(extraction),
            events: self
                .events
                .unwrap_or_else(|| EventBus::new(quizgen_core::defaults::EVENT_BUS_CAPACITY)),
            config: self.config,
        })
    }
}
