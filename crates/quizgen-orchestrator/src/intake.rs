//! Request intake: fingerprinting, dedup reuse and topic analysis.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quizgen_core::topics::{flatten, normalize};
use quizgen_core::{
    fingerprint, Actor, ContentInputs, CreateRequest, DedupKey, Error, ExtractionContext,
    GenerationRequest, NewTopic, OrchestratorEvent, RequestStatus, Result,
};

use crate::extraction::combine_sections;
use crate::Orchestrator;

impl Orchestrator {
    /// Create a request from content inputs.
    ///
    /// Identical content submitted by the same owner to the same collection
    /// within the dedup window reuses the earlier request's topics (deep copy)
    /// and skips analysis. Otherwise the content is analyzed inline.
    pub async fn create_request(
        &self,
        actor: &Actor,
        collection_id: i64,
        inputs: ContentInputs,
    ) -> Result<GenerationRequest> {
        if inputs.is_empty() {
            return Err(Error::Validation(
                "at least one content source is required".to_string(),
            ));
        }
        self.authorize_collection(actor, collection_id).await?;

        let content_hash = fingerprint(&inputs);
        let key = DedupKey::new(
            actor.user_id,
            collection_id,
            content_hash.clone(),
            Utc::now(),
            self.config.dedup_window_days,
        );

        if let Some(prior) = self.requests.find_reusable(&key).await? {
            return self.clone_request(actor, &prior, inputs).await;
        }
        debug!(
            subsystem = "orchestrator",
            component = "intake",
            content_hash = %content_hash,
            "No reusable request, analyzing"
        );

        let request = self
            .requests
            .insert(CreateRequest {
                owner_id: actor.user_id,
                collection_id,
                content_hash,
                content_sources: inputs.to_sources(),
                reused_from: None,
            })
            .await?;
        info!(
            subsystem = "orchestrator",
            component = "intake",
            request_id = %request.id,
            collection_id,
            "Request created"
        );
        self.analyze_request(actor, request.id).await
    }

    /// New request whose topics are copied from `prior` with fresh ids.
    async fn clone_request(
        &self,
        actor: &Actor,
        prior: &GenerationRequest,
        inputs: ContentInputs,
    ) -> Result<GenerationRequest> {
        let mut request = self
            .requests
            .insert(CreateRequest {
                owner_id: actor.user_id,
                collection_id: prior.collection_id,
                content_hash: prior.content_hash.clone(),
                content_sources: inputs.to_sources(),
                reused_from: Some(prior.id),
            })
            .await?;
        self.advance(actor, &mut request, RequestStatus::Analyzing).await?;

        let inserted = match self.copy_topics(prior.id, request.id).await {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(
                    subsystem = "orchestrator",
                    component = "intake",
                    request_id = %request.id,
                    reused_from = %prior.id,
                    error = %e,
                    "Topic reuse failed"
                );
                return Err(self.fail_request(actor, &mut request, e).await);
            }
        };
        self.advance(actor, &mut request, RequestStatus::TopicsReady).await?;

        info!(
            subsystem = "orchestrator",
            component = "intake",
            request_id = %request.id,
            reused_from = %prior.id,
            result_count = inserted,
            "Reused topics from earlier request"
        );
        self.events.emit(
            OrchestratorEvent::TopicsReady {
                request_id: request.id,
                topic_count: inserted,
                reused_from: Some(prior.id),
            },
            Some(actor.user_id),
        );
        Ok(request)
    }

    async fn copy_topics(&self, from: Uuid, to: Uuid) -> Result<usize> {
        let copies: Vec<NewTopic> = self
            .topics
            .list(from)
            .await?
            .iter()
            .map(NewTopic::from)
            .collect();
        Ok(self.topics.insert_many(to, copies).await?.len())
    }

    /// Extract and analyze a `pending` request's content into topics.
    ///
    /// Any extraction or analysis failure moves the request to `failed` and
    /// returns `Error::RequestFailed` carrying the upstream message.
    pub async fn analyze_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<GenerationRequest> {
        let mut request = self.load_request(actor, request_id).await?;
        self.advance(actor, &mut request, RequestStatus::Analyzing).await?;

        let start = Instant::now();
        match self.analyze_content(&request).await {
            Ok(topics) => {
                let inserted = self.topics.insert_many(request.id, topics).await;
                let inserted = match inserted {
                    Ok(inserted) => inserted,
                    Err(e) => return Err(self.fail_request(actor, &mut request, e).await),
                };
                self.advance(actor, &mut request, RequestStatus::TopicsReady)
                    .await?;
                info!(
                    subsystem = "orchestrator",
                    component = "intake",
                    request_id = %request.id,
                    result_count = inserted.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Topics ready"
                );
                self.events.emit(
                    OrchestratorEvent::TopicsReady {
                        request_id: request.id,
                        topic_count: inserted.len(),
                        reused_from: None,
                    },
                    Some(actor.user_id),
                );
                Ok(request)
            }
            Err(e) => {
                warn!(
                    subsystem = "orchestrator",
                    component = "intake",
                    request_id = %request.id,
                    error = %e,
                    "Analysis failed"
                );
                Err(self.fail_request(actor, &mut request, e).await)
            }
        }
    }

    async fn analyze_content(&self, request: &GenerationRequest) -> Result<Vec<NewTopic>> {
        let ctx = ExtractionContext {
            owner_id: request.owner_id,
            collection_id: request.collection_id,
        };
        let sections = self
            .extraction
            .extract_all(&request.content_sources, &ctx)
            .await?;
        let content = combine_sections(&sections, self.config.max_analysis_chars);
        if content.trim().is_empty() {
            return Err(Error::Validation(
                "no readable text was extracted from the content sources".to_string(),
            ));
        }

        let analyzed = self.analysis.analyze(&content).await?;
        let topics = normalize(flatten(analyzed));
        if topics.is_empty() {
            return Err(Error::Upstream(
                "topic analysis returned no usable topics".to_string(),
            ));
        }
        Ok(topics)
    }
}
