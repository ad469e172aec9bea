//! Configuration and inline question generation.
//!
//! Generation walks the plan slot by slot (one generator call per topic and
//! type). A failed slot is recorded and its siblings continue; the request
//! fails only when every slot failed, when cancelled, or when the time budget
//! runs out. Questions persisted before a stop are kept.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quizgen_core::{
    allocate, plan_generation, score_draft, validate_config, Actor, AnswerDraft, ConfigWarning,
    Error, GenerationCall, GenerationConfig, GenerationPlan, GenerationRequest, NewQuestion,
    OrchestratorEvent, QuestionCapabilities, QuestionDraft, QuestionType, RequestStatus, Result,
    Topic,
};

use crate::topics::resolve_selection;
use crate::Orchestrator;

/// Cooperative cancellation flag checked between generation slots.
#[derive(Debug, Clone, Default)]
pub struct GenerationControl {
    cancelled: Arc<AtomicBool>,
}

impl GenerationControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop before the next slot. Already persisted questions are kept.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of configuring a request.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigureOutcome {
    pub request: GenerationRequest,
    pub topics: Vec<Topic>,
    pub plan: GenerationPlan,
    pub warnings: Vec<ConfigWarning>,
}

/// A generator call that failed; its siblings still ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotFailure {
    pub topic_id: Uuid,
    pub question_type: QuestionType,
    pub message: String,
}

/// A returned draft that was not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardedDraft {
    pub topic_id: Uuid,
    pub question_type: QuestionType,
    pub reason: String,
}

/// Outcome of a completed generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub request: GenerationRequest,
    pub generated: usize,
    pub failed_slots: Vec<SlotFailure>,
    pub discarded: Vec<DiscardedDraft>,
    pub warnings: Vec<ConfigWarning>,
    pub duration_ms: i64,
}

#[derive(Default)]
struct GenerationRun {
    slot_count: usize,
    generated: usize,
    failed_slots: Vec<SlotFailure>,
    discarded: Vec<DiscardedDraft>,
    stopped: Option<String>,
}

impl Orchestrator {
    /// Select topics, spread the total over them and store the configuration.
    ///
    /// Hard configuration violations return `Error::Validation` and leave the
    /// request untouched.
    pub async fn configure(
        &self,
        actor: &Actor,
        request_id: Uuid,
        config: GenerationConfig,
        selected: &[Uuid],
    ) -> Result<ConfigureOutcome> {
        let mut request = self.editable_request(actor, request_id).await?;
        let warnings = validate_config(&config, self.config.max_questions_per_request)?;
        for warning in &warnings {
            warn!(
                subsystem = "orchestrator",
                component = "generation",
                request_id = %request.id,
                field = %warning.field,
                "{}",
                warning.message
            );
        }

        let topics = self.topics.list(request.id).await?;
        let chosen: HashSet<Uuid> = resolve_selection(&topics, selected)?.into_iter().collect();
        // Display order, not selection order, decides who gets the remainder.
        let ordered: Vec<Uuid> = topics
            .iter()
            .filter(|t| chosen.contains(&t.id))
            .map(|t| t.id)
            .collect();
        let quotas = allocate(config.total, ordered.len())?;
        let pairs: Vec<(Uuid, u32)> = ordered.iter().copied().zip(quotas).collect();

        self.topics.set_selection(request.id, &ordered).await?;
        self.topics.set_quotas(request.id, &pairs).await?;
        let topics = self.topics.list(request.id).await?;
        let plan = plan_generation(&topics, &config)?;

        request.configuration = Some(config);
        self.advance(actor, &mut request, RequestStatus::Configured)
            .await?;
        info!(
            subsystem = "orchestrator",
            component = "generation",
            request_id = %request.id,
            topic_count = ordered.len(),
            total = plan.total(),
            "Request configured"
        );

        Ok(ConfigureOutcome {
            request,
            topics,
            plan,
            warnings,
        })
    }

    /// Generate every planned question for a `configured` request.
    pub async fn generate(
        &self,
        actor: &Actor,
        request_id: Uuid,
        control: &GenerationControl,
    ) -> Result<GenerationReport> {
        let mut request = self.load_request(actor, request_id).await?;
        if request.status != RequestStatus::Configured {
            return Err(Error::Conflict(format!(
                "request {} cannot generate while it is {}",
                request.id, request.status
            )));
        }
        let (prior, warnings) = request
            .start_generating(self.config.max_questions_per_request, chrono::Utc::now())?;
        self.persist(actor, &request, prior).await?;

        let start = Instant::now();
        let run = match self.run_generation(&request, control, start).await {
            Ok(run) => run,
            Err(e) => {
                warn!(
                    subsystem = "orchestrator",
                    component = "generation",
                    request_id = %request.id,
                    error = %e,
                    "Generation aborted"
                );
                return Err(self.fail_request(actor, &mut request, e).await);
            }
        };
        let duration_ms = start.elapsed().as_millis() as i64;

        self.events.emit(
            OrchestratorEvent::GenerationFinished {
                request_id: request.id,
                generated: run.generated,
                failed_slots: run.failed_slots.len(),
                duration_ms,
            },
            Some(actor.user_id),
        );

        if let Some(reason) = run.stopped {
            return Err(self
                .fail_request(actor, &mut request, Error::Upstream(reason))
                .await);
        }
        if run.slot_count > 0 && run.failed_slots.len() == run.slot_count {
            let message = run
                .failed_slots
                .last()
                .map(|f| f.message.clone())
                .unwrap_or_default();
            return Err(self
                .fail_request(actor, &mut request, Error::Upstream(message))
                .await);
        }

        self.advance(actor, &mut request, RequestStatus::Completed)
            .await?;
        info!(
            subsystem = "orchestrator",
            component = "generation",
            request_id = %request.id,
            result_count = run.generated,
            failed_slots = run.failed_slots.len(),
            discarded = run.discarded.len(),
            duration_ms,
            "Generation completed"
        );

        Ok(GenerationReport {
            request,
            generated: run.generated,
            failed_slots: run.failed_slots,
            discarded: run.discarded,
            warnings,
            duration_ms,
        })
    }

    /// [`configure`](Self::configure) followed by [`generate`](Self::generate).
    pub async fn configure_and_generate(
        &self,
        actor: &Actor,
        request_id: Uuid,
        config: GenerationConfig,
        selected: &[Uuid],
        control: &GenerationControl,
    ) -> Result<GenerationReport> {
        let outcome = self.configure(actor, request_id, config, selected).await?;
        let mut report = self.generate(actor, request_id, control).await?;
        if report.warnings.is_empty() {
            report.warnings = outcome.warnings;
        }
        Ok(report)
    }

    async fn run_generation(
        &self,
        request: &GenerationRequest,
        control: &GenerationControl,
        start: Instant,
    ) -> Result<GenerationRun> {
        let config = request.configuration.as_ref().ok_or_else(|| {
            Error::Validation("request has no generation configuration".to_string())
        })?;
        let topics = self.topics.list(request.id).await?;
        let plan = plan_generation(&topics, config)?;
        let slots = plan.slots();
        let budget = self.config.generation_budget(config.total);

        let mut run = GenerationRun {
            slot_count: slots.len(),
            ..Default::default()
        };
        let mut recent: VecDeque<String> = VecDeque::new();

        for slot in slots {
            if control.is_cancelled() {
                run.stopped = Some("generation was cancelled".to_string());
                break;
            }
            if start.elapsed() >= budget {
                run.stopped = Some(format!(
                    "generation exceeded its time budget of {}s",
                    budget.as_secs()
                ));
                break;
            }
            let Some(topic) = topics.iter().find(|t| t.id == slot.topic_id) else {
                continue;
            };

            let call = GenerationCall {
                topic_title: topic.title.clone(),
                topic_content: topic_content(topic, self.config.max_topic_content_chars),
                question_type: slot.question_type,
                count: slot.count,
                difficulty_distribution: config.difficulty_distribution.clone(),
                cognitive_distribution: config.cognitive_distribution.clone(),
                avoid: recent.iter().cloned().collect(),
            };
            let drafts = match self.generation.generate(&call).await {
                Ok(drafts) => drafts,
                Err(e) => {
                    warn!(
                        subsystem = "orchestrator",
                        component = "generation",
                        request_id = %request.id,
                        topic_id = %topic.id,
                        question_type = %slot.question_type,
                        error = %e,
                        "Generation slot failed"
                    );
                    run.failed_slots.push(SlotFailure {
                        topic_id: topic.id,
                        question_type: slot.question_type,
                        message: e.failure_message(),
                    });
                    continue;
                }
            };

            let mut batch = Vec::with_capacity(drafts.len());
            for draft in drafts.into_iter().take(slot.count as usize) {
                let draft = self.complete_draft(draft).await;
                if let Err(reason) = check_draft(&draft, slot.question_type) {
                    debug!(
                        subsystem = "orchestrator",
                        component = "generation",
                        request_id = %request.id,
                        topic_id = %topic.id,
                        reason = %reason,
                        "Draft discarded"
                    );
                    run.discarded.push(DiscardedDraft {
                        topic_id: topic.id,
                        question_type: slot.question_type,
                        reason,
                    });
                    continue;
                }
                remember(
                    &mut recent,
                    draft.body.clone(),
                    self.config.avoid_context_questions,
                );
                let quality_score = score_draft(&draft);
                batch.push(NewQuestion {
                    request_id: request.id,
                    topic_id: topic.id,
                    draft,
                    quality_score,
                });
            }
            if !batch.is_empty() {
                let inserted = self.questions.insert_many(batch).await?;
                run.generated += inserted.len();
            }
        }
        Ok(run)
    }

    /// Top up options with generated distractors and fill missing essay keys.
    ///
    /// Failures here are logged and the draft is kept as returned.
    pub(crate) async fn complete_draft(&self, mut draft: QuestionDraft) -> QuestionDraft {
        let target = self.config.distractor_target;
        if draft.question_type.needs_distractors() && draft.answers.len() < target {
            let correct = draft
                .answers
                .iter()
                .find(|a| a.is_correct())
                .map(|a| a.body.clone());
            if let Some(correct) = correct {
                let wanted = target - draft.answers.len();
                match self
                    .generation
                    .generate_distractors(&draft.body, &correct, draft.difficulty, wanted)
                    .await
                {
                    Ok(extra) => {
                        for text in extra {
                            if draft.answers.len() >= target {
                                break;
                            }
                            let text = text.trim();
                            if text.is_empty()
                                || draft
                                    .answers
                                    .iter()
                                    .any(|a| a.body.trim().eq_ignore_ascii_case(text))
                            {
                                continue;
                            }
                            draft.answers.push(AnswerDraft::new(text, 0.0));
                        }
                    }
                    Err(e) => warn!(
                        subsystem = "orchestrator",
                        component = "generation",
                        error = %e,
                        "Distractor generation failed"
                    ),
                }
            }
        }

        if draft.question_type == QuestionType::Essay && draft.general_feedback.trim().is_empty() {
            match self.generation.generate_answer_key(&draft.body).await {
                Ok(key) => draft.general_feedback = key,
                Err(e) => warn!(
                    subsystem = "orchestrator",
                    component = "generation",
                    error = %e,
                    "Answer key generation failed"
                ),
            }
        }
        draft
    }
}

/// Reason a draft cannot be stored, if any.
pub(crate) fn check_draft(
    draft: &QuestionDraft,
    expected: QuestionType,
) -> std::result::Result<(), String> {
    if draft.question_type != expected {
        return Err(format!(
            "expected a {} question, got {}",
            expected, draft.question_type
        ));
    }
    if draft.body.trim().is_empty() {
        return Err("question text is empty".to_string());
    }
    draft
        .question_type
        .validate_answer_shape(&draft.answers)
        .map_err(|e| e.failure_message())
}

/// Topic material sent with each generator call.
pub(crate) fn topic_content(topic: &Topic, max_chars: usize) -> String {
    let mut parts = Vec::new();
    if !topic.description.trim().is_empty() {
        parts.push(topic.description.trim().to_string());
    }
    if !topic.content_excerpt.trim().is_empty() {
        parts.push(topic.content_excerpt.trim().to_string());
    }
    if !topic.learning_objectives.is_empty() {
        let objectives: Vec<String> = topic
            .learning_objectives
            .iter()
            .map(|o| format!("- {}", o))
            .collect();
        parts.push(format!("Learning objectives:\n{}", objectives.join("\n")));
    }
    truncate_chars(&parts.join("\n\n"), max_chars)
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn remember(recent: &mut VecDeque<String>, body: String, limit: usize) {
    if limit == 0 {
        return;
    }
    recent.push_back(body);
    while recent.len() > limit {
        recent.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Topic {
        Topic {
            id: Uuid::nil(),
            request_id: Uuid::nil(),
            title: "Cells".into(),
            description: "Basic unit of life".into(),
            content_excerpt: "Cells contain organelles.".into(),
            learning_objectives: vec!["Name three organelles".into()],
            level: 1,
            sort_order: 0,
            selected: true,
            quota: 3,
        }
    }

    #[test]
    fn test_topic_content_layout() {
        let content = topic_content(&topic(), 10_000);
        assert_eq!(
            content,
            "Basic unit of life\n\nCells contain organelles.\n\nLearning objectives:\n- Name three organelles"
        );
        assert_eq!(topic_content(&topic(), 5), "Basic");
    }

    #[test]
    fn test_remember_keeps_last_n() {
        let mut recent = VecDeque::new();
        for i in 0..5 {
            remember(&mut recent, format!("q{}", i), 3);
        }
        assert_eq!(recent, vec!["q2", "q3", "q4"]);
        remember(&mut recent, "ignored".into(), 0);
        assert_eq!(recent.len(), 3);
    }

    #[test]
    fn test_check_draft() {
        let draft = QuestionDraft {
            question_type: QuestionType::TrueFalse,
            difficulty: quizgen_core::Difficulty::Easy,
            cognitive_level: quizgen_core::CognitiveLevel::Remember,
            body: "Cells divide.".into(),
            general_feedback: String::new(),
            ai_reasoning: String::new(),
            answers: vec![AnswerDraft::new("True", 1.0), AnswerDraft::new("False", 0.0)],
        };
        assert!(check_draft(&draft, QuestionType::TrueFalse).is_ok());
        assert!(check_draft(&draft, QuestionType::Essay).is_err());

        let mut blank = draft.clone();
        blank.body = "  ".into();
        assert_eq!(
            check_draft(&blank, QuestionType::TrueFalse).unwrap_err(),
            "question text is empty"
        );
    }

    #[test]
    fn test_control_cancel_is_shared() {
        let control = GenerationControl::new();
        let clone = control.clone();
        clone.cancel();
        assert!(control.is_cancelled());
    }
}
