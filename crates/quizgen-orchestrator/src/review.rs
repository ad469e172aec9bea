//! Question review: approve, reject, delete, regenerate and reorder.
//!
//! Bulk actions resolve every id with one batched lookup and change them with
//! one batched write. They are all-or-nothing: an unknown, foreign or
//! deployed id aborts the action before anything is written.

use std::collections::HashSet;

use tracing::{info, warn};
use uuid::Uuid;

use quizgen_core::defaults::MAX_OLD_QUESTION_CHARS;
use quizgen_core::{
    score_draft, Actor, Error, OrchestratorEvent, Question, QuestionFilter, QuestionStatus,
    RegenerationCall, Result,
};

use crate::generation::{check_draft, topic_content, truncate_chars};
use crate::Orchestrator;

/// Statuses a reviewer may move between.
const REVIEWABLE: [QuestionStatus; 3] = [
    QuestionStatus::Pending,
    QuestionStatus::Approved,
    QuestionStatus::Rejected,
];

impl Orchestrator {
    /// Questions of a request matching `filter`, oldest first.
    pub async fn list_questions(
        &self,
        actor: &Actor,
        request_id: Uuid,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>> {
        let request = self.load_request(actor, request_id).await?;
        self.questions.list(request.id, filter).await
    }

    pub async fn get_question(&self, actor: &Actor, question_id: Uuid) -> Result<Question> {
        let (_, question) = self.load_question(actor, question_id).await?;
        Ok(question)
    }

    /// Approve one question. Approving an approved question is a no-op.
    pub async fn approve(&self, actor: &Actor, question_id: Uuid) -> Result<Question> {
        self.review_one(actor, question_id, QuestionStatus::Approved, "approve")
            .await
    }

    /// Reject one question. Rejecting a rejected question is a no-op.
    pub async fn reject(&self, actor: &Actor, question_id: Uuid) -> Result<Question> {
        self.review_one(actor, question_id, QuestionStatus::Rejected, "reject")
            .await
    }

    pub async fn bulk_approve(
        &self,
        actor: &Actor,
        request_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<u64> {
        let ids = self.resolve_batch(actor, request_id, question_ids).await?;
        let changed = self
            .questions
            .set_status(&ids, QuestionStatus::Approved, &REVIEWABLE)
            .await?;
        self.reviewed(actor, request_id, "bulk_approve", changed);
        Ok(changed)
    }

    pub async fn bulk_reject(
        &self,
        actor: &Actor,
        request_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<u64> {
        let ids = self.resolve_batch(actor, request_id, question_ids).await?;
        let changed = self
            .questions
            .set_status(&ids, QuestionStatus::Rejected, &REVIEWABLE)
            .await?;
        self.reviewed(actor, request_id, "bulk_reject", changed);
        Ok(changed)
    }

    /// Delete questions and their answers.
    pub async fn bulk_delete(
        &self,
        actor: &Actor,
        request_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<u64> {
        let ids = self.resolve_batch(actor, request_id, question_ids).await?;
        let deleted = self.questions.delete_many(&ids).await?;
        self.reviewed(actor, request_id, "bulk_delete", deleted);
        Ok(deleted)
    }

    /// Replace a question with a freshly generated one of the same type.
    ///
    /// The ceiling is checked before the generator is called; a question at
    /// the limit returns `RegenerationLimitExceeded` untouched. Generator
    /// failures are returned as-is and leave the question and request alone.
    pub async fn regenerate(&self, actor: &Actor, question_id: Uuid) -> Result<Question> {
        let (request, question) = self.load_question(actor, question_id).await?;
        if question.status == QuestionStatus::Deployed {
            return Err(already_deployed(question.id));
        }
        let max = self.config.max_regenerations;
        if question.regeneration_count >= max {
            return Err(Error::RegenerationLimitExceeded {
                question_id: question.id,
                count: question.regeneration_count,
                max,
            });
        }

        let topics = self.topics.list(request.id).await?;
        let topic = topics
            .iter()
            .find(|t| t.id == question.topic_id)
            .ok_or_else(|| Error::NotFound(format!("topic {}", question.topic_id)))?;

        let mut previous = question.to_draft();
        previous.body = truncate_chars(&previous.body, MAX_OLD_QUESTION_CHARS);
        let call = RegenerationCall {
            topic_title: topic.title.clone(),
            topic_content: topic_content(topic, self.config.max_topic_content_chars),
            previous,
        };
        let draft = match self.generation.regenerate(&call).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(
                    subsystem = "orchestrator",
                    component = "review",
                    question_id = %question.id,
                    error = %e,
                    "Regeneration failed"
                );
                return Err(e);
            }
        };

        let draft = self.complete_draft(draft).await;
        check_draft(&draft, question.question_type).map_err(|reason| {
            Error::Upstream(format!("regenerated question is invalid: {}", reason))
        })?;
        let score = score_draft(&draft);
        let updated = self
            .questions
            .replace_draft(question.id, &draft, score, max)
            .await?;

        info!(
            subsystem = "orchestrator",
            component = "review",
            request_id = %request.id,
            question_id = %updated.id,
            regeneration_count = updated.regeneration_count,
            "Question regenerated"
        );
        self.events.emit(
            OrchestratorEvent::QuestionRegenerated {
                request_id: request.id,
                question_id: updated.id,
                regeneration_count: updated.regeneration_count,
            },
            Some(actor.user_id),
        );
        Ok(updated)
    }

    /// Rewrite answer display order. `order` lists every answer id once.
    pub async fn reorder_answers(
        &self,
        actor: &Actor,
        question_id: Uuid,
        order: &[Uuid],
    ) -> Result<Question> {
        let (_, question) = self.load_question(actor, question_id).await?;
        if question.status == QuestionStatus::Deployed {
            return Err(already_deployed(question.id));
        }
        self.questions.reorder_answers(question.id, order).await?;
        self.questions
            .get(question.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("question {}", question.id)))
    }

    async fn review_one(
        &self,
        actor: &Actor,
        question_id: Uuid,
        to: QuestionStatus,
        action: &str,
    ) -> Result<Question> {
        let (request, question) = self.load_question(actor, question_id).await?;
        if question.status == QuestionStatus::Deployed {
            return Err(already_deployed(question.id));
        }
        let changed = self
            .questions
            .set_status(&[question.id], to, &REVIEWABLE)
            .await?;
        if changed == 0 {
            // Deployed between the read and the write.
            return Err(already_deployed(question.id));
        }
        self.reviewed(actor, request.id, action, changed);
        self.questions
            .get(question.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("question {}", question.id)))
    }

    /// Deduplicate `ids` and check them all with one lookup.
    async fn resolve_batch(
        &self,
        actor: &Actor,
        request_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<Vec<Uuid>> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = question_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() {
            return Err(Error::Validation(
                "at least one question must be given".to_string(),
            ));
        }
        let request = self.load_request(actor, request_id).await?;

        let found = self.questions.get_many(&ids).await?;
        let in_request: HashSet<Uuid> = found
            .iter()
            .filter(|q| q.request_id == request.id)
            .map(|q| q.id)
            .collect();
        if let Some(missing) = ids.iter().find(|id| !in_request.contains(id)) {
            return Err(Error::NotFound(format!("question {}", missing)));
        }
        if let Some(deployed) = found
            .iter()
            .find(|q| q.request_id == request.id && q.status == QuestionStatus::Deployed)
        {
            return Err(already_deployed(deployed.id));
        }
        Ok(ids)
    }

    fn reviewed(&self, actor: &Actor, request_id: Uuid, action: &str, count: u64) {
        info!(
            subsystem = "orchestrator",
            component = "review",
            request_id = %request_id,
            op = action,
            result_count = count,
            "Questions reviewed"
        );
        self.events.emit(
            OrchestratorEvent::QuestionsReviewed {
                request_id,
                action: action.to_string(),
                count,
            },
            Some(actor.user_id),
        );
    }
}

fn already_deployed(question_id: Uuid) -> Error {
    Error::Conflict(format!("question {} is already deployed", question_id))
}
