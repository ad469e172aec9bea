//! Deployment of approved questions into the destination question bank.
//!
//! Store ids are recorded as soon as the import returns, so a retry after a
//! partial failure never imports the same question twice. A question becomes
//! `deployed` only once it is placed: imported for category deployments,
//! attached for quiz deployments.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use quizgen_core::{
    Actor, Error, FailedItem, OrchestratorEvent, PartialFailure, Question, QuestionFilter,
    QuestionStatus, Result, StoreQuestion,
};

use crate::Orchestrator;

/// Where approved questions go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeploymentTarget {
    /// Import into a bank category of the request's collection.
    Category { name: String },
    /// Import into `category`, then attach to a newly created quiz.
    NewQuiz { name: String, category: String },
    /// Import into `category`, then attach to an existing quiz. Used to
    /// resume a quiz deployment that partially failed.
    ExistingQuiz { quiz_id: i64, category: String },
}

impl DeploymentTarget {
    fn category(&self) -> &str {
        match self {
            DeploymentTarget::Category { name } => name,
            DeploymentTarget::NewQuiz { category, .. }
            | DeploymentTarget::ExistingQuiz { category, .. } => category,
        }
    }
}

/// Outcome of a fully successful deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentReport {
    pub request_id: Uuid,
    pub category_id: Option<i64>,
    pub quiz_id: Option<i64>,
    /// Questions moved to `deployed` by this call.
    pub deployed: u64,
    /// Questions that were already deployed and left alone.
    pub skipped: usize,
}

impl Orchestrator {
    /// Push a request's approved questions to the destination store.
    ///
    /// Pending and rejected questions are never sent. Already deployed
    /// questions are skipped. Any per-question failure yields
    /// `Error::PartialFailure` carrying the quiz id when one was created.
    pub async fn deploy(
        &self,
        actor: &Actor,
        request_id: Uuid,
        target: DeploymentTarget,
    ) -> Result<DeploymentReport> {
        let request = self.load_request(actor, request_id).await?;
        self.authorize_collection(actor, request.collection_id)
            .await?;

        let approved = self
            .questions
            .list(request.id, &status_filter(QuestionStatus::Approved))
            .await?;
        let skipped = self
            .questions
            .list(request.id, &status_filter(QuestionStatus::Deployed))
            .await?
            .len();
        if approved.is_empty() {
            if skipped == 0 {
                return Err(Error::Validation(
                    "request has no approved questions to deploy".to_string(),
                ));
            }
            return Ok(DeploymentReport {
                request_id: request.id,
                category_id: None,
                quiz_id: None,
                deployed: 0,
                skipped,
            });
        }

        let category_id = self
            .store
            .ensure_category(request.collection_id, target.category())
            .await?;
        let mut failed: Vec<FailedItem> = Vec::new();

        // (question id, store id) of every approved question now in the bank.
        let mut imported: Vec<(Uuid, i64)> = approved
            .iter()
            .filter_map(|q| q.store_question_id.map(|sid| (q.id, sid)))
            .collect();
        let fresh: Vec<StoreQuestion> = approved
            .iter()
            .filter(|q| q.store_question_id.is_none())
            .map(StoreQuestion::from)
            .collect();
        if !fresh.is_empty() {
            let outcomes = self.store.import_questions(category_id, &fresh).await?;
            let mut recorded = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome.result {
                    Ok(store_id) => recorded.push((outcome.source_id, store_id)),
                    Err(reason) => failed.push(FailedItem {
                        id: outcome.source_id.to_string(),
                        reason,
                    }),
                }
            }
            if !recorded.is_empty() {
                self.questions.record_store_ids(&recorded).await?;
            }
            imported.extend(recorded);
        }

        let (placed, quiz_id) = match &target {
            DeploymentTarget::Category { .. } => {
                (imported.iter().map(|(id, _)| *id).collect::<Vec<_>>(), None)
            }
            DeploymentTarget::NewQuiz { name, .. } => {
                let quiz_id = self.store.create_quiz(request.collection_id, name).await?;
                let placed = self.attach(quiz_id, &imported, &mut failed).await?;
                (placed, Some(quiz_id))
            }
            DeploymentTarget::ExistingQuiz { quiz_id, .. } => {
                let placed = self.attach(*quiz_id, &imported, &mut failed).await?;
                (placed, Some(*quiz_id))
            }
        };

        let deployed = if placed.is_empty() {
            0
        } else {
            self.questions
                .set_status(&placed, QuestionStatus::Deployed, &[QuestionStatus::Approved])
                .await?
        };

        self.events.emit(
            OrchestratorEvent::DeploymentFinished {
                request_id: request.id,
                deployed: placed.len(),
                failed: failed.len(),
                container_id: quiz_id,
            },
            Some(actor.user_id),
        );

        if !failed.is_empty() {
            warn!(
                subsystem = "orchestrator",
                component = "deployment",
                request_id = %request.id,
                deployed,
                failed = failed.len(),
                quiz_id = ?quiz_id,
                "Deployment partially failed"
            );
            return Err(Error::PartialFailure(PartialFailure {
                operation: "deploy".to_string(),
                succeeded: placed.iter().map(Uuid::to_string).collect(),
                failed,
                container_id: quiz_id,
            }));
        }

        info!(
            subsystem = "orchestrator",
            component = "deployment",
            request_id = %request.id,
            category_id,
            quiz_id = ?quiz_id,
            deployed,
            skipped,
            "Deployment completed"
        );
        Ok(DeploymentReport {
            request_id: request.id,
            category_id: Some(category_id),
            quiz_id,
            deployed,
            skipped,
        })
    }

    /// Attach imported questions to a quiz; returns the question ids placed.
    async fn attach(
        &self,
        quiz_id: i64,
        imported: &[(Uuid, i64)],
        failed: &mut Vec<FailedItem>,
    ) -> Result<Vec<Uuid>> {
        if imported.is_empty() {
            return Ok(Vec::new());
        }
        let store_ids: Vec<i64> = imported.iter().map(|(_, sid)| *sid).collect();
        let outcomes = self.store.attach_to_quiz(quiz_id, &store_ids).await?;

        let mut placed = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let Some((question_id, _)) = imported
                .iter()
                .find(|(_, sid)| *sid == outcome.store_question_id)
            else {
                continue;
            };
            match outcome.result {
                Ok(()) => placed.push(*question_id),
                Err(reason) => failed.push(FailedItem {
                    id: question_id.to_string(),
                    reason,
                }),
            }
        }
        Ok(placed)
    }
}

fn status_filter(status: QuestionStatus) -> QuestionFilter {
    QuestionFilter {
        status: Some(status),
        ..Default::default()
    }
}

/// Approved questions not yet in the store.
pub(crate) fn awaiting_import(questions: &[Question]) -> Vec<&Question> {
    questions
        .iter()
        .filter(|q| q.status == QuestionStatus::Approved && q.store_question_id.is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_category() {
        let target = DeploymentTarget::NewQuiz {
            name: "Week 1 quiz".into(),
            category: "Week 1".into(),
        };
        assert_eq!(target.category(), "Week 1");
        assert_eq!(
            DeploymentTarget::Category {
                name: "Bank".into()
            }
            .category(),
            "Bank"
        );
    }

    #[test]
    fn test_target_serializes_with_mode_tag() {
        let target = DeploymentTarget::ExistingQuiz {
            quiz_id: 42,
            category: "Week 1".into(),
        };
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["mode"], "existing_quiz");
        assert_eq!(json["quiz_id"], 42);
    }
}
