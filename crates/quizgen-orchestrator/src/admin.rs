//! Administrative operations: reset and status reporting.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use quizgen_core::{
    Actor, Error, GenerationRequest, QuestionStatus, RequestStatus, Result, StatusCounts,
};

use crate::Orchestrator;

/// A request with its topic and question counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStatusReport {
    pub request: GenerationRequest,
    pub topic_count: usize,
    pub selected_topic_count: usize,
    pub question_counts: StatusCounts,
}

impl Orchestrator {
    /// Return a request to `pending`, dropping its topics and questions.
    ///
    /// Administrators only. Refused while any question is deployed. A request
    /// stuck in `analyzing` or `generating` is failed first.
    pub async fn reset_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<GenerationRequest> {
        if !actor.is_admin {
            return Err(Error::Forbidden(
                "resetting a request requires an administrator".to_string(),
            ));
        }
        let mut request = self.load_request(actor, request_id).await?;

        let counts = self.questions.count_by_status(request.id).await?;
        let deployed = counts
            .get(&QuestionStatus::Deployed)
            .copied()
            .unwrap_or(0);
        if deployed > 0 {
            return Err(Error::Conflict(format!(
                "request {} has {} deployed question(s) and cannot be reset",
                request.id, deployed
            )));
        }

        if matches!(
            request.status,
            RequestStatus::Analyzing | RequestStatus::Generating
        ) {
            warn!(
                subsystem = "orchestrator",
                component = "admin",
                request_id = %request.id,
                status = %request.status,
                "Failing stuck request before reset"
            );
            let prior = request.fail("reset by administrator", Utc::now())?;
            self.persist(actor, &request, prior).await?;
        }
        if !matches!(
            request.status,
            RequestStatus::Failed | RequestStatus::Completed
        ) {
            return Err(Error::Conflict(format!(
                "request {} cannot be reset while it is {}",
                request.id, request.status
            )));
        }

        let questions = self.questions.delete_for_request(request.id).await?;
        let topics = self.topics.delete_for_request(request.id).await?;
        let prior = request.reset(Utc::now())?;
        self.persist(actor, &request, prior).await?;

        info!(
            subsystem = "orchestrator",
            component = "admin",
            request_id = %request.id,
            from = %prior,
            questions_deleted = questions,
            topics_deleted = topics,
            "Request reset"
        );
        Ok(request)
    }

    pub async fn get_request_status(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<RequestStatusReport> {
        let request = self.load_request(actor, request_id).await?;
        let topics = self.topics.list(request.id).await?;
        let question_counts = self.questions.count_by_status(request.id).await?;
        Ok(RequestStatusReport {
            topic_count: topics.len(),
            selected_topic_count: topics.iter().filter(|t| t.selected).count(),
            question_counts,
            request,
        })
    }
}
