//! Request lifecycle state machine.
//!
//! ```text
//! pending -> analyzing -> topics_ready -> configured -> generating -> completed
//!                              ^              |
//!                              +--------------+   (re-selection)
//! any non-terminal state -> failed
//! failed | completed -> pending                   (administrative reset)
//! ```
//!
//! Transitions are applied in memory here and persisted with a
//! compare-and-set on the prior status by the request repository.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{GenerationRequest, RequestStatus};
use crate::quota::{validate_config, ConfigWarning};

impl RequestStatus {
    /// `completed` and `failed` only leave through an administrative reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    /// Whether topics may be selected, merged, renamed or removed.
    pub fn allows_topic_edits(&self) -> bool {
        matches!(self, RequestStatus::TopicsReady | RequestStatus::Configured)
    }

    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, to) {
            (Pending, Analyzing)
            | (Analyzing, TopicsReady)
            | (TopicsReady, Configured)
            | (Configured, Configured)
            | (Configured, TopicsReady)
            | (Configured, Generating)
            | (Generating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            (Failed | Completed, Pending) => true,
            _ => false,
        }
    }
}

impl GenerationRequest {
    /// Move to `to`, returning the prior status for compare-and-set persistence.
    ///
    /// Entering `generating` must go through [`GenerationRequest::start_generating`].
    pub fn transition(&mut self, to: RequestStatus, now: DateTime<Utc>) -> Result<RequestStatus> {
        if to == RequestStatus::Generating {
            return Err(Error::Internal(
                "use start_generating to enter generating".to_string(),
            ));
        }
        self.apply(to, now)
    }

    /// Enter `generating` after re-checking the configuration rules.
    ///
    /// The configuration is frozen from here on.
    pub fn start_generating(
        &mut self,
        max_total: u32,
        now: DateTime<Utc>,
    ) -> Result<(RequestStatus, Vec<ConfigWarning>)> {
        let config = self.configuration.as_ref().ok_or_else(|| {
            Error::Validation("request has no generation configuration".to_string())
        })?;
        let warnings = validate_config(config, max_total)?;
        let prior = self.apply(RequestStatus::Generating, now)?;
        Ok((prior, warnings))
    }

    /// Record an unrecoverable error and move to `failed`.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<RequestStatus> {
        let prior = self.apply(RequestStatus::Failed, now)?;
        self.error = Some(message.into());
        Ok(prior)
    }

    /// Administrative reset back to `pending`.
    ///
    /// Clears the error, configuration and completion timestamp.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<RequestStatus> {
        let prior = self.apply(RequestStatus::Pending, now)?;
        self.error = None;
        self.configuration = None;
        self.completed_at = None;
        Ok(prior)
    }

    fn apply(&mut self, to: RequestStatus, now: DateTime<Utc>) -> Result<RequestStatus> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(Error::Conflict(format!(
                "request {} cannot move from {} to {}",
                self.id, from, to
            )));
        }
        self.status = to;
        self.updated_at = now;
        if to == RequestStatus::Completed {
            self.completed_at = Some(now);
        }
        if to != RequestStatus::Failed {
            self.error = None;
        }
        Ok(from)
    }
}
