//! Topic operations: selection, merge, rename, removal and dedup.
//!
//! Topics may change only while a request is `topics_ready` or `configured`.
//! Any change to a `configured` request sends it back to `topics_ready`, since
//! its quotas no longer describe the topic set.

use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use quizgen_core::topics::{clean_title, merge_pair, normalized_identity, plan_topic_merges};
use quizgen_core::{Actor, Error, GenerationRequest, RequestStatus, Result, Topic};

use crate::Orchestrator;

impl Orchestrator {
    /// Topics of a request in display order.
    pub async fn list_topics(&self, actor: &Actor, request_id: Uuid) -> Result<Vec<Topic>> {
        let request = self.load_request(actor, request_id).await?;
        self.topics.list(request.id).await
    }

    /// Select exactly `topic_ids`; every other topic is deselected with quota 0.
    pub async fn select_topics(
        &self,
        actor: &Actor,
        request_id: Uuid,
        topic_ids: &[Uuid],
    ) -> Result<Vec<Topic>> {
        let mut request = self.editable_request(actor, request_id).await?;
        let topics = self.topics.list(request.id).await?;
        let selected = resolve_selection(&topics, topic_ids)?;

        self.topics.set_selection(request.id, &selected).await?;
        self.reopen(actor, &mut request).await?;
        info!(
            subsystem = "orchestrator",
            component = "topics",
            request_id = %request.id,
            result_count = selected.len(),
            "Topics selected"
        );
        self.topics.list(request.id).await
    }

    /// Merge `second` into `first`: titles joined, quotas summed, excerpts
    /// concatenated, questions reassigned, then `second` deleted.
    pub async fn merge_topics(
        &self,
        actor: &Actor,
        request_id: Uuid,
        first: Uuid,
        second: Uuid,
    ) -> Result<Topic> {
        if first == second {
            return Err(Error::Validation(
                "a topic cannot be merged with itself".to_string(),
            ));
        }
        let mut request = self.editable_request(actor, request_id).await?;
        let topics = self.topics.list(request.id).await?;
        let a = find_topic(&topics, first)?;
        let b = find_topic(&topics, second)?;

        let merge = merge_pair(a, b, &self.config.topic_merge_separator);
        ensure_unique_title(&topics, &merge.title, &[first, second])?;
        self.topics.apply_merges(request.id, &[merge]).await?;
        self.reopen(actor, &mut request).await?;

        info!(
            subsystem = "orchestrator",
            component = "topics",
            request_id = %request.id,
            topic_id = %first,
            absorbed = %second,
            "Topics merged"
        );
        let merged = self.topics.list(request.id).await?;
        merged
            .into_iter()
            .find(|t| t.id == first)
            .ok_or_else(|| Error::NotFound(format!("topic {}", first)))
    }

    /// Rename a topic. The cleaned title must be unique within the request.
    pub async fn rename_topic(
        &self,
        actor: &Actor,
        request_id: Uuid,
        topic_id: Uuid,
        title: &str,
    ) -> Result<Topic> {
        let request = self.editable_request(actor, request_id).await?;
        let cleaned = clean_title(title);
        if cleaned.is_empty() {
            return Err(Error::Validation("topic title must not be empty".to_string()));
        }
        let topics = self.topics.list(request.id).await?;
        find_topic(&topics, topic_id)?;
        ensure_unique_title(&topics, &cleaned, &[topic_id])?;

        self.topics.rename(request.id, topic_id, &cleaned).await?;
        let mut topics = self.topics.list(request.id).await?;
        let pos = topics
            .iter()
            .position(|t| t.id == topic_id)
            .ok_or_else(|| Error::NotFound(format!("topic {}", topic_id)))?;
        Ok(topics.swap_remove(pos))
    }

    /// Remove topics and their questions.
    pub async fn remove_topics(
        &self,
        actor: &Actor,
        request_id: Uuid,
        topic_ids: &[Uuid],
    ) -> Result<u64> {
        if topic_ids.is_empty() {
            return Ok(0);
        }
        let mut request = self.editable_request(actor, request_id).await?;
        let topics = self.topics.list(request.id).await?;
        let ids = resolve_selection(&topics, topic_ids)?;

        let removed = self.topics.delete_many(request.id, &ids).await?;
        self.reopen(actor, &mut request).await?;
        info!(
            subsystem = "orchestrator",
            component = "topics",
            request_id = %request.id,
            result_count = removed,
            "Topics removed"
        );
        Ok(removed)
    }

    /// Fold title-colliding topics into the first one seen.
    ///
    /// Returns how many topics were absorbed; zero when already normalized.
    pub async fn normalize_topics(&self, actor: &Actor, request_id: Uuid) -> Result<usize> {
        let mut request = self.editable_request(actor, request_id).await?;
        let topics = self.topics.list(request.id).await?;
        let merges = plan_topic_merges(&topics);
        if merges.is_empty() {
            return Ok(0);
        }

        let absorbed: usize = merges.iter().map(|m| m.absorb.len()).sum();
        self.topics.apply_merges(request.id, &merges).await?;
        self.reopen(actor, &mut request).await?;
        info!(
            subsystem = "orchestrator",
            component = "topics",
            request_id = %request.id,
            result_count = absorbed,
            "Duplicate topics merged"
        );
        Ok(absorbed)
    }

    pub(crate) async fn editable_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<GenerationRequest> {
        let request = self.load_request(actor, request_id).await?;
        if !request.status.allows_topic_edits() {
            return Err(Error::Conflict(format!(
                "topics of request {} cannot change while it is {}",
                request.id, request.status
            )));
        }
        Ok(request)
    }

    /// Send a `configured` request back to topic selection.
    pub(crate) async fn reopen(&self, actor: &Actor, request: &mut GenerationRequest) -> Result<()> {
        if request.status == RequestStatus::Configured {
            self.advance(actor, request, RequestStatus::TopicsReady).await?;
        }
        Ok(())
    }
}

fn find_topic(topics: &[Topic], id: Uuid) -> Result<&Topic> {
    topics
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| Error::NotFound(format!("topic {}", id)))
}

/// `Conflict` when a topic outside `except` already carries `title`.
fn ensure_unique_title(topics: &[Topic], title: &str, except: &[Uuid]) -> Result<()> {
    let identity = normalized_identity(title);
    if topics
        .iter()
        .any(|t| !except.contains(&t.id) && normalized_identity(&t.title) == identity)
    {
        return Err(Error::Conflict(format!(
            "a topic titled '{}' already exists",
            clean_title(title)
        )));
    }
    Ok(())
}

/// Deduplicated ids, each of which must belong to the request.
pub(crate) fn resolve_selection(topics: &[Topic], ids: &[Uuid]) -> Result<Vec<Uuid>> {
    if ids.is_empty() {
        return Err(Error::Validation(
            "at least one topic must be selected".to_string(),
        ));
    }
    let known: HashSet<Uuid> = topics.iter().map(|t| t.id).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !known.contains(id) {
            return Err(Error::NotFound(format!("topic {}", id)));
        }
        if seen.insert(*id) {
            out.push(*id);
        }
    }
    Ok(out)
}
