//! Diagnosis and repair of destination store linkage.
//!
//! The store keeps a legacy category field on each bank entry next to an
//! authoritative reference record. Repair copies the reference category onto
//! drifted entries and publishes versions left in draft. Diagnosis reports
//! the same facts without writing anything.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use quizgen_core::{
    Actor, Error, FailedItem, LinkageRecord, OrchestratorEvent, PartialFailure,
    QuestionCapabilities, QuestionFilter, QuestionType, Result, StoreScope, VersionStatus,
};

use crate::deployment::awaiting_import;
use crate::Orchestrator;

/// What to diagnose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnoseScope {
    Request(Uuid),
    Collection(i64),
}

/// Linkage health of one store question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionDiagnosis {
    pub store_question_id: i64,
    pub question_type: String,
    pub entry_category_id: Option<i64>,
    pub reference_category_id: Option<i64>,
    pub category_linked: bool,
    pub category_consistent: bool,
    pub payload_present: bool,
    pub version_status: VersionStatus,
    pub issues: Vec<String>,
}

impl QuestionDiagnosis {
    fn from_record(record: &LinkageRecord) -> Self {
        let mut issues = Vec::new();
        let category_linked = record.entry_category_id.is_some();
        let category_consistent = match record.reference_category_id {
            Some(reference) => record.entry_category_id == Some(reference),
            None => false,
        };

        if !category_linked {
            issues.push("entry has no category".to_string());
        }
        match (record.entry_category_id, record.reference_category_id) {
            (_, None) => issues.push("no authoritative category reference".to_string()),
            (Some(entry), Some(reference)) if entry != reference => issues.push(format!(
                "entry category {} disagrees with reference category {}",
                entry, reference
            )),
            _ => {}
        }
        if !record.has_payload {
            let table = QuestionType::from_str(&record.question_type)
                .map(|t| t.payload_table().to_string())
                .unwrap_or_else(|_| format!("{} type", record.question_type));
            issues.push(format!("missing {} record", table));
        }
        if !record.version_status.is_terminal() {
            issues.push("version is still draft".to_string());
        }

        Self {
            store_question_id: record.store_question_id,
            question_type: record.question_type.clone(),
            entry_category_id: record.entry_category_id,
            reference_category_id: record.reference_category_id,
            category_linked,
            category_consistent,
            payload_present: record.has_payload,
            version_status: record.version_status,
            issues,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Read-only linkage report. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub questions: Vec<QuestionDiagnosis>,
    /// Approved questions that have not reached the store yet.
    pub awaiting_import: Vec<Uuid>,
    pub healthy: usize,
    pub with_issues: usize,
}

impl DiagnosticReport {
    fn new(records: &[LinkageRecord], awaiting_import: Vec<Uuid>) -> Self {
        let questions: Vec<QuestionDiagnosis> =
            records.iter().map(QuestionDiagnosis::from_record).collect();
        let healthy = questions.iter().filter(|q| q.is_healthy()).count();
        Self {
            with_issues: questions.len() - healthy,
            healthy,
            questions,
            awaiting_import,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.with_issues == 0
    }
}

/// Writes made by a repair pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub collection_id: i64,
    pub category_updates: u64,
    pub versions_published: u64,
    pub writes: u64,
    /// Entries without a reference record; repair cannot pick a category.
    pub unrepairable: Vec<i64>,
}

impl Orchestrator {
    /// Inspect store linkage for a request's questions or a whole collection.
    pub async fn diagnose(&self, actor: &Actor, scope: DiagnoseScope) -> Result<DiagnosticReport> {
        let report = match scope {
            DiagnoseScope::Request(request_id) => {
                let request = self.load_request(actor, request_id).await?;
                self.authorize_collection(actor, request.collection_id)
                    .await?;
                let questions = self
                    .questions
                    .list(request.id, &QuestionFilter::default())
                    .await?;
                let store_ids: Vec<i64> =
                    questions.iter().filter_map(|q| q.store_question_id).collect();
                let records = if store_ids.is_empty() {
                    Vec::new()
                } else {
                    self.store
                        .linkage_records(&StoreScope::Questions(store_ids))
                        .await?
                };
                let awaiting = awaiting_import(&questions).iter().map(|q| q.id).collect();
                DiagnosticReport::new(&records, awaiting)
            }
            DiagnoseScope::Collection(collection_id) => {
                self.authorize_collection(actor, collection_id).await?;
                let records = self
                    .store
                    .linkage_records(&StoreScope::Collection(collection_id))
                    .await?;
                let mut awaiting = Vec::new();
                for request in self.requests.list_for_collection(collection_id).await? {
                    if !actor.owns(request.owner_id) {
                        continue;
                    }
                    let questions = self
                        .questions
                        .list(request.id, &QuestionFilter::default())
                        .await?;
                    awaiting.extend(awaiting_import(&questions).iter().map(|q| q.id));
                }
                DiagnosticReport::new(&records, awaiting)
            }
        };

        info!(
            subsystem = "orchestrator",
            component = "repair",
            result_count = report.questions.len(),
            with_issues = report.with_issues,
            awaiting_import = report.awaiting_import.len(),
            "Diagnosis completed"
        );
        Ok(report)
    }

    /// Bring a collection's store linkage back in line with its references.
    ///
    /// One category update per distinct authoritative category and one
    /// publish for all draft versions. A consistent store costs zero writes.
    pub async fn repair(&self, actor: &Actor, collection_id: i64) -> Result<RepairReport> {
        self.authorize_collection(actor, collection_id).await?;
        let records = self
            .store
            .linkage_records(&StoreScope::Collection(collection_id))
            .await?;

        let mut by_category: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        let mut drafts = Vec::new();
        let mut unrepairable = Vec::new();
        for record in &records {
            match record.reference_category_id {
                Some(reference) if record.entry_category_id != Some(reference) => by_category
                    .entry(reference)
                    .or_default()
                    .push(record.store_question_id),
                Some(_) => {}
                None => unrepairable.push(record.store_question_id),
            }
            if !record.version_status.is_terminal() {
                drafts.push(record.store_question_id);
            }
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut category_updates = 0;
        for (category_id, ids) in &by_category {
            match self.store.set_entry_category(*category_id, ids).await {
                Ok(changed) => {
                    category_updates += changed;
                    succeeded.extend(ids.iter().copied());
                }
                Err(e) => {
                    warn!(
                        subsystem = "orchestrator",
                        component = "repair",
                        collection_id,
                        category_id,
                        error = %e,
                        "Category update failed"
                    );
                    failed.extend(ids.iter().map(|id| FailedItem {
                        id: id.to_string(),
                        reason: e.failure_message(),
                    }));
                }
            }
        }

        let mut versions_published = 0;
        if !drafts.is_empty() {
            match self
                .store
                .set_version_status(&drafts, VersionStatus::Ready)
                .await
            {
                Ok(changed) => {
                    versions_published = changed;
                    succeeded.extend(drafts.iter().copied());
                }
                Err(e) => {
                    warn!(
                        subsystem = "orchestrator",
                        component = "repair",
                        collection_id,
                        error = %e,
                        "Version publish failed"
                    );
                    failed.extend(drafts.iter().map(|id| FailedItem {
                        id: id.to_string(),
                        reason: e.failure_message(),
                    }));
                }
            }
        }

        let writes = category_updates + versions_published;
        self.events.emit(
            OrchestratorEvent::RepairFinished {
                collection_id,
                writes,
            },
            Some(actor.user_id),
        );

        if !failed.is_empty() {
            succeeded.sort_unstable();
            succeeded.dedup();
            return Err(Error::PartialFailure(PartialFailure {
                operation: "repair".to_string(),
                succeeded: succeeded.iter().map(i64::to_string).collect(),
                failed,
                container_id: None,
            }));
        }

        info!(
            subsystem = "orchestrator",
            component = "repair",
            collection_id,
            category_updates,
            versions_published,
            unrepairable = unrepairable.len(),
            "Repair completed"
        );
        Ok(RepairReport {
            collection_id,
            category_updates,
            versions_published,
            writes,
            unrepairable,
        })
    }
}
