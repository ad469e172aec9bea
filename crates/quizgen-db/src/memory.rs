//! In-memory repositories and destination store.
//!
//! Behave like the PostgreSQL implementations, including the status guards
//! and cascades the schema enforces, so orchestrator tests run without a
//! database. Every trait method is counted so tests can assert batching.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use quizgen_core::{
    new_v7, Answer, AnswerDraft, AttachOutcome, CreateRequest, DedupKey, DestinationStore, Error,
    GenerationRequest, ImportOutcome, LinkageRecord, NewQuestion, NewTopic, Question,
    QuestionCapabilities, QuestionDraft, QuestionFilter, QuestionRepository, QuestionStatus,
    RequestRepository, RequestStatus, Result, StatusCounts, StoreQuestion, StoreScope, Topic,
    TopicMerge, TopicRepository, VersionStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Internal("in-memory store lock poisoned".to_string()))
}

/// Per-operation call counter.
#[derive(Debug, Default)]
struct CallLog(Mutex<HashMap<&'static str, usize>>);

impl CallLog {
    fn record(&self, op: &'static str) {
        if let Ok(mut calls) = self.0.lock() {
            *calls.entry(op).or_default() += 1;
        }
    }

    fn count(&self, op: &str) -> usize {
        self.0
            .lock()
            .map(|calls| calls.get(op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn reset(&self) {
        if let Ok(mut calls) = self.0.lock() {
            calls.clear();
        }
    }
}

// =============================================================================
// REPOSITORIES
// =============================================================================

#[derive(Debug, Default)]
struct RepoState {
    requests: HashMap<Uuid, GenerationRequest>,
    topics: Vec<Topic>,
    questions: Vec<Question>,
    fail_topic_inserts: bool,
}

/// In-memory implementation of the request, topic and question repositories.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
    calls: CallLog,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a repository method was called, e.g. `"set_status"`.
    pub fn call_count(&self, op: &str) -> usize {
        self.calls.count(op)
    }

    pub fn reset_call_counts(&self) {
        self.calls.reset();
    }

    /// Backdate a request, e.g. to push it outside the dedup window.
    pub fn set_created_at(&self, id: Uuid, created_at: DateTime<Utc>) -> Result<()> {
        let mut state = lock(&self.state)?;
        let request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("request {}", id)))?;
        request.created_at = created_at;
        Ok(())
    }

    /// Overwrite a request's status without lifecycle checks.
    pub fn force_status(&self, id: Uuid, status: RequestStatus) -> Result<()> {
        let mut state = lock(&self.state)?;
        let request = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("request {}", id)))?;
        request.status = status;
        Ok(())
    }

    /// Make topic inserts fail until cleared.
    pub fn fail_topic_inserts(&self, fail: bool) -> Result<()> {
        lock(&self.state)?.fail_topic_inserts = fail;
        Ok(())
    }

    pub fn question_total(&self) -> usize {
        self.state.lock().map(|s| s.questions.len()).unwrap_or(0)
    }
}

fn answers_from_drafts(question_id: Uuid, drafts: &[AnswerDraft]) -> Vec<Answer> {
    drafts
        .iter()
        .enumerate()
        .map(|(i, a)| Answer {
            id: new_v7(),
            question_id,
            body: a.body.clone(),
            weight: a.weight,
            feedback: a.feedback.clone(),
            sort_order: i as i32,
        })
        .collect()
}

#[async_trait]
impl RequestRepository for MemoryRepository {
    async fn insert(&self, req: CreateRequest) -> Result<GenerationRequest> {
        self.calls.record("insert_request");
        let now = Utc::now();
        let request = GenerationRequest {
            id: new_v7(),
            owner_id: req.owner_id,
            collection_id: req.collection_id,
            status: RequestStatus::Pending,
            content_hash: req.content_hash,
            content_sources: req.content_sources,
            configuration: None,
            error: None,
            reused_from: req.reused_from,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        lock(&self.state)?
            .requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationRequest>> {
        self.calls.record("get_request");
        Ok(lock(&self.state)?.requests.get(&id).cloned())
    }

    async fn find_reusable(&self, key: &DedupKey) -> Result<Option<GenerationRequest>> {
        self.calls.record("find_reusable");
        let state = lock(&self.state)?;
        Ok(state
            .requests
            .values()
            .filter(|r| {
                r.owner_id == key.owner_id
                    && r.collection_id == key.collection_id
                    && r.content_hash == key.content_hash
                    && r.status == RequestStatus::Completed
                    && r.created_at >= key.not_before
                    && state.topics.iter().any(|t| t.request_id == r.id)
            })
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn save_transition(
        &self,
        request: &GenerationRequest,
        expected: RequestStatus,
    ) -> Result<()> {
        self.calls.record("save_transition");
        let mut state = lock(&self.state)?;
        let stored = state
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| Error::NotFound(format!("request {}", request.id)))?;
        if stored.status != expected {
            return Err(Error::Conflict(format!(
                "request {} is {}, expected {}",
                request.id, stored.status, expected
            )));
        }
        stored.status = request.status;
        stored.error = request.error.clone();
        stored.configuration = request.configuration.clone();
        stored.updated_at = request.updated_at;
        stored.completed_at = request.completed_at;
        Ok(())
    }

    async fn list_for_collection(&self, collection_id: i64) -> Result<Vec<GenerationRequest>> {
        self.calls.record("list_for_collection");
        let state = lock(&self.state)?;
        let mut requests: Vec<GenerationRequest> = state
            .requests
            .values()
            .filter(|r| r.collection_id == collection_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }
}

#[async_trait]
impl TopicRepository for MemoryRepository {
    async fn insert_many(&self, request_id: Uuid, topics: Vec<NewTopic>) -> Result<Vec<Topic>> {
        self.calls.record("insert_topics");
        let mut state = lock(&self.state)?;
        if state.fail_topic_inserts {
            return Err(Error::Internal("topic store unavailable".to_string()));
        }
        let next_order = state
            .topics
            .iter()
            .filter(|t| t.request_id == request_id)
            .map(|t| t.sort_order + 1)
            .max()
            .unwrap_or(0);

        let created: Vec<Topic> = topics
            .into_iter()
            .enumerate()
            .map(|(i, t)| Topic {
                id: new_v7(),
                request_id,
                title: t.title,
                description: t.description,
                content_excerpt: t.content_excerpt,
                learning_objectives: t.learning_objectives,
                level: t.level,
                sort_order: next_order + i as i32,
                selected: t.selected,
                quota: if t.selected { t.quota } else { 0 },
            })
            .collect();
        state.topics.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list(&self, request_id: Uuid) -> Result<Vec<Topic>> {
        self.calls.record("list_topics");
        let state = lock(&self.state)?;
        let mut topics: Vec<Topic> = state
            .topics
            .iter()
            .filter(|t| t.request_id == request_id)
            .cloned()
            .collect();
        topics.sort_by_key(|t| (t.sort_order, t.id));
        Ok(topics)
    }

    async fn set_selection(&self, request_id: Uuid, selected: &[Uuid]) -> Result<u64> {
        self.calls.record("set_selection");
        let mut state = lock(&self.state)?;
        let mut changed = 0;
        for topic in state.topics.iter_mut().filter(|t| t.request_id == request_id) {
            topic.selected = selected.contains(&topic.id);
            if !topic.selected {
                topic.quota = 0;
            }
            changed += 1;
        }
        Ok(changed)
    }

    async fn set_quotas(&self, request_id: Uuid, quotas: &[(Uuid, u32)]) -> Result<u64> {
        self.calls.record("set_quotas");
        let mut state = lock(&self.state)?;
        let wanted: HashMap<Uuid, u32> = quotas.iter().copied().collect();
        if let Some(t) = state.topics.iter().find(|t| {
            t.request_id == request_id && !t.selected && wanted.get(&t.id).is_some_and(|q| *q > 0)
        }) {
            return Err(Error::Validation(format!(
                "topic {} is not selected and cannot carry a quota",
                t.id
            )));
        }
        let mut changed = 0;
        for topic in state.topics.iter_mut().filter(|t| t.request_id == request_id) {
            if let Some(quota) = wanted.get(&topic.id) {
                topic.quota = *quota;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn apply_merges(&self, request_id: Uuid, merges: &[TopicMerge]) -> Result<()> {
        self.calls.record("apply_merges");
        let mut state = lock(&self.state)?;

        let mut absorbed_into: HashMap<Uuid, Uuid> = HashMap::new();
        for merge in merges {
            for id in &merge.absorb {
                absorbed_into.insert(*id, merge.keep);
            }
        }

        for question in state
            .questions
            .iter_mut()
            .filter(|q| q.request_id == request_id)
        {
            if let Some(keep) = absorbed_into.get(&question.topic_id) {
                question.topic_id = *keep;
                question.updated_at = Utc::now();
            }
        }

        for merge in merges {
            if let Some(topic) = state
                .topics
                .iter_mut()
                .find(|t| t.id == merge.keep && t.request_id == request_id)
            {
                topic.title = merge.title.clone();
                topic.content_excerpt = merge.content_excerpt.clone();
                topic.learning_objectives = merge.learning_objectives.clone();
                topic.quota = merge.quota;
                topic.selected = merge.selected;
            }
        }

        state
            .topics
            .retain(|t| !(t.request_id == request_id && absorbed_into.contains_key(&t.id)));
        Ok(())
    }

    async fn rename(&self, request_id: Uuid, topic_id: Uuid, title: &str) -> Result<()> {
        self.calls.record("rename_topic");
        let mut state = lock(&self.state)?;
        let topic = state
            .topics
            .iter_mut()
            .find(|t| t.id == topic_id && t.request_id == request_id)
            .ok_or_else(|| Error::NotFound(format!("topic {}", topic_id)))?;
        topic.title = title.to_string();
        Ok(())
    }

    async fn delete_many(&self, request_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        self.calls.record("delete_topics");
        let mut state = lock(&self.state)?;
        let doomed: HashSet<Uuid> = state
            .topics
            .iter()
            .filter(|t| t.request_id == request_id && ids.contains(&t.id))
            .map(|t| t.id)
            .collect();
        state.topics.retain(|t| !doomed.contains(&t.id));
        state.questions.retain(|q| !doomed.contains(&q.topic_id));
        Ok(doomed.len() as u64)
    }

    async fn delete_for_request(&self, request_id: Uuid) -> Result<u64> {
        self.calls.record("delete_topics_for_request");
        let mut state = lock(&self.state)?;
        let before = state.topics.len();
        state.topics.retain(|t| t.request_id != request_id);
        let removed = (before - state.topics.len()) as u64;
        state.questions.retain(|q| q.request_id != request_id);
        Ok(removed)
    }
}

#[async_trait]
impl QuestionRepository for MemoryRepository {
    async fn insert_many(&self, questions: Vec<NewQuestion>) -> Result<Vec<Question>> {
        self.calls.record("insert_questions");
        let now = Utc::now();
        let created: Vec<Question> = questions
            .into_iter()
            .map(|q| {
                let id = new_v7();
                Question {
                    id,
                    request_id: q.request_id,
                    topic_id: q.topic_id,
                    question_type: q.draft.question_type,
                    difficulty: q.draft.difficulty,
                    cognitive_level: q.draft.cognitive_level,
                    answers: answers_from_drafts(id, &q.draft.answers),
                    body: q.draft.body,
                    general_feedback: q.draft.general_feedback,
                    ai_reasoning: q.draft.ai_reasoning,
                    status: QuestionStatus::Pending,
                    regeneration_count: 0,
                    quality_score: q.quality_score,
                    store_question_id: None,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();

        let mut state = lock(&self.state)?;
        for question in &created {
            if !state
                .topics
                .iter()
                .any(|t| t.id == question.topic_id && t.request_id == question.request_id)
            {
                return Err(Error::NotFound(format!("topic {}", question.topic_id)));
            }
        }
        state.questions.extend(created.iter().cloned());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Question>> {
        self.calls.record("get_question");
        Ok(lock(&self.state)?
            .questions
            .iter()
            .find(|q| q.id == id)
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Question>> {
        self.calls.record("get_many");
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        Ok(lock(&self.state)?
            .questions
            .iter()
            .filter(|q| wanted.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn list(&self, request_id: Uuid, filter: &QuestionFilter) -> Result<Vec<Question>> {
        self.calls.record("list_questions");
        Ok(lock(&self.state)?
            .questions
            .iter()
            .filter(|q| q.request_id == request_id && filter.matches(q))
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        ids: &[Uuid],
        to: QuestionStatus,
        allowed_from: &[QuestionStatus],
    ) -> Result<u64> {
        self.calls.record("set_status");
        let mut state = lock(&self.state)?;
        let wanted: HashSet<&Uuid> = ids.iter().collect();

        if to == QuestionStatus::Deployed {
            if let Some(q) = state.questions.iter().find(|q| {
                wanted.contains(&q.id)
                    && allowed_from.contains(&q.status)
                    && !matches!(q.status, QuestionStatus::Approved | QuestionStatus::Deployed)
            }) {
                return Err(Error::Conflict(format!(
                    "question {} cannot move from {} to deployed",
                    q.id, q.status
                )));
            }
        }

        let now = Utc::now();
        let mut changed = 0;
        for question in state
            .questions
            .iter_mut()
            .filter(|q| wanted.contains(&q.id) && allowed_from.contains(&q.status))
        {
            question.status = to;
            question.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn replace_draft(
        &self,
        id: Uuid,
        draft: &QuestionDraft,
        quality_score: f32,
        max_regenerations: u32,
    ) -> Result<Question> {
        self.calls.record("replace_draft");
        let mut state = lock(&self.state)?;
        let question = state
            .questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| Error::NotFound(format!("question {}", id)))?;

        if question.status == QuestionStatus::Deployed {
            return Err(Error::Conflict(format!("question {} is already deployed", id)));
        }
        if question.regeneration_count >= max_regenerations {
            return Err(Error::RegenerationLimitExceeded {
                question_id: id,
                count: question.regeneration_count,
                max: max_regenerations,
            });
        }

        question.question_type = draft.question_type;
        question.difficulty = draft.difficulty;
        question.cognitive_level = draft.cognitive_level;
        question.body = draft.body.clone();
        question.general_feedback = draft.general_feedback.clone();
        question.ai_reasoning = draft.ai_reasoning.clone();
        question.quality_score = quality_score;
        question.status = QuestionStatus::Pending;
        question.regeneration_count += 1;
        question.store_question_id = None;
        question.answers = answers_from_drafts(id, &draft.answers);
        question.updated_at = Utc::now();
        Ok(question.clone())
    }

    async fn record_store_ids(&self, pairs: &[(Uuid, i64)]) -> Result<u64> {
        self.calls.record("record_store_ids");
        let mut state = lock(&self.state)?;
        let wanted: HashMap<Uuid, i64> = pairs.iter().copied().collect();
        let mut changed = 0;
        for question in state.questions.iter_mut() {
            if let Some(store_id) = wanted.get(&question.id) {
                question.store_question_id = Some(*store_id);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn reorder_answers(&self, question_id: Uuid, order: &[Uuid]) -> Result<()> {
        self.calls.record("reorder_answers");
        let mut state = lock(&self.state)?;
        let question = state
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::NotFound(format!("question {}", question_id)))?;

        let existing: HashSet<Uuid> = question.answers.iter().map(|a| a.id).collect();
        let requested: HashSet<Uuid> = order.iter().copied().collect();
        if requested.len() != order.len() || requested != existing {
            return Err(Error::Validation(format!(
                "answer order must list each of the question's {} answers exactly once",
                existing.len()
            )));
        }

        for answer in question.answers.iter_mut() {
            if let Some(pos) = order.iter().position(|id| *id == answer.id) {
                answer.sort_order = pos as i32;
            }
        }
        if question.status != QuestionStatus::Deployed {
            question.store_question_id = None;
        }
        question.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        self.calls.record("delete_questions");
        let mut state = lock(&self.state)?;
        let before = state.questions.len();
        state.questions.retain(|q| !ids.contains(&q.id));
        Ok((before - state.questions.len()) as u64)
    }

    async fn delete_for_request(&self, request_id: Uuid) -> Result<u64> {
        self.calls.record("delete_questions_for_request");
        let mut state = lock(&self.state)?;
        let before = state.questions.len();
        state.questions.retain(|q| q.request_id != request_id);
        Ok((before - state.questions.len()) as u64)
    }

    async fn count_by_status(&self, request_id: Uuid) -> Result<StatusCounts> {
        self.calls.record("count_by_status");
        let state = lock(&self.state)?;
        let mut counts = StatusCounts::new();
        for question in state.questions.iter().filter(|q| q.request_id == request_id) {
            *counts.entry(question.status).or_default() += 1;
        }
        Ok(counts)
    }
}

// =============================================================================
// DESTINATION STORE
// =============================================================================

/// One imported question as the in-memory bank sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct BankRecord {
    pub store_question_id: i64,
    pub question: StoreQuestion,
    pub entry_category_id: Option<i64>,
    pub reference_category_id: Option<i64>,
    pub has_payload: bool,
    pub version_status: VersionStatus,
}

#[derive(Debug, Default)]
struct BankState {
    next_id: i64,
    /// category id -> (collection id, name)
    categories: BTreeMap<i64, (i64, String)>,
    records: BTreeMap<i64, BankRecord>,
    /// quiz id -> (collection id, attached question ids in slot order)
    quizzes: BTreeMap<i64, (i64, Vec<i64>)>,
    fail_imports: HashSet<Uuid>,
    fail_attach: HashSet<i64>,
    fail_category_updates: bool,
    rows_written: u64,
}

impl BankState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn collection_of(&self, category_id: Option<i64>) -> Option<i64> {
        category_id.and_then(|id| self.categories.get(&id).map(|(collection, _)| *collection))
    }
}

/// In-memory destination store with fault injection and drift seeding.
#[derive(Debug, Default)]
pub struct MemoryQuestionBank {
    state: Mutex<BankState>,
    calls: CallLog,
}

impl MemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls.count(op)
    }

    /// Rows changed by category and version updates so far.
    pub fn rows_written(&self) -> u64 {
        self.state.lock().map(|s| s.rows_written).unwrap_or(0)
    }

    /// Make future imports of these orchestrator questions fail.
    pub fn fail_imports_for(&self, source_ids: &[Uuid]) -> Result<()> {
        lock(&self.state)?.fail_imports.extend(source_ids.iter().copied());
        Ok(())
    }

    /// Make future attaches of these store questions fail.
    pub fn fail_attach_for(&self, store_question_ids: &[i64]) -> Result<()> {
        lock(&self.state)?
            .fail_attach
            .extend(store_question_ids.iter().copied());
        Ok(())
    }

    /// Make `set_entry_category` fail until cleared.
    pub fn fail_category_updates(&self, fail: bool) -> Result<()> {
        lock(&self.state)?.fail_category_updates = fail;
        Ok(())
    }

    pub fn clear_faults(&self) -> Result<()> {
        let mut state = lock(&self.state)?;
        state.fail_imports.clear();
        state.fail_attach.clear();
        state.fail_category_updates = false;
        Ok(())
    }

    /// Overwrite the legacy category field of an entry.
    pub fn seed_entry_category(&self, store_question_id: i64, category: Option<i64>) -> Result<()> {
        self.with_record(store_question_id, |r| r.entry_category_id = category)
    }

    /// Put a version back into draft.
    pub fn seed_version_status(&self, store_question_id: i64, status: VersionStatus) -> Result<()> {
        self.with_record(store_question_id, |r| r.version_status = status)
    }

    /// Drop the type-specific payload record.
    pub fn drop_payload(&self, store_question_id: i64) -> Result<()> {
        self.with_record(store_question_id, |r| r.has_payload = false)
    }

    pub fn record(&self, store_question_id: i64) -> Option<BankRecord> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.records.get(&store_question_id).cloned())
    }

    pub fn imported_count(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    /// Store question ids attached to a quiz, in slot order.
    pub fn quiz_questions(&self, quiz_id: i64) -> Vec<i64> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.quizzes.get(&quiz_id).map(|(_, ids)| ids.clone()))
            .unwrap_or_default()
    }

    fn with_record(&self, store_question_id: i64, f: impl FnOnce(&mut BankRecord)) -> Result<()> {
        let mut state = lock(&self.state)?;
        let record = state
            .records
            .get_mut(&store_question_id)
            .ok_or_else(|| Error::NotFound(format!("store question {}", store_question_id)))?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl DestinationStore for MemoryQuestionBank {
    async fn ensure_category(&self, collection_id: i64, name: &str) -> Result<i64> {
        self.calls.record("ensure_category");
        let mut state = lock(&self.state)?;
        if let Some((id, _)) = state
            .categories
            .iter()
            .find(|(_, (collection, n))| *collection == collection_id && n == name)
        {
            return Ok(*id);
        }
        let id = state.next_id();
        state
            .categories
            .insert(id, (collection_id, name.to_string()));
        Ok(id)
    }

    async fn import_questions(
        &self,
        category_id: i64,
        questions: &[StoreQuestion],
    ) -> Result<Vec<ImportOutcome>> {
        self.calls.record("import_questions");
        let mut state = lock(&self.state)?;
        if !state.categories.contains_key(&category_id) {
            return Err(Error::NotFound(format!("category {}", category_id)));
        }

        let mut outcomes = Vec::with_capacity(questions.len());
        for q in questions {
            let result = if state.fail_imports.contains(&q.source_id) {
                Err("question bank rejected the import".to_string())
            } else if let Err(e) = q.question_type.validate_answer_shape(&q.answers) {
                Err(e.to_string())
            } else {
                let id = state.next_id();
                state.records.insert(
                    id,
                    BankRecord {
                        store_question_id: id,
                        question: q.clone(),
                        entry_category_id: Some(category_id),
                        reference_category_id: Some(category_id),
                        has_payload: true,
                        version_status: VersionStatus::Ready,
                    },
                );
                Ok(id)
            };
            outcomes.push(ImportOutcome {
                source_id: q.source_id,
                result,
            });
        }
        Ok(outcomes)
    }

    async fn create_quiz(&self, collection_id: i64, _name: &str) -> Result<i64> {
        self.calls.record("create_quiz");
        let mut state = lock(&self.state)?;
        let id = state.next_id();
        state.quizzes.insert(id, (collection_id, Vec::new()));
        Ok(id)
    }

    async fn attach_to_quiz(
        &self,
        quiz_id: i64,
        store_question_ids: &[i64],
    ) -> Result<Vec<AttachOutcome>> {
        self.calls.record("attach_to_quiz");
        let mut state = lock(&self.state)?;
        if !state.quizzes.contains_key(&quiz_id) {
            return Err(Error::NotFound(format!("quiz {}", quiz_id)));
        }

        let mut outcomes = Vec::with_capacity(store_question_ids.len());
        for id in store_question_ids {
            let result = if state.fail_attach.contains(id) {
                Err("quiz slot could not be created".to_string())
            } else if !state.records.contains_key(id) {
                Err(format!("store question {} does not exist", id))
            } else {
                if let Some((_, slots)) = state.quizzes.get_mut(&quiz_id) {
                    if !slots.contains(id) {
                        slots.push(*id);
                    }
                }
                Ok(())
            };
            outcomes.push(AttachOutcome {
                store_question_id: *id,
                result,
            });
        }
        Ok(outcomes)
    }

    async fn linkage_records(&self, scope: &StoreScope) -> Result<Vec<LinkageRecord>> {
        self.calls.record("linkage_records");
        let state = lock(&self.state)?;
        Ok(state
            .records
            .values()
            .filter(|r| match scope {
                StoreScope::Collection(collection_id) => {
                    state.collection_of(r.reference_category_id) == Some(*collection_id)
                        || state.collection_of(r.entry_category_id) == Some(*collection_id)
                }
                StoreScope::Questions(ids) => ids.contains(&r.store_question_id),
            })
            .map(|r| LinkageRecord {
                store_question_id: r.store_question_id,
                question_type: r.question.question_type.as_str().to_string(),
                entry_category_id: r.entry_category_id,
                reference_category_id: r.reference_category_id,
                has_payload: r.has_payload,
                version_status: r.version_status,
            })
            .collect())
    }

    async fn set_entry_category(
        &self,
        category_id: i64,
        store_question_ids: &[i64],
    ) -> Result<u64> {
        self.calls.record("set_entry_category");
        let mut state = lock(&self.state)?;
        if state.fail_category_updates {
            return Err(Error::Upstream(
                "question bank refused the category update".to_string(),
            ));
        }
        let mut changed = 0;
        for id in store_question_ids {
            if let Some(record) = state.records.get_mut(id) {
                if record.entry_category_id != Some(category_id) {
                    record.entry_category_id = Some(category_id);
                    changed += 1;
                }
            }
        }
        state.rows_written += changed;
        Ok(changed)
    }

    async fn set_version_status(
        &self,
        store_question_ids: &[i64],
        status: VersionStatus,
    ) -> Result<u64> {
        self.calls.record("set_version_status");
        let mut state = lock(&self.state)?;
        let mut changed = 0;
        for id in store_question_ids {
            if let Some(record) = state.records.get_mut(id) {
                if record.version_status != status {
                    record.version_status = status;
                    changed += 1;
                }
            }
        }
        state.rows_written += changed;
        Ok(changed)
    }
}
