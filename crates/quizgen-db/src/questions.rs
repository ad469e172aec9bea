//! Generated question repository implementation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use quizgen_core::{
    new_v7, Answer, AnswerDraft, Error, NewQuestion, Question, QuestionDraft, QuestionFilter,
    QuestionRepository, QuestionStatus, Result, StatusCounts,
};

const QUESTION_COLUMNS: &str = "id, request_id, topic_id, question_type, difficulty,
     cognitive_level, body, general_feedback, ai_reasoning, status, regeneration_count,
     quality_score, store_question_id, created_at, updated_at";

/// PostgreSQL implementation of QuestionRepository.
#[derive(Clone)]
pub struct PgQuestionRepository {
    pool: Pool<Postgres>,
}

impl PgQuestionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow, answers: Vec<Answer>) -> Result<Question> {
        let question_type: String = row.get("question_type");
        let difficulty: String = row.get("difficulty");
        let cognitive_level: String = row.get("cognitive_level");
        let status: String = row.get("status");
        let regeneration_count: i32 = row.get("regeneration_count");

        Ok(Question {
            id: row.get("id"),
            request_id: row.get("request_id"),
            topic_id: row.get("topic_id"),
            question_type: question_type.parse()?,
            difficulty: difficulty.parse()?,
            cognitive_level: cognitive_level.parse()?,
            body: row.get("body"),
            general_feedback: row.get("general_feedback"),
            ai_reasoning: row.get("ai_reasoning"),
            status: status.parse()?,
            regeneration_count: regeneration_count.max(0) as u32,
            quality_score: row.get("quality_score"),
            store_question_id: row.get("store_question_id"),
            answers,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Load answers for many questions in one query, grouped by question.
    async fn load_answers(&self, question_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Answer>>> {
        let mut grouped: HashMap<Uuid, Vec<Answer>> = HashMap::new();
        if question_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = sqlx::query(
            "SELECT id, question_id, body, weight, feedback, sort_order
             FROM generated_answer
             WHERE question_id = ANY($1)
             ORDER BY question_id, sort_order",
        )
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        for row in rows {
            let answer = Answer {
                id: row.get("id"),
                question_id: row.get("question_id"),
                body: row.get("body"),
                weight: row.get("weight"),
                feedback: row.get("feedback"),
                sort_order: row.get("sort_order"),
            };
            grouped.entry(answer.question_id).or_default().push(answer);
        }
        Ok(grouped)
    }

    async fn with_answers(&self, rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Question>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
        let mut answers = self.load_answers(&ids).await?;
        rows.iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                Self::parse_row(row, answers.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    /// Insert answers for several questions in one statement.
    async fn insert_answers_tx(
        tx: &mut Transaction<'_, Postgres>,
        answers: &[Answer],
    ) -> Result<()> {
        if answers.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = answers.iter().map(|a| a.id).collect();
        let question_ids: Vec<Uuid> = answers.iter().map(|a| a.question_id).collect();
        let bodies: Vec<&str> = answers.iter().map(|a| a.body.as_str()).collect();
        let weights: Vec<f64> = answers.iter().map(|a| a.weight).collect();
        let feedback: Vec<&str> = answers.iter().map(|a| a.feedback.as_str()).collect();
        let orders: Vec<i32> = answers.iter().map(|a| a.sort_order).collect();

        sqlx::query(
            "INSERT INTO generated_answer (id, question_id, body, weight, feedback, sort_order)
             SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::float8[], $5::text[], $6::int4[])",
        )
        .bind(&ids)
        .bind(&question_ids)
        .bind(&bodies)
        .bind(&weights)
        .bind(&feedback)
        .bind(&orders)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
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
impl QuestionRepository for PgQuestionRepository {
    async fn insert_many(&self, questions: Vec<NewQuestion>) -> Result<Vec<Question>> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }
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

        let ids: Vec<Uuid> = created.iter().map(|q| q.id).collect();
        let request_ids: Vec<Uuid> = created.iter().map(|q| q.request_id).collect();
        let topic_ids: Vec<Uuid> = created.iter().map(|q| q.topic_id).collect();
        let types: Vec<&str> = created.iter().map(|q| q.question_type.as_str()).collect();
        let difficulties: Vec<&str> = created.iter().map(|q| q.difficulty.as_str()).collect();
        let levels: Vec<&str> = created.iter().map(|q| q.cognitive_level.as_str()).collect();
        let bodies: Vec<&str> = created.iter().map(|q| q.body.as_str()).collect();
        let feedback: Vec<&str> = created.iter().map(|q| q.general_feedback.as_str()).collect();
        let reasoning: Vec<&str> = created.iter().map(|q| q.ai_reasoning.as_str()).collect();
        let scores: Vec<f32> = created.iter().map(|q| q.quality_score).collect();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO generated_question
                 (id, request_id, topic_id, question_type, difficulty, cognitive_level,
                  body, general_feedback, ai_reasoning, quality_score, created_at, updated_at)
             SELECT q.id, q.request_id, q.topic_id, q.qtype, q.difficulty, q.level,
                    q.body, q.feedback, q.reasoning, q.score, $11, $11
             FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::text[], $6::text[],
                         $7::text[], $8::text[], $9::text[], $10::float4[])
                  AS q(id, request_id, topic_id, qtype, difficulty, level, body, feedback, reasoning, score)",
        )
        .bind(&ids)
        .bind(&request_ids)
        .bind(&topic_ids)
        .bind(&types)
        .bind(&difficulties)
        .bind(&levels)
        .bind(&bodies)
        .bind(&feedback)
        .bind(&reasoning)
        .bind(&scores)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let answers: Vec<Answer> = created.iter().flat_map(|q| q.answers.clone()).collect();
        Self::insert_answers_tx(&mut tx, &answers).await?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "questions",
            op = "insert_many",
            result_count = created.len(),
            "Inserted questions"
        );
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Question>> {
        Ok(self.get_many(&[id]).await?.into_iter().next())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Question>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM generated_question WHERE id = ANY($1) ORDER BY created_at, id",
            QUESTION_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.with_answers(rows).await
    }

    async fn list(&self, request_id: Uuid, filter: &QuestionFilter) -> Result<Vec<Question>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM generated_question
             WHERE request_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::uuid IS NULL OR topic_id = $3)
               AND ($4::text IS NULL OR question_type = $4)
             ORDER BY created_at, id",
            QUESTION_COLUMNS
        ))
        .bind(request_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.topic_id)
        .bind(filter.question_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.with_answers(rows).await
    }

    async fn set_status(
        &self,
        ids: &[Uuid],
        to: QuestionStatus,
        allowed_from: &[QuestionStatus],
    ) -> Result<u64> {
        if ids.is_empty() || allowed_from.is_empty() {
            return Ok(0);
        }
        let allowed: Vec<&str> = allowed_from.iter().map(|s| s.as_str()).collect();

        let result = sqlx::query(
            "UPDATE generated_question
             SET status = $2, updated_at = NOW()
             WHERE id = ANY($1) AND status = ANY($3)",
        )
        .bind(ids)
        .bind(to.as_str())
        .bind(&allowed)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "questions",
            op = "set_status",
            status = %to,
            batch_size = ids.len(),
            result_count = result.rows_affected(),
            "Updated question statuses"
        );
        Ok(result.rows_affected())
    }

    async fn replace_draft(
        &self,
        id: Uuid,
        draft: &QuestionDraft,
        quality_score: f32,
        max_regenerations: u32,
    ) -> Result<Question> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "UPDATE generated_question
             SET question_type = $2, difficulty = $3, cognitive_level = $4, body = $5,
                 general_feedback = $6, ai_reasoning = $7, quality_score = $8,
                 status = 'pending', regeneration_count = regeneration_count + 1,
                 store_question_id = NULL, updated_at = NOW()
             WHERE id = $1 AND regeneration_count < $9 AND status <> 'deployed'
             RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .bind(draft.question_type.as_str())
        .bind(draft.difficulty.as_str())
        .bind(draft.cognitive_level.as_str())
        .bind(&draft.body)
        .bind(&draft.general_feedback)
        .bind(&draft.ai_reasoning)
        .bind(quality_score)
        .bind(max_regenerations as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(Error::Database)?;
            let current = sqlx::query(
                "SELECT status, regeneration_count FROM generated_question WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

            return Err(match current {
                None => Error::NotFound(format!("question {}", id)),
                Some(r) => {
                    let status: String = r.get("status");
                    let count: i32 = r.get("regeneration_count");
                    if status == QuestionStatus::Deployed.as_str() {
                        Error::Conflict(format!("question {} is already deployed", id))
                    } else {
                        Error::RegenerationLimitExceeded {
                            question_id: id,
                            count: count.max(0) as u32,
                            max: max_regenerations,
                        }
                    }
                }
            });
        };

        sqlx::query("DELETE FROM generated_answer WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let answers = answers_from_drafts(id, &draft.answers);
        Self::insert_answers_tx(&mut tx, &answers).await?;

        tx.commit().await.map_err(Error::Database)?;

        Self::parse_row(&row, answers)
    }

    async fn record_store_ids(&self, pairs: &[(Uuid, i64)]) -> Result<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = pairs.iter().map(|(id, _)| *id).collect();
        let store_ids: Vec<i64> = pairs.iter().map(|(_, s)| *s).collect();

        let result = sqlx::query(
            "UPDATE generated_question q
             SET store_question_id = p.store_id, updated_at = NOW()
             FROM UNNEST($1::uuid[], $2::int8[]) AS p(id, store_id)
             WHERE q.id = p.id",
        )
        .bind(&ids)
        .bind(&store_ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn reorder_answers(&self, question_id: Uuid, order: &[Uuid]) -> Result<()> {
        let existing: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM generated_answer WHERE question_id = $1")
                .bind(question_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        let existing: HashSet<Uuid> = existing.into_iter().collect();
        let requested: HashSet<Uuid> = order.iter().copied().collect();
        if requested.len() != order.len() || requested != existing {
            return Err(Error::Validation(format!(
                "answer order must list each of the question's {} answers exactly once",
                existing.len()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        sqlx::query(
            "UPDATE generated_answer a
             SET sort_order = (o.ord - 1)::int4
             FROM UNNEST($2::uuid[]) WITH ORDINALITY AS o(id, ord)
             WHERE a.id = o.id AND a.question_id = $1",
        )
        .bind(question_id)
        .bind(order)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        // The bank copy still has the old order; import again on deploy.
        sqlx::query(
            "UPDATE generated_question SET store_question_id = NULL, updated_at = NOW()
             WHERE id = $1 AND status <> 'deployed'",
        )
        .bind(question_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM generated_question WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn delete_for_request(&self, request_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM generated_question WHERE request_id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, request_id: Uuid) -> Result<StatusCounts> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM generated_question
             WHERE request_id = $1
             GROUP BY status",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut counts = StatusCounts::new();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.insert(status.parse()?, n.max(0) as u64);
        }
        Ok(counts)
    }
}
