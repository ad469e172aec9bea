//! PostgreSQL destination question bank.
//!
//! Stores imported questions as entry + reference + question + version +
//! answers + one type-specific payload row, and assembles quizzes from them.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Connection, PgConnection, Pool, Postgres, Row};
use tracing::{debug, warn};

use quizgen_core::{
    AttachOutcome, DestinationStore, Error, ImportOutcome, LinkageRecord, QuestionCapabilities,
    QuestionType, Result, StoreQuestion, StoreScope, VersionStatus,
};

const LINKAGE_SELECT: &str = "SELECT q.id AS store_question_id, q.qtype,
            e.category_id AS entry_category_id,
            r.category_id AS reference_category_id,
            CASE
                WHEN q.qtype IN ('multichoice', 'multiresponse', 'scenario') THEN mc.question_id IS NOT NULL
                WHEN q.qtype = 'truefalse' THEN tf.question_id IS NOT NULL
                WHEN q.qtype = 'shortanswer' THEN sa.question_id IS NOT NULL
                WHEN q.qtype = 'essay' THEN es.question_id IS NOT NULL
                WHEN q.qtype = 'matching' THEN ma.question_id IS NOT NULL
                ELSE FALSE
            END AS has_payload,
            COALESCE(v.status, 'draft') AS version_status
     FROM bank_question q
     JOIN bank_entry e ON e.id = q.entry_id
     LEFT JOIN bank_reference r ON r.entry_id = e.id
     LEFT JOIN bank_version v ON v.question_id = q.id
     LEFT JOIN bank_category rc ON rc.id = r.category_id
     LEFT JOIN bank_category ec ON ec.id = e.category_id
     LEFT JOIN bank_payload_multichoice mc ON mc.question_id = q.id
     LEFT JOIN bank_payload_truefalse tf ON tf.question_id = q.id
     LEFT JOIN bank_payload_shortanswer sa ON sa.question_id = q.id
     LEFT JOIN bank_payload_essay es ON es.question_id = q.id
     LEFT JOIN bank_payload_matching ma ON ma.question_id = q.id";

/// PostgreSQL implementation of DestinationStore.
#[derive(Clone)]
pub struct PgQuestionBank {
    pool: Pool<Postgres>,
}

impl PgQuestionBank {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_linkage(row: sqlx::postgres::PgRow) -> Result<LinkageRecord> {
        let status: String = row.get("version_status");
        Ok(LinkageRecord {
            store_question_id: row.get("store_question_id"),
            question_type: row.get("qtype"),
            entry_category_id: row.get("entry_category_id"),
            reference_category_id: row.get("reference_category_id"),
            has_payload: row.get("has_payload"),
            version_status: status.parse()?,
        })
    }
}

/// Write one question and all its dependent rows.
async fn import_one(conn: &mut PgConnection, category_id: i64, q: &StoreQuestion) -> Result<i64> {
    q.question_type.validate_answer_shape(&q.answers)?;

    let entry_id: i64 =
        sqlx::query_scalar("INSERT INTO bank_entry (category_id) VALUES ($1) RETURNING id")
            .bind(category_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::Database)?;

    sqlx::query("INSERT INTO bank_reference (entry_id, category_id) VALUES ($1, $2)")
        .bind(entry_id)
        .bind(category_id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

    let question_id: i64 = sqlx::query_scalar(
        "INSERT INTO bank_question (entry_id, qtype, name, body, general_feedback, source_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(entry_id)
    .bind(q.question_type.as_str())
    .bind(&q.name)
    .bind(&q.body)
    .bind(&q.general_feedback)
    .bind(q.source_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Database)?;

    let bodies: Vec<&str> = q.answers.iter().map(|a| a.body.as_str()).collect();
    let fractions: Vec<f64> = q.answers.iter().map(|a| a.weight).collect();
    let feedback: Vec<&str> = q.answers.iter().map(|a| a.feedback.as_str()).collect();
    let orders: Vec<i32> = (0..q.answers.len() as i32).collect();

    let answer_ids: Vec<i64> = sqlx::query_scalar(
        "INSERT INTO bank_answer (question_id, body, fraction, feedback, sort_order)
         SELECT $1, a.body, a.fraction, a.feedback, a.sort_order
         FROM UNNEST($2::text[], $3::float8[], $4::text[], $5::int4[])
              AS a(body, fraction, feedback, sort_order)
         ORDER BY a.sort_order
         RETURNING id",
    )
    .bind(question_id)
    .bind(&bodies)
    .bind(&fractions)
    .bind(&feedback)
    .bind(&orders)
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Database)?;

    insert_payload(conn, question_id, q, &answer_ids).await?;

    sqlx::query("INSERT INTO bank_version (question_id, version, status) VALUES ($1, 1, 'ready')")
        .bind(question_id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

    Ok(question_id)
}

async fn insert_payload(
    conn: &mut PgConnection,
    question_id: i64,
    q: &StoreQuestion,
    answer_ids: &[i64],
) -> Result<()> {
    let query = match q.question_type {
        QuestionType::MultipleChoice | QuestionType::MultipleResponse | QuestionType::Scenario => {
            sqlx::query("INSERT INTO bank_payload_multichoice (question_id, single) VALUES ($1, $2)")
                .bind(question_id)
                .bind(q.question_type.requires_unique_correct())
        }
        QuestionType::TrueFalse => {
            let find = |correct: bool| {
                q.answers
                    .iter()
                    .zip(answer_ids)
                    .find(|(a, _)| {
                        let label = if correct { "true" } else { "false" };
                        a.body.trim().eq_ignore_ascii_case(label)
                    })
                    .map(|(_, id)| *id)
            };
            sqlx::query(
                "INSERT INTO bank_payload_truefalse (question_id, true_answer_id, false_answer_id)
                 VALUES ($1, $2, $3)",
            )
            .bind(question_id)
            .bind(find(true))
            .bind(find(false))
        }
        QuestionType::ShortAnswer => {
            sqlx::query("INSERT INTO bank_payload_shortanswer (question_id) VALUES ($1)")
                .bind(question_id)
        }
        QuestionType::Essay => sqlx::query(
            "INSERT INTO bank_payload_essay (question_id, grader_info) VALUES ($1, $2)",
        )
        .bind(question_id)
        .bind(&q.general_feedback),
        QuestionType::Matching => {
            sqlx::query("INSERT INTO bank_payload_matching (question_id) VALUES ($1)")
                .bind(question_id)
        }
    };

    query.execute(&mut *conn).await.map_err(Error::Database)?;
    Ok(())
}

#[async_trait]
impl DestinationStore for PgQuestionBank {
    async fn ensure_category(&self, collection_id: i64, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO bank_category (collection_id, name) VALUES ($1, $2)
             ON CONFLICT (collection_id, name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id",
        )
        .bind(collection_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn import_questions(
        &self,
        category_id: i64,
        questions: &[StoreQuestion],
    ) -> Result<Vec<ImportOutcome>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut outcomes = Vec::with_capacity(questions.len());

        // Each question gets a savepoint so one bad item does not undo the rest.
        for q in questions {
            let mut savepoint = Connection::begin(&mut *tx).await.map_err(Error::Database)?;
            match import_one(&mut *savepoint, category_id, q).await {
                Ok(id) => {
                    savepoint.commit().await.map_err(Error::Database)?;
                    outcomes.push(ImportOutcome {
                        source_id: q.source_id,
                        result: Ok(id),
                    });
                }
                Err(e) => {
                    savepoint.rollback().await.map_err(Error::Database)?;
                    warn!(
                        subsystem = "db",
                        component = "question_bank",
                        op = "import_questions",
                        question_id = %q.source_id,
                        error = %e,
                        "Question import failed"
                    );
                    outcomes.push(ImportOutcome {
                        source_id: q.source_id,
                        result: Err(e.to_string()),
                    });
                }
            }
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "question_bank",
            op = "import_questions",
            batch_size = questions.len(),
            result_count = outcomes.iter().filter(|o| o.result.is_ok()).count(),
            "Imported questions"
        );
        Ok(outcomes)
    }

    async fn create_quiz(&self, collection_id: i64, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO bank_quiz (collection_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(collection_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn attach_to_quiz(
        &self,
        quiz_id: i64,
        store_question_ids: &[i64],
    ) -> Result<Vec<AttachOutcome>> {
        let quiz_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM bank_quiz WHERE id = $1")
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        if quiz_exists.is_none() {
            return Err(Error::NotFound(format!("quiz {}", quiz_id)));
        }

        let existing: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM bank_question WHERE id = ANY($1)")
                .bind(store_question_ids)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        let existing: HashSet<i64> = existing.into_iter().collect();
        let attachable: Vec<i64> = store_question_ids
            .iter()
            .copied()
            .filter(|id| existing.contains(id))
            .collect();

        if !attachable.is_empty() {
            sqlx::query(
                "INSERT INTO bank_quiz_slot (quiz_id, slot, question_id)
                 SELECT $1, base.next + u.ord - 1, u.question_id
                 FROM UNNEST($2::int8[]) WITH ORDINALITY AS u(question_id, ord),
                      (SELECT COALESCE(MAX(slot), 0) + 1 AS next
                       FROM bank_quiz_slot WHERE quiz_id = $1) AS base
                 ON CONFLICT (quiz_id, question_id) DO NOTHING",
            )
            .bind(quiz_id)
            .bind(&attachable)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        }

        Ok(store_question_ids
            .iter()
            .map(|id| AttachOutcome {
                store_question_id: *id,
                result: if existing.contains(id) {
                    Ok(())
                } else {
                    Err(format!("store question {} does not exist", id))
                },
            })
            .collect())
    }

    async fn linkage_records(&self, scope: &StoreScope) -> Result<Vec<LinkageRecord>> {
        let rows = match scope {
            StoreScope::Collection(collection_id) => sqlx::query(&format!(
                "{} WHERE rc.collection_id = $1 OR ec.collection_id = $1 ORDER BY q.id",
                LINKAGE_SELECT
            ))
            .bind(*collection_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?,
            StoreScope::Questions(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                sqlx::query(&format!("{} WHERE q.id = ANY($1) ORDER BY q.id", LINKAGE_SELECT))
                    .bind(ids)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(Error::Database)?
            }
        };

        rows.into_iter().map(Self::parse_linkage).collect()
    }

    async fn set_entry_category(
        &self,
        category_id: i64,
        store_question_ids: &[i64],
    ) -> Result<u64> {
        if store_question_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE bank_entry e
             SET category_id = $1
             FROM bank_question q
             WHERE q.entry_id = e.id AND q.id = ANY($2)
               AND e.category_id IS DISTINCT FROM $1",
        )
        .bind(category_id)
        .bind(store_question_ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn set_version_status(
        &self,
        store_question_ids: &[i64],
        status: VersionStatus,
    ) -> Result<u64> {
        if store_question_ids.is_empty() {
            return Ok(0);
        }
        // Upsert: a missing version row counts as draft.
        let result = sqlx::query(
            "INSERT INTO bank_version (question_id, status)
             SELECT id, $2::text FROM UNNEST($1::int8[]) AS id
             ON CONFLICT (question_id) DO UPDATE SET status = EXCLUDED.status
             WHERE bank_version.status <> EXCLUDED.status",
        )
        .bind(store_question_ids)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
