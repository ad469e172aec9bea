//! Topic repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use quizgen_core::{new_v7, Error, NewTopic, Result, Topic, TopicMerge, TopicRepository};

const TOPIC_COLUMNS: &str = "id, request_id, title, description, content_excerpt,
     learning_objectives, level, sort_order, selected, quota";

/// PostgreSQL implementation of TopicRepository.
#[derive(Clone)]
pub struct PgTopicRepository {
    pool: Pool<Postgres>,
}

impl PgTopicRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<Topic> {
        let objectives: serde_json::Value = row.get("learning_objectives");
        let quota: i32 = row.get("quota");
        Ok(Topic {
            id: row.get("id"),
            request_id: row.get("request_id"),
            title: row.get("title"),
            description: row.get("description"),
            content_excerpt: row.get("content_excerpt"),
            learning_objectives: serde_json::from_value(objectives)?,
            level: row.get("level"),
            sort_order: row.get("sort_order"),
            selected: row.get("selected"),
            quota: quota.max(0) as u32,
        })
    }
}

#[async_trait]
impl TopicRepository for PgTopicRepository {
    async fn insert_many(&self, request_id: Uuid, topics: Vec<NewTopic>) -> Result<Vec<Topic>> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let next_order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM generation_topic WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

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

        let ids: Vec<Uuid> = created.iter().map(|t| t.id).collect();
        let titles: Vec<&str> = created.iter().map(|t| t.title.as_str()).collect();
        let descriptions: Vec<&str> = created.iter().map(|t| t.description.as_str()).collect();
        let excerpts: Vec<&str> = created.iter().map(|t| t.content_excerpt.as_str()).collect();
        let objectives = created
            .iter()
            .map(|t| serde_json::to_string(&t.learning_objectives))
            .collect::<std::result::Result<Vec<String>, _>>()?;
        let levels: Vec<i16> = created.iter().map(|t| t.level).collect();
        let orders: Vec<i32> = created.iter().map(|t| t.sort_order).collect();
        let selected: Vec<bool> = created.iter().map(|t| t.selected).collect();
        let quotas: Vec<i32> = created.iter().map(|t| t.quota as i32).collect();

        sqlx::query(
            "INSERT INTO generation_topic
                 (id, request_id, title, description, content_excerpt, learning_objectives,
                  level, sort_order, selected, quota)
             SELECT t.id, $1, t.title, t.description, t.excerpt, t.objectives::jsonb,
                    t.level, t.sort_order, t.selected, t.quota
             FROM UNNEST($2::uuid[], $3::text[], $4::text[], $5::text[], $6::text[],
                         $7::int2[], $8::int4[], $9::bool[], $10::int4[])
                  AS t(id, title, description, excerpt, objectives, level, sort_order, selected, quota)",
        )
        .bind(request_id)
        .bind(&ids)
        .bind(&titles)
        .bind(&descriptions)
        .bind(&excerpts)
        .bind(&objectives)
        .bind(&levels)
        .bind(&orders)
        .bind(&selected)
        .bind(&quotas)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "topics",
            op = "insert_many",
            request_id = %request_id,
            result_count = created.len(),
            "Inserted topics"
        );
        Ok(created)
    }

    async fn list(&self, request_id: Uuid) -> Result<Vec<Topic>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM generation_topic WHERE request_id = $1 ORDER BY sort_order, id",
            TOPIC_COLUMNS
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn set_selection(&self, request_id: Uuid, selected: &[Uuid]) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE generation_topic
             SET selected = (id = ANY($2)),
                 quota = CASE WHEN id = ANY($2) THEN quota ELSE 0 END
             WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(selected)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn set_quotas(&self, request_id: Uuid, quotas: &[(Uuid, u32)]) -> Result<u64> {
        if quotas.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = quotas.iter().map(|(id, _)| *id).collect();
        let values: Vec<i32> = quotas.iter().map(|(_, q)| *q as i32).collect();

        let result = sqlx::query(
            "UPDATE generation_topic t
             SET quota = q.quota
             FROM UNNEST($2::uuid[], $3::int4[]) AS q(id, quota)
             WHERE t.id = q.id AND t.request_id = $1",
        )
        .bind(request_id)
        .bind(&ids)
        .bind(&values)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn apply_merges(&self, request_id: Uuid, merges: &[TopicMerge]) -> Result<()> {
        if merges.is_empty() {
            return Ok(());
        }

        let mut absorbed: Vec<Uuid> = Vec::new();
        let mut absorbed_into: Vec<Uuid> = Vec::new();
        for merge in merges {
            for id in &merge.absorb {
                absorbed.push(*id);
                absorbed_into.push(merge.keep);
            }
        }
        let keep_ids: Vec<Uuid> = merges.iter().map(|m| m.keep).collect();
        let titles: Vec<&str> = merges.iter().map(|m| m.title.as_str()).collect();
        let excerpts: Vec<&str> = merges.iter().map(|m| m.content_excerpt.as_str()).collect();
        let objectives = merges
            .iter()
            .map(|m| serde_json::to_string(&m.learning_objectives))
            .collect::<std::result::Result<Vec<String>, _>>()?;
        let quotas: Vec<i32> = merges.iter().map(|m| m.quota as i32).collect();
        let selected: Vec<bool> = merges.iter().map(|m| m.selected).collect();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // 1. Reassign questions of absorbed topics.
        let reassigned = sqlx::query(
            "UPDATE generated_question q
             SET topic_id = m.keep, updated_at = NOW()
             FROM UNNEST($1::uuid[], $2::uuid[]) AS m(absorbed, keep)
             WHERE q.topic_id = m.absorbed AND q.request_id = $3",
        )
        .bind(&absorbed)
        .bind(&absorbed_into)
        .bind(request_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        // 2. Update kept topics.
        sqlx::query(
            "UPDATE generation_topic t
             SET title = m.title, content_excerpt = m.excerpt,
                 learning_objectives = m.objectives::jsonb,
                 quota = m.quota, selected = m.selected
             FROM UNNEST($2::uuid[], $3::text[], $4::text[], $5::text[], $6::int4[], $7::bool[])
                  AS m(id, title, excerpt, objectives, quota, selected)
             WHERE t.id = m.id AND t.request_id = $1",
        )
        .bind(request_id)
        .bind(&keep_ids)
        .bind(&titles)
        .bind(&excerpts)
        .bind(&objectives)
        .bind(&quotas)
        .bind(&selected)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        // 3. Delete absorbed topics only after their questions moved.
        sqlx::query("DELETE FROM generation_topic WHERE request_id = $1 AND id = ANY($2)")
            .bind(request_id)
            .bind(&absorbed)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "topics",
            op = "apply_merges",
            request_id = %request_id,
            batch_size = absorbed.len(),
            result_count = reassigned,
            "Merged topics"
        );
        Ok(())
    }

    async fn rename(&self, request_id: Uuid, topic_id: Uuid, title: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE generation_topic SET title = $3 WHERE id = $2 AND request_id = $1")
                .bind(request_id)
                .bind(topic_id)
                .bind(title)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("topic {}", topic_id)));
        }
        Ok(())
    }

    async fn delete_many(&self, request_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM generation_topic WHERE request_id = $1 AND id = ANY($2)")
            .bind(request_id)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn delete_for_request(&self, request_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM generation_topic WHERE request_id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
