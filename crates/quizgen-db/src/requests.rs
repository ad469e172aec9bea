//! Generation request repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use quizgen_core::{
    new_v7, ContentSource, CreateRequest, DedupKey, Error, GenerationConfig, GenerationRequest,
    RequestRepository, RequestStatus, Result,
};

const REQUEST_COLUMNS: &str = "id, owner_id, collection_id, status, content_hash, content_sources,
     configuration, error, reused_from, created_at, updated_at, completed_at";

/// PostgreSQL implementation of RequestRepository.
#[derive(Clone)]
pub struct PgRequestRepository {
    pool: Pool<Postgres>,
}

impl PgRequestRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<GenerationRequest> {
        let status: String = row.get("status");
        let sources: serde_json::Value = row.get("content_sources");
        let configuration: Option<serde_json::Value> = row.get("configuration");

        Ok(GenerationRequest {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            collection_id: row.get("collection_id"),
            status: status.parse()?,
            content_hash: row.get("content_hash"),
            content_sources: serde_json::from_value::<Vec<ContentSource>>(sources)?,
            configuration: configuration
                .map(serde_json::from_value::<GenerationConfig>)
                .transpose()?,
            error: row.get("error"),
            reused_from: row.get("reused_from"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl RequestRepository for PgRequestRepository {
    async fn insert(&self, req: CreateRequest) -> Result<GenerationRequest> {
        let id = new_v7();
        let now = Utc::now();
        let sources = serde_json::to_value(&req.content_sources)?;

        let row = sqlx::query(&format!(
            "INSERT INTO generation_request
                 (id, owner_id, collection_id, status, content_hash, content_sources,
                  reused_from, created_at, updated_at)
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $7)
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .bind(req.owner_id)
        .bind(req.collection_id)
        .bind(&req.content_hash)
        .bind(sources)
        .bind(req.reused_from)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_row(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM generation_request WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn find_reusable(&self, key: &DedupKey) -> Result<Option<GenerationRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM generation_request r
             WHERE r.owner_id = $1 AND r.collection_id = $2 AND r.content_hash = $3
               AND r.status = 'completed' AND r.created_at >= $4
               AND EXISTS (SELECT 1 FROM generation_topic t WHERE t.request_id = r.id)
             ORDER BY r.created_at DESC
             LIMIT 1",
            REQUEST_COLUMNS
        ))
        .bind(key.owner_id)
        .bind(key.collection_id)
        .bind(&key.content_hash)
        .bind(key.not_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn save_transition(
        &self,
        request: &GenerationRequest,
        expected: RequestStatus,
    ) -> Result<()> {
        let configuration = request
            .configuration
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let result = sqlx::query(
            "UPDATE generation_request
             SET status = $2, error = $3, configuration = $4, updated_at = $5, completed_at = $6
             WHERE id = $1 AND status = $7",
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(&request.error)
        .bind(configuration)
        .bind(request.updated_at)
        .bind(request.completed_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM generation_request WHERE id = $1")
                .bind(request.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;

        match current {
            None => Err(Error::NotFound(format!("request {}", request.id))),
            Some(status) => Err(Error::Conflict(format!(
                "request {} is {}, expected {}",
                request.id, status, expected
            ))),
        }
    }

    async fn list_for_collection(&self, collection_id: i64) -> Result<Vec<GenerationRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM generation_request
             WHERE collection_id = $1
             ORDER BY created_at DESC",
            REQUEST_COLUMNS
        ))
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_row).collect()
    }
}
