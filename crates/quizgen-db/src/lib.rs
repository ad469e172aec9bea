//! # quizgen-db
//!
//! PostgreSQL persistence for the quizgen orchestrator.
//!
//! This crate provides:
//! - Connection pool management
//! - Repositories for generation requests, topics, questions and answers
//! - A PostgreSQL destination question bank (categories, versions, quizzes)
//! - In-memory implementations of all of the above for tests and embedding
//!
//! ## Example
//!
//! ```rust,ignore
//! use quizgen_db::{Database, RequestRepository};
//!
//! let db = Database::connect("postgres://localhost/quizgen").await?;
//! let requests = db.requests.list_for_collection(42).await?;
//! ```

pub mod memory;
pub mod pool;
pub mod question_bank;
pub mod questions;
pub mod requests;
pub mod test_fixtures;
pub mod topics;

// Re-export core types
pub use quizgen_core::*;

pub use memory::{BankRecord, MemoryQuestionBank, MemoryRepository};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use question_bank::PgQuestionBank;
pub use questions::PgQuestionRepository;
pub use requests::PgRequestRepository;
pub use topics::PgTopicRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Generation request repository.
    pub requests: PgRequestRepository,
    /// Topic repository.
    pub topics: PgTopicRepository,
    /// Generated question and answer repository.
    pub questions: PgQuestionRepository,
    /// Destination question bank.
    pub bank: PgQuestionBank,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            requests: PgRequestRepository::new(pool.clone()),
            topics: PgTopicRepository::new(pool.clone()),
            questions: PgQuestionRepository::new(pool.clone()),
            bank: PgQuestionBank::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
