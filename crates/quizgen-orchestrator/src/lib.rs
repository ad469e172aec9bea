//! # quizgen-orchestrator
//!
//! Generation request lifecycle orchestrator.
//!
//! This crate provides:
//! - Request intake with content fingerprinting and dedup reuse
//! - Topic selection, merging, renaming and deduplication
//! - Quota allocation and inline, budgeted question generation
//! - The review workflow (approve, reject, bulk actions, regeneration)
//! - Deployment into the destination question bank, with diagnose and repair
//! - Administrative reset and status reporting
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quizgen_orchestrator::{Actor, GenerationControl, Orchestrator, OrchestratorConfig};
//! use quizgen_db::Database;
//! use quizgen_inference::GatewayBackend;
//!
//! let db = Database::connect("postgres://...").await?;
//! let orchestrator = Orchestrator::builder()
//!     .with_database(&db)
//!     .with_ai(Arc::new(GatewayBackend::from_env()?))
//!     .with_config(OrchestratorConfig::from_env())
//!     .build()?;
//!
//! let actor = Actor::user(7);
//! let request = orchestrator.create_request(&actor, 42, inputs).await?;
//! let topics = orchestrator.list_topics(&actor, request.id).await?;
//! let ids: Vec<_> = topics.iter().map(|t| t.id).collect();
//! orchestrator
//!     .configure_and_generate(&actor, request.id, config, &ids, &GenerationControl::new())
//!     .await?;
//! ```

pub mod access;
pub mod admin;
pub mod config;
pub mod deployment;
pub mod extraction;
pub mod generation;
pub mod intake;
pub mod orchestrator;
pub mod repair;
pub mod review;
pub mod topics;

// Re-export core types
pub use quizgen_core::*;

pub use access::{AllowAllPolicy, CollectionGrantPolicy};
pub use admin::RequestStatusReport;
pub use config::OrchestratorConfig;
pub use deployment::{DeploymentReport, DeploymentTarget};
pub use extraction::{
    combine_sections, html_to_text, ExtractionRegistry, ManualTextExtractor, UrlExtractor,
};
pub use generation::{
    ConfigureOutcome, DiscardedDraft, GenerationControl, GenerationReport, SlotFailure,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use repair::{DiagnoseScope, DiagnosticReport, QuestionDiagnosis, RepairReport};
