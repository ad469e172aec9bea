//! # quizgen-core
//!
//! Core types, traits, and algorithms for the quizgen generation-request
//! orchestrator.
//!
//! This crate holds the data model, the error type, the repository and
//! collaborator traits, and the pure algorithms (content fingerprinting, topic
//! normalization, quota allocation, request lifecycle) that the other quizgen
//! crates build on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod question_type;
pub mod quota;
pub mod topics;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, FailedItem, PartialFailure, Result};
pub use events::{EventBus, EventEnvelope, OrchestratorEvent};
pub use fingerprint::{fingerprint, DedupKey};
pub use models::*;
pub use question_type::{score_draft, QuestionCapabilities, QuestionType};
pub use quota::{
    allocate, plan_generation, validate_config, ConfigWarning, GenerationPlan, GenerationSlot,
    TopicShare,
};
pub use topics::{DedupPlan, TopicMerge};
pub use traits::*;
pub use uuid_utils::new_v7;
