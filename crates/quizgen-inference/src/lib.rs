//! # quizgen-inference
//!
//! AI gateway client for quizgen.
//!
//! This crate provides:
//! - `GatewayBackend`, an HTTP client implementing both `AnalysisBackend` and
//!   `GenerationBackend` against the AI gateway
//! - Lenient parsing of model JSON (markdown fences, surrounding prose)
//! - A deterministic mock backend (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable `MockGenerationBackend` outside this crate's own tests
//!
//! # Example
//!
//! ```rust,no_run
//! use quizgen_inference::{AnalysisBackend, GatewayBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = GatewayBackend::from_env().unwrap();
//!     let topics = backend.analyze("Cells are the basic unit of life.").await.unwrap();
//!     println!("{} topics", topics.len());
//! }
//! ```

pub mod config;
pub mod gateway;
pub mod parse;
mod wire;

// Mock AI backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use quizgen_core::*;

pub use config::GatewayConfig;
pub use gateway::{GatewayBackend, GatewayHealth};
pub use parse::{json_from_text, normalize_content, strip_fences};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockGenerationBackend;
