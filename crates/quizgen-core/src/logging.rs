//! Structured logging schema and field name constants for quizgen.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query every subsystem by the same names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue (failed generation slot, soft config warning) |
//! | INFO  | Lifecycle transitions, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (individual slots, answers) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "orchestrator", "db", "inference", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "intake", "lifecycle", "review", "deployment", "repair", "gateway"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create_request", "configure_and_generate", "bulk_approve"
pub const OPERATION: &str = "op";

/// Acting host user id.
pub const ACTOR_ID: &str = "actor_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Generation request UUID being operated on.
pub const REQUEST_ID: &str = "request_id";

/// Topic UUID being operated on.
pub const TOPIC_ID: &str = "topic_id";

/// Question UUID being operated on.
pub const QUESTION_ID: &str = "question_id";

/// Host collection (course) id.
pub const COLLECTION_ID: &str = "collection_id";

/// Request status after a transition.
pub const STATUS: &str = "status";

/// Content fingerprint of a request.
pub const CONTENT_HASH: &str = "content_hash";

/// Question type of a generation slot.
pub const QUESTION_TYPE: &str = "question_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned or rows affected.
pub const RESULT_COUNT: &str = "result_count";

/// Number of ids in a batched operation.
pub const BATCH_SIZE: &str = "batch_size";

/// Byte length of a prompt payload.
pub const PROMPT_LEN: &str = "prompt_len";

/// Number of planned generation slots.
pub const SLOT_COUNT: &str = "slot_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Number of store writes issued by a repair.
pub const WRITES: &str = "writes";
