//! Core of the flipmask tools: mask parsing, the backup-and-transform engine
//! and the supervised approval gate.
//!
//! The engine is synchronous and does blocking I/O; callers that live on an
//! async runtime should run it on a blocking thread.

pub mod ack;
pub mod approval;
pub mod engine;
pub mod error;
pub mod gate;
pub mod mask;

pub use ack::{AckError, Acknowledgement};
pub use approval::{ApprovalError, ApprovalRequest};
pub use engine::{
    BACKUP_SUFFIX, DEFAULT_CHUNK_SIZE, TransformEngine, TransformJob, TransformOptions,
    TransformReport, backup_path_for,
};
pub use error::{TransformError, exit_codes};
pub use gate::{ApprovalGate, GateOptions, GateOutcome, IgnoreReason, MarkerName, Rejection};
pub use mask::{MaskError, MaskMode, MaskSpec};
