//! Core types and error definitions for the EVOX agent fleet.
//!
//! This crate provides the entities shared by every EVOX crate: the store
//! contract, the dispatch engine and the reporting layer all speak in terms of
//! these records.
//!
//! # Main types
//!
//! - [`EvoxError`] — Unified error enum for all EVOX subsystems.
//! - [`EvoxResult`] — Convenience alias for `Result<T, EvoxError>`.
//! - [`ErrorKind`] — Coarse classification callers branch on.
//! - [`Agent`] — A worker with a role, a live status and an optional current task.
//! - [`Task`] — A prioritized unit of work in the queue.
//! - [`Dispatch`] — Audit/control record of one assignment.
//! - [`ActivityEvent`] — Immutable audit-log entry with a typed [`ActivityKind`].
//! - [`Learning`] — Note about past work, used to enrich spawned agents.
//! - [`AgentMapping`] — Stable canonical identity pointing at an agent record.

/// Activity log entries and their typed payloads.
pub mod activity;
/// Agents, roles and statuses.
pub mod agent;
/// Dispatch records.
pub mod dispatch;
/// Learnings and canonical agent mappings.
pub mod learning;
/// Tasks, priorities and task statuses.
pub mod task;

pub use activity::{ActivityCategory, ActivityEvent, ActivityKind, DispatchSource};
pub use agent::{Agent, AgentRole, AgentStatus};
pub use dispatch::{Dispatch, DispatchPayload, DispatchStatus, WORK_ON_TASK};
pub use learning::{AgentMapping, Learning};
pub use task::{Task, TaskPriority, TaskStatus};

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the EVOX fleet.
#[derive(Debug, thiserror::Error)]
pub enum EvoxError {
    /// An agent, task, dispatch or role lookup came back empty.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record is in a state that does not permit the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A concurrent writer got there first, or a uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Nothing left to hand out.
    #[error("Exhausted: {0}")]
    Exhausted(String),

    /// A configured cap (e.g. agents per role) has been reached.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The autoscaler was asked to spawn a role with no template.
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Malformed input (unknown status names, bad timestamps, ...).
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// The store was asked to do something that would break referential integrity.
    #[error("Store integrity violation: {0}")]
    Integrity(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`EvoxError`].
pub type EvoxResult<T> = Result<T, EvoxError>;

/// Coarse error classification shared by structured results and [`EvoxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Agent, task or role absent.
    NotFound,
    /// Agent busy/offline when idleness is required.
    InvalidState,
    /// A running dispatch or a concurrent commit already claimed the agent.
    Conflict,
    /// No eligible task.
    Exhausted,
    /// Role spawn cap reached.
    CapacityExceeded,
    /// Unexpected store, config or I/O failure.
    Fatal,
}

impl EvoxError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvoxError::NotFound(_) | EvoxError::UnknownRole(_) => ErrorKind::NotFound,
            EvoxError::InvalidState(_) | EvoxError::Invalid(_) => ErrorKind::InvalidState,
            EvoxError::Conflict(_) => ErrorKind::Conflict,
            EvoxError::Exhausted(_) => ErrorKind::Exhausted,
            EvoxError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            EvoxError::Integrity(_)
            | EvoxError::Config(_)
            | EvoxError::Json(_)
            | EvoxError::Io(_) => ErrorKind::Fatal,
        }
    }

    /// Whether this error must abort the surrounding operation instead of
    /// being recorded and skipped.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}
