//! Shared domain model for the Conductor orchestration core.
//!
//! Defines the task and agent types every other crate builds on, the durable
//! agent-status record that scheduler and workers communicate through, and
//! the [`StateStore`] abstraction over the durable store itself.
//!
//! # Main types
//!
//! - [`Task`] / [`TaskSpec`] — a unit of work with dependencies, priority and a required agent class.
//! - [`AgentRecord`] — the durable, field-owned status record of a single worker.
//! - [`StateStore`] — get/put contract for the shared store, with file-backed and in-memory impls.
//! - [`ConductorError`] — the error taxonomy shared across the workspace.

/// Agent identity, capability classes, and the durable status record.
pub mod agent;
/// Error taxonomy and result alias.
pub mod error;
/// Durable state store trait and implementations.
pub mod store;
/// Task model: identity, categories, priorities, lifecycle status.
pub mod task;

pub use agent::{AgentClass, AgentId, AgentRecord, AgentStatus};
pub use error::{ConductorError, ConductorResult};
pub use store::{FileStateStore, MemoryStateStore, SchedulerLease, StateStore};
pub use task::{Task, TaskCategory, TaskId, TaskPriority, TaskSpec, TaskStatus};
