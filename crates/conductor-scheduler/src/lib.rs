//! Dependency-aware scheduling loop for the Conductor orchestration core.
//!
//! The scheduler owns the task graph and is the sole writer of task state
//! and of agent assignment fields. Each pass it reconciles worker status
//! records, computes the ready set, assigns ready tasks to idle matching
//! agents, and persists the task set — coordination happens only through
//! the durable store, never by calling a worker.
//!
//! # Main types
//!
//! - [`TaskGraph`] — dependency resolution with cycle rejection at build time.
//! - [`Scheduler`] — the reconcile/assign loop with staleness detection and a leader lease.
//! - [`RunReport`] — the final summary, listing every failed task with its message.

/// Task graph and readiness computation.
pub mod graph;
/// Final run summary.
pub mod report;
/// The scheduling loop.
pub mod scheduler;

pub use graph::TaskGraph;
pub use report::{FailedTask, RunReport};
pub use scheduler::{Scheduler, SchedulerConfig};
