//! Routing and hybrid execution for the Conductor orchestration core.
//!
//! The router turns task definitions into schedulable tasks by deciding,
//! per task, the cheapest capable agent class; the hybrid executor fans a
//! task out to both classes concurrently and merges their results per
//! category.
//!
//! # Main types
//!
//! - [`Router`] — ordered rule table mapping a task spec to an agent class.
//! - [`HybridExecutor`] — two-branch fan-out with wait-all / tolerate-partial join.
//! - [`TaskExecutor`] — the boundary trait the external work hides behind.
//! - [`aggregate`] — per-category merging of hybrid candidates.

/// Per-category merging of hybrid candidates.
pub mod aggregate;
/// Execution boundary types shared with workers.
pub mod executor;
/// Two-class concurrent fan-out.
pub mod hybrid;
/// Agent-class routing rules.
pub mod router;

pub use aggregate::{aggregate, Candidate, HybridResult};
pub use executor::{
    ExecutionOutcome, IssueSeverity, OutcomeStatus, ReviewIssue, ReviewReport, TaskExecutor,
};
pub use hybrid::HybridExecutor;
pub use router::{Router, RouterConfig};
