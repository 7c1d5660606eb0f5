//! The worker side of the Conductor status protocol.
//!
//! Workers share nothing with the scheduler and never receive a call from
//! it: each worker polls its own durable record, treats a `Busy` record as
//! its assignment, executes through the resilience layer, and writes a
//! terminal status back. In-process memory is untrusted — the last durable
//! write is the only ground truth either side believes.
//!
//! # Main types
//!
//! - [`Worker`] — the polling loop, heartbeat, and terminal-status writes.
//! - [`ProcessExecutor`] — delegates actual work to an external handler process.

/// External handler process executor.
pub mod process;
/// The zero-trust worker loop.
pub mod worker;

pub use process::ProcessExecutor;
pub use worker::{Worker, WorkerConfig, WorkerEvent};
