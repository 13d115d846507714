//! Slurm integration: accounting queries, node state, and job control.
//!
//! Everything the gateway knows about jobs and nodes is derived live from
//! the scheduler's command-line tools:
//! - **Accounting**: `sacct` pipe-delimited rows parsed into [`Job`] records,
//!   served through a short-TTL cache
//! - **Nodes**: `scontrol show nodes` blocks parsed into [`NodeRecord`]s
//! - **Control**: `sbatch` submission and `scancel` cancellation
//!
//! The CLI sits behind the [`SchedulerClient`] trait so a native scheduler
//! API could replace the subprocess calls without touching callers.

pub mod accounting;
pub mod client;
pub mod nodes;
pub mod types;

pub use accounting::{JobCatalog, JobNode};
pub use client::{SchedulerClient, SlurmCli, SubmitOptions};
pub use nodes::{NodeRecord, NodeRegistry};
pub use types::{BatchStep, Job, JobState};
