//! # EnrollBot Scheduler
//!
//! Persistent daily poll scheduler.
//!
//! - One recurring job per (user, request, pin), keyed by a deterministic id
//! - SQLite persistence, so the job set survives restarts
//! - Missed firings are never replayed; jobs resume at their next firing
//! - At most one in-flight run per job id; overlapping firings are skipped
//!
//! ## Architecture
//! ```text
//! spawn_scheduler (tokio interval)
//!   └── SchedulerEngine::take_due
//!         ├── "42_1111/0000_123456_parse_job"  0 18 * * *
//!         └── on fire → JobRunner::run (fetch → compare → notify)
//! ```

pub mod cron;
pub mod engine;
pub mod jobs;
pub mod persistence;

pub use cron::CronTrigger;
pub use engine::{JobRunner, SchedulerEngine, spawn_scheduler};
pub use jobs::{PollJob, job_id};
pub use persistence::SchedulerDb;
