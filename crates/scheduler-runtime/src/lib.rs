//! The scheduler engine: a bounded worker pool plus the three cooperating
//! control loops (due-polling, dead-detection, heartbeat) that drive a
//! `scheduler_core::ExecutionRepository`.
//!
//! Everything here is generic over the repository implementation — plug in
//! `scheduler-memory` for tests and single-node use, or `scheduler-postgres`
//! for a durable cluster-safe deployment.

mod config;
mod context;
mod error;
mod executing;
mod loop_dead;
mod loop_due;
mod loop_heartbeat;
mod metrics;
mod pool;
mod scheduler;
mod worker;

pub use self::config::Config;
pub use self::error::SchedulerError;
pub use self::scheduler::{Scheduler, SchedulerBuilder, SchedulerHandle};
