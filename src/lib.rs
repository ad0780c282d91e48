//! # Prometheus Gatekeeper
//!
//! Capacity-aware task scheduling against named, rate-limited resources.
//!
//! Remote services and worker slots tolerate only so many concurrent
//! requests. This crate sits between callers and those resources and keeps
//! every resource inside its limits while absorbing failures:
//!
//! - **Admission queues**: one bounded priority queue per resource; tasks run
//!   only while the in-flight count is below the resource's concurrency
//!   limit, and a completion immediately admits the next waiting task.
//! - **Retry executor**: each task runs with a per-attempt timeout, a
//!   cancellation contract and exponential backoff for transient failures.
//! - **Circuit breakers**: resources in sustained failure are suspended and
//!   retried with trial calls after a cool-down.
//! - **Health monitor**: periodic worst-of-all assessment of success ratios
//!   and breaker states, published as change events.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_gatekeeper::builders::SchedulerBuilder;
//! use prometheus_gatekeeper::core::{Priority, SubmitOptions};
//! use prometheus_gatekeeper::runtime::TokioSpawner;
//!
//! let scheduler = SchedulerBuilder::new(Arc::new(MyInvoker))
//!     .resource("inference", 2, 100)
//!     .build(TokioSpawner::current())?;
//!
//! let handle = scheduler.submit(
//!     "inference",
//!     request,
//!     SubmitOptions::with_priority(Priority::High),
//! )?;
//! let reply = handle.await?;
//!
//! scheduler.shutdown_default().await;
//! ```
//!
//! Work itself is performed by a [`core::WorkInvoker`] supplied by the
//! caller; the scheduler never looks inside payloads.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Configuration models for resources, retries, breakers and health.
pub mod config;
/// Scheduling core: queues, retries, breakers, metrics, health.
pub mod core;
/// Infrastructure adapters for queue storage.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::SchedulerBuilder;
pub use crate::config::SchedulerConfig;
pub use crate::core::{
    CompletionHandle, InvokeError, Priority, Scheduler, SchedulerError, SubmitOptions, WorkInvoker,
};
pub use crate::runtime::TokioSpawner;
