//! Builders to construct a scheduler from configuration.

/// Fluent scheduler builder.
pub mod scheduler_builder;

pub use scheduler_builder::SchedulerBuilder;
