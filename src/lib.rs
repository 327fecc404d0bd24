//! DRS Orchestrator — coordinates multi-wave AWS Elastic Disaster Recovery
//! executions: Protection Groups and Recovery Plans in, a supervised,
//! resumable Execution state machine out.
//!
//! See `domain` for the entity model, `gateway` for the external command
//! surface, `supervisor` for the per-execution state machine, `wave_runner`
//! and `poller` for wave fan-out and DRS job polling, `store` for the
//! persistence seam everything above is written against, and `job_logs`
//! for the read-only `GetJobLogs` query.

pub mod audit;
pub mod clock;
pub mod common;
pub mod config;
pub mod credentials;
pub mod demo;
pub mod domain;
pub mod drs;
pub mod error;
pub mod events;
pub mod gateway;
pub mod job_logs;
pub mod orchestration;
pub mod poller;
pub mod repository;
pub mod store;
pub mod supervisor;
pub mod wave_runner;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{EngineError, Result};
