//! Job distribution for date extraction.
//!
//! - `actor`: bounded-mailbox actors and their addresses
//! - `system`: task tracking with broadcast shutdown
//! - `supervise`: restart loop with capped exponential backoff
//! - `job` / `broker`: jobs, the broker seam and the in-memory broker
//! - `queue`: the job queue actor that coalesces duplicate requests
//! - `worker`: lease, acquire, extract, then ack or retry
//! - `service`: [`DateService`], the caller-facing `extract(url, options)`
pub mod actor;
pub mod broker;
pub mod job;
pub mod queue;
pub mod service;
pub mod supervise;
pub mod system;
pub mod worker;

pub use broker::{Completion, InMemoryBroker, JobBroker};
pub use job::{Job, JobKey, JobOutcome};
pub use service::{DateService, DateServiceBuilder};
pub use worker::RetryPolicy;
