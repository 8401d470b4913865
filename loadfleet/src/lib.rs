//! Master side of the loadfleet distributed load-test coordinator.
//!
//! The [`pool::WorkerPool`] submits one test specification to every slave in
//! the fleet, probes each slave's `/remote/state` for liveness every ping
//! period, merges the progress reports the slaves push back into a single
//! [`loadfleet_api::Registry`], and fires a completion callback exactly once
//! when every slave has reached a terminal state. Interval reports from
//! different slaves are coalesced behind a short progress window so the
//! fleet reads like one machine.

pub mod config;
mod conn;
pub mod pool;
pub mod report;
pub mod server;

pub use pool::{PoolHandle, PoolOptions, WorkerPool};
pub use report::{LogSink, ReportSink};
