//! JSON bodies exchanged over the `/remote` protocol.
//!
//! All structured bodies are camelCase on the wire. `/remote/state` and
//! `/remote/stop` carry empty bodies and do not appear here.

use serde::{Deserialize, Serialize};

use crate::stats::Sketch;

fn default_concurrency() -> u32 {
    1
}

fn default_report_interval_ms() -> u64 {
    2000
}

/// A structured load-test specification.
///
/// The `generator` field names a request generator registered in the slave's
/// local catalog; the slave resolves it before starting and rejects unknown
/// identifiers. No code travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    pub name: String,
    pub generator: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_rps: Option<f64>,
    /// How often the slave pushes progress to the master.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

/// Body of `POST /remote`: assigns the slave its identity, tells it where to
/// push progress, and hands it the spec to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub slave_id: String,
    /// `host:port` the slave uses to reach the master.
    pub master: String,
    pub spec: TestSpec,
}

/// One named statistic inside a progress report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSnapshot {
    pub name: String,
    #[serde(default)]
    pub add_to_http_report: bool,
    pub interval: Sketch,
}

/// Body of `POST /remote/progress`: everything one slave observed during its
/// last report interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatReport {
    pub slave_id: String,
    pub stats: Vec<StatSnapshot>,
}
