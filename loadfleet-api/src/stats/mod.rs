//! Mergeable statistics sketches.
//!
//! Every sketch is a plain value type with the same five operations: record a
//! sample, clear, summarize, merge another observation of the same kind, and
//! serialize itself as its own wire snapshot. Merging is commutative and
//! associative over partial observations with compatible parameters, so
//! reports from distinct slaves can be combined in any order.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

mod histogram;

pub use histogram::{Histogram, HistogramParams, DEFAULT_NUM_BUCKETS};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn elapsed_secs(start_millis: u64) -> f64 {
    now_millis().saturating_sub(start_millis) as f64 / 1000.0
}

fn rate_per_sec(count: u64, start_millis: u64) -> f64 {
    let elapsed = elapsed_secs(start_millis);
    if elapsed <= 0.0 {
        return 0.0;
    }
    count as f64 / elapsed
}

/// A single observation delivered to a sketch.
///
/// Numeric sketches consume [`Sample::Value`]; the keyed multisets consume
/// [`Sample::Key`]. A sample of the wrong shape for a sketch is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Value(f64),
    Key(String),
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::Value(value)
    }
}

impl From<u64> for Sample {
    fn from(value: u64) -> Self {
        Sample::Value(value as f64)
    }
}

impl From<&str> for Sample {
    fn from(key: &str) -> Self {
        Sample::Key(key.to_string())
    }
}

impl From<String> for Sample {
    fn from(key: String) -> Self {
        Sample::Key(key)
    }
}

/// Running total and count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accumulator {
    total: f64,
    length: u64,
}

impl Accumulator {
    pub fn record(&mut self, value: f64) {
        self.total += value;
        self.length += 1;
    }

    pub fn clear(&mut self) {
        self.total = 0.0;
        self.length = 0;
    }

    pub fn merge(&mut self, other: &Accumulator) {
        self.total += other.total;
        self.length += other.length;
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({ "total": self.total, "length": self.length })
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// Keyed multiset of outcomes, e.g. HTTP status codes, with the request rate
/// since the counter was started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsCounter {
    items: BTreeMap<String, u64>,
    start: u64,
    length: u64,
}

impl Default for ResultsCounter {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            start: now_millis(),
            length: 0,
        }
    }
}

impl ResultsCounter {
    pub fn record(&mut self, key: &str) {
        *self.items.entry(key.to_string()).or_insert(0) += 1;
        self.length += 1;
    }

    /// Drops the per-key counts but keeps `start`: the reported rate is
    /// requests per second since the counter began, not since the last clear.
    pub fn clear(&mut self) {
        self.items.clear();
        self.length = 0;
    }

    pub fn merge(&mut self, other: &ResultsCounter) {
        for (key, count) in &other.items {
            *self.items.entry(key.clone()).or_insert(0) += count;
        }
        self.start = self.start.min(other.start);
        self.length += other.length;
    }

    pub fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        for (key, count) in &self.items {
            summary.insert(key.clone(), (*count).into());
        }
        summary.insert("total".into(), self.length.into());
        summary.insert("rps".into(), rate_per_sec(self.length, self.start).into());
        summary.into()
    }

    pub fn count(&self, key: &str) -> u64 {
        self.items.get(key).copied().unwrap_or(0)
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// Keyed multiset that additionally tracks how many distinct keys were seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Uniques {
    items: BTreeMap<String, u64>,
    uniqs: u64,
    length: u64,
}

impl Uniques {
    pub fn record(&mut self, key: &str) {
        let count = self.items.entry(key.to_string()).or_insert(0);
        if *count == 0 {
            self.uniqs += 1;
        }
        *count += 1;
        self.length += 1;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.uniqs = 0;
        self.length = 0;
    }

    pub fn merge(&mut self, other: &Uniques) {
        for (key, count) in &other.items {
            let mine = self.items.entry(key.clone()).or_insert(0);
            if *mine == 0 {
                self.uniqs += 1;
            }
            *mine += count;
        }
        self.length += other.length;
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({ "total": self.length, "uniqs": self.uniqs })
    }

    pub fn uniqs(&self) -> u64 {
        self.uniqs
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// Running maximum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Peak {
    peak: f64,
    length: u64,
}

impl Peak {
    pub fn record(&mut self, value: f64) {
        if value > self.peak {
            self.peak = value;
        }
        self.length += 1;
    }

    pub fn clear(&mut self) {
        self.peak = 0.0;
        self.length = 0;
    }

    pub fn merge(&mut self, other: &Peak) {
        if other.peak > self.peak {
            self.peak = other.peak;
        }
        self.length += other.length;
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({ "max": self.peak })
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// Sample count divided by wall time elapsed since the sketch was started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rate {
    start: u64,
    length: u64,
}

impl Default for Rate {
    fn default() -> Self {
        Self {
            start: now_millis(),
            length: 0,
        }
    }
}

impl Rate {
    pub fn record(&mut self) {
        self.length += 1;
    }

    pub fn clear(&mut self) {
        self.start = now_millis();
        self.length = 0;
    }

    pub fn merge(&mut self, other: &Rate) {
        self.start = self.start.min(other.start);
        self.length += other.length;
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({ "rps": rate_per_sec(self.length, self.start) })
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// The tagged union of all sketch kinds.
///
/// This type is both the in-memory sketch and its wire snapshot: serializing
/// a `Sketch` produces the `{"type": ..., ...state}` object shipped in
/// progress reports, and deserializing one reconstructs the sketch. An
/// unrecognized `type` tag fails at deserialization, which the protocol layer
/// reports as a malformed body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Sketch {
    Histogram(Histogram),
    Accumulator(Accumulator),
    ResultsCounter(ResultsCounter),
    Uniques(Uniques),
    Peak(Peak),
    Rate(Rate),
}

impl Sketch {
    pub fn kind(&self) -> &'static str {
        match self {
            Sketch::Histogram(_) => "Histogram",
            Sketch::Accumulator(_) => "Accumulator",
            Sketch::ResultsCounter(_) => "ResultsCounter",
            Sketch::Uniques(_) => "Uniques",
            Sketch::Peak(_) => "Peak",
            Sketch::Rate(_) => "Rate",
        }
    }

    /// A fresh, empty sketch of the same kind and parameters.
    ///
    /// This is the sketch factory: the master calls it on the first snapshot
    /// it sees under a new stat name to build the matching aggregate.
    pub fn empty_like(&self) -> Sketch {
        match self {
            Sketch::Histogram(h) => Sketch::Histogram(Histogram::new(h.params.clone())),
            Sketch::Accumulator(_) => Sketch::Accumulator(Accumulator::default()),
            Sketch::ResultsCounter(_) => Sketch::ResultsCounter(ResultsCounter::default()),
            Sketch::Uniques(_) => Sketch::Uniques(Uniques::default()),
            Sketch::Peak(_) => Sketch::Peak(Peak::default()),
            Sketch::Rate(_) => Sketch::Rate(Rate::default()),
        }
    }

    /// Records one sample. A sample of the wrong shape for this sketch kind
    /// is dropped.
    pub fn put(&mut self, sample: &Sample) {
        match (self, sample) {
            (Sketch::Histogram(h), Sample::Value(value)) if *value >= 0.0 => {
                h.record(*value as u64)
            }
            (Sketch::Accumulator(a), Sample::Value(value)) => a.record(*value),
            (Sketch::ResultsCounter(c), Sample::Key(key)) => c.record(key),
            (Sketch::Uniques(u), Sample::Key(key)) => u.record(key),
            (Sketch::Peak(p), Sample::Value(value)) => p.record(*value),
            (Sketch::Rate(r), Sample::Value(_)) => r.record(),
            _ => {}
        }
    }

    pub fn clear(&mut self) {
        match self {
            Sketch::Histogram(h) => h.clear(),
            Sketch::Accumulator(a) => a.clear(),
            Sketch::ResultsCounter(c) => c.clear(),
            Sketch::Uniques(u) => u.clear(),
            Sketch::Peak(p) => p.clear(),
            Sketch::Rate(r) => r.clear(),
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            Sketch::Histogram(h) => h.length(),
            Sketch::Accumulator(a) => a.length(),
            Sketch::ResultsCounter(c) => c.length(),
            Sketch::Uniques(u) => u.length(),
            Sketch::Peak(p) => p.length(),
            Sketch::Rate(r) => r.length(),
        }
    }

    pub fn merge(&mut self, other: &Sketch) -> Result<(), MergeError> {
        match (self, other) {
            (Sketch::Histogram(mine), Sketch::Histogram(theirs)) => mine.merge(theirs),
            (Sketch::Accumulator(mine), Sketch::Accumulator(theirs)) => Ok(mine.merge(theirs)),
            (Sketch::ResultsCounter(mine), Sketch::ResultsCounter(theirs)) => {
                Ok(mine.merge(theirs))
            }
            (Sketch::Uniques(mine), Sketch::Uniques(theirs)) => Ok(mine.merge(theirs)),
            (Sketch::Peak(mine), Sketch::Peak(theirs)) => Ok(mine.merge(theirs)),
            (Sketch::Rate(mine), Sketch::Rate(theirs)) => Ok(mine.merge(theirs)),
            (mine, theirs) => Err(MergeError::KindMismatch {
                existing: mine.kind(),
                snapshot: theirs.kind(),
            }),
        }
    }

    pub fn summary(&mut self) -> serde_json::Value {
        match self {
            Sketch::Histogram(h) => h.summary(),
            Sketch::Accumulator(a) => a.summary(),
            Sketch::ResultsCounter(c) => c.summary(),
            Sketch::Uniques(u) => u.summary(),
            Sketch::Peak(p) => p.summary(),
            Sketch::Rate(r) => r.summary(),
        }
    }
}
