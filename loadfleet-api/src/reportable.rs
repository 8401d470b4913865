//! Named statistics and the registry that routes merges to them.

use std::collections::BTreeMap;

use crate::error::MergeError;
use crate::stats::{Sample, Sketch};
use crate::wire::StatSnapshot;

/// A named pair of interval and cumulative sketches of one kind.
///
/// The interval sketch is reset after each report emission; the cumulative
/// sketch accumulates for the lifetime of the test. Note the deliberately
/// asymmetric merge contract: [`Reportable::merge`] consumes a raw sketch
/// snapshot, never another `Reportable`.
#[derive(Debug, Clone)]
pub struct Reportable {
    name: String,
    add_to_http_report: bool,
    track_interval: bool,
    interval: Sketch,
    cumulative: Sketch,
}

impl Reportable {
    /// Builds a reportable around an empty sketch template. Both views start
    /// as fresh sketches of the template's kind and parameters.
    pub fn new(name: impl Into<String>, template: Sketch, add_to_http_report: bool) -> Self {
        Self {
            name: name.into(),
            add_to_http_report,
            track_interval: true,
            interval: template.empty_like(),
            cumulative: template,
        }
    }

    /// Disables the interval view; only the cumulative sketch sees samples.
    pub fn without_interval(mut self) -> Self {
        self.track_interval = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_to_http_report(&self) -> bool {
        self.add_to_http_report
    }

    /// Number of samples delivered over the lifetime of this statistic.
    pub fn length(&self) -> u64 {
        self.cumulative.length()
    }

    pub fn interval(&self) -> &Sketch {
        &self.interval
    }

    pub fn cumulative(&self) -> &Sketch {
        &self.cumulative
    }

    pub fn put(&mut self, sample: impl Into<Sample>) {
        let sample = sample.into();
        if self.track_interval {
            self.interval.put(&sample);
        }
        self.cumulative.put(&sample);
    }

    /// Starts the next reporting interval. The interval sketch is reset only
    /// if it has seen samples; the cumulative sketch is never touched.
    pub fn next(&mut self) {
        if self.interval.length() > 0 {
            self.interval.clear();
        }
    }

    /// Merges a raw sketch snapshot into both the interval and cumulative
    /// views.
    pub fn merge(&mut self, snapshot: &Sketch) -> Result<(), MergeError> {
        self.interval.merge(snapshot)?;
        self.cumulative.merge(snapshot)
    }

    /// Serializable image of the current interval, as shipped in a progress
    /// report.
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            name: self.name.clone(),
            add_to_http_report: self.add_to_http_report,
            interval: self.interval.clone(),
        }
    }

    pub fn summary(&mut self) -> serde_json::Value {
        serde_json::json!({
            "interval": self.interval.summary(),
            "cumulative": self.cumulative.summary(),
        })
    }
}

/// Name-indexed collection of [`Reportable`]s.
///
/// On the master this is the aggregate view of the whole fleet: an entry
/// exists for a name exactly when some slave has reported a stat under it.
/// On a slave it holds the locally recorded statistics.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    stats: BTreeMap<String, Reportable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a statistic under its name, replacing any existing entry.
    pub fn register(&mut self, reportable: Reportable) {
        self.stats.insert(reportable.name().to_string(), reportable);
    }

    pub fn get(&self, name: &str) -> Option<&Reportable> {
        self.stats.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Reportable> {
        self.stats.get_mut(name)
    }

    /// Routes an incoming snapshot to the statistic with the same name,
    /// constructing one of the snapshot's kind and parameters on first sight.
    pub fn merge_snapshot(&mut self, snapshot: &StatSnapshot) -> Result<(), MergeError> {
        let reportable = self.stats.entry(snapshot.name.clone()).or_insert_with(|| {
            Reportable::new(
                snapshot.name.clone(),
                snapshot.interval.empty_like(),
                snapshot.add_to_http_report,
            )
        });
        reportable.merge(&snapshot.interval)
    }

    /// Interval snapshots of every statistic, in name order.
    pub fn snapshots(&self) -> Vec<StatSnapshot> {
        self.stats.values().map(Reportable::snapshot).collect()
    }

    /// Resets every statistic's interval view for the next reporting round.
    pub fn rotate(&mut self) {
        for reportable in self.stats.values_mut() {
            reportable.next();
        }
    }

    pub fn summaries(&mut self) -> serde_json::Value {
        let mut summaries = serde_json::Map::new();
        for (name, reportable) in &mut self.stats {
            summaries.insert(name.clone(), reportable.summary());
        }
        summaries.into()
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}
