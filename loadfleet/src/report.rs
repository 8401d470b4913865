//! Where aggregated reports go when the progress window fires.

use loadfleet_api::Registry;

/// Consumer of the merged registry, invoked once per progress window.
///
/// The registry still holds the interval data when `emit` runs; the pool
/// rotates intervals right after. The HTML report renderer lives behind this
/// seam.
pub trait ReportSink: Send {
    fn emit(&mut self, registry: &mut Registry);
}

/// Default sink: logs each aggregated interval report.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn emit(&mut self, registry: &mut Registry) {
        tracing::info!(report = %registry.summaries(), "aggregated progress");
    }
}
