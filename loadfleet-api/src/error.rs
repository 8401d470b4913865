/// Errors raised when merging a sketch snapshot into an existing statistic.
///
/// A merge failure indicates a protocol misconfiguration between the master
/// and a slave (two nodes reporting under the same stat name with different
/// sketch shapes) and is surfaced to the caller rather than recovered.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Two histograms with different bucket counts cannot be combined.
    #[error("incompatible histograms ({left} vs {right} buckets)")]
    IncompatibleHistograms { left: usize, right: usize },

    /// A snapshot of one sketch kind arrived for a statistic of another kind.
    #[error("cannot merge a {snapshot} snapshot into a {existing} statistic")]
    KindMismatch {
        existing: &'static str,
        snapshot: &'static str,
    },
}
