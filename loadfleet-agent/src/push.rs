//! The periodic progress pusher.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::{LocalScheduler, SharedStats, SlaveContext};

/// Pushes one progress report per report interval until the local scheduler
/// stops, then flushes a final report and exits.
///
/// The running check happens before the report is drained so samples recorded
/// in the scheduler's last interval still reach the master, even though the
/// master may have already seen the 410 on `/remote/state`.
pub(crate) async fn run(
    context: SlaveContext,
    scheduler: Arc<dyn LocalScheduler>,
    stats: SharedStats,
    report_interval: Duration,
) {
    let mut interval = time::interval_at(Instant::now() + report_interval, report_interval);
    loop {
        interval.tick().await;
        let still_running = scheduler.running();
        if let Some(report) = stats.take_report(context.id()) {
            if let Err(error) = context.push(&report).await {
                tracing::warn!(%error, master = context.master(), "failed to push progress");
            }
        }
        if !still_running {
            tracing::debug!(
                slave = context.id(),
                "local scheduler stopped; ending progress pushes"
            );
            break;
        }
    }
}
