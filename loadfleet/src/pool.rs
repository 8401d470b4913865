//! The master worker pool.
//!
//! The pool owns every slave's descriptor, the merged statistics registry,
//! and both timers. All of that state is touched from a single coordinator
//! task: the [`WorkerPool::start`] loop selects over the ping interval, the
//! progress-window sleep, and the message channel fed by the HTTP handlers,
//! so merges, pings, and completion checks never race one another.

use std::collections::HashMap;
use std::time::Duration;

use futures::future;
use loadfleet_api::{MergeError, Registry, StatReport, SubmitRequest, TestSpec};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::conn::{ProbeStatus, SlaveConn};
use crate::report::ReportSink;

/// Liveness-probe cadence.
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_millis(3000);

/// How long the pool waits after the first progress report of a round before
/// emitting one aggregated report, absorbing clock skew and network jitter
/// across the fleet.
pub const DEFAULT_PROGRESS_WINDOW: Duration = Duration::from_millis(500);

/// Lifecycle state of one slave, as seen by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    NotStarted,
    Running,
    /// A state probe is in flight; still being in `Ping` when the next round
    /// starts means the probe was never answered.
    Ping,
    Done,
    Error,
}

impl SlaveState {
    /// Terminal slaves no longer participate in the protocol.
    pub fn is_terminal(self) -> bool {
        matches!(self, SlaveState::Done | SlaveState::Error)
    }
}

/// One slave's descriptor: identity, connection, lifecycle state.
#[derive(Debug)]
struct Slave {
    id: String,
    conn: SlaveConn,
    state: SlaveState,
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub ping_period: Duration,
    /// Fixed at 500 ms in production; shortened by tests.
    pub progress_window: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            ping_period: DEFAULT_PING_PERIOD,
            progress_window: DEFAULT_PROGRESS_WINDOW,
        }
    }
}

/// Invoked exactly once, with the final aggregated summaries, when every
/// slave has reached a terminal state.
pub type CompletionCallback = Box<dyn FnOnce(serde_json::Value) + Send>;

#[derive(Debug, Clone, Copy)]
enum ProbeOutcome {
    Running,
    Done,
}

enum PoolMessage {
    Progress {
        report: StatReport,
        reply: oneshot::Sender<Result<(), MergeError>>,
    },
    Probe {
        slave_id: String,
        outcome: ProbeOutcome,
    },
    Stop,
}

/// Cheap handle for feeding the pool from HTTP handlers and the CLI.
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<PoolMessage>,
}

impl PoolHandle {
    /// Routes a progress report to the pool and waits for the merge verdict.
    ///
    /// Returns `None` when the pool has already completed and torn down; the
    /// report is dropped, which is the contract for late arrivals.
    pub async fn progress(&self, report: StatReport) -> Option<Result<(), MergeError>> {
        let (reply, verdict) = oneshot::channel();
        if self
            .tx
            .send(PoolMessage::Progress { report, reply })
            .await
            .is_err()
        {
            return None;
        }
        verdict.await.ok()
    }

    /// Asks every non-terminal slave to stop its local tests.
    pub async fn stop(&self) {
        let _ = self.tx.send(PoolMessage::Stop).await;
    }
}

/// The master-side aggregate driving one distributed test run.
pub struct WorkerPool {
    slaves: HashMap<String, Slave>,
    registry: Registry,
    options: PoolOptions,
    sink: Box<dyn ReportSink>,
    rx: mpsc::Receiver<PoolMessage>,
    /// Kept so in-flight probe tasks can report back to the loop.
    tx: mpsc::Sender<PoolMessage>,
}

impl WorkerPool {
    /// Builds a pool over `slaves` (`host:port` pairs; the pair doubles as
    /// the slave's id). Each slave gets its own HTTP client, owned by this
    /// pool alone.
    pub fn new(
        slaves: &[String],
        options: PoolOptions,
        sink: Box<dyn ReportSink>,
    ) -> Result<(Self, PoolHandle), reqwest::Error> {
        let mut descriptors = HashMap::with_capacity(slaves.len());
        for addr in slaves {
            let conn = SlaveConn::new(addr, options.ping_period)?;
            descriptors.insert(
                addr.clone(),
                Slave {
                    id: addr.clone(),
                    conn,
                    state: SlaveState::NotStarted,
                },
            );
        }
        let (tx, rx) = mpsc::channel(64);
        let handle = PoolHandle { tx: tx.clone() };
        let pool = Self {
            slaves: descriptors,
            registry: Registry::new(),
            options,
            sink,
            rx,
            tx,
        };
        Ok((pool, handle))
    }

    /// Runs the distributed test to completion: submits `spec` to every
    /// slave, then drives pings, merges, and the progress window until all
    /// slaves are terminal and the callback has fired.
    ///
    /// `master_addr` is the `host:port` the slaves push progress back to.
    pub async fn start(
        mut self,
        spec: TestSpec,
        master_addr: String,
        on_complete: CompletionCallback,
    ) {
        self.submit_all(&spec, &master_addr).await;

        let mut on_complete = Some(on_complete);
        let mut ping = time::interval_at(
            Instant::now() + self.options.ping_period,
            self.options.ping_period,
        );
        let window = time::sleep(Duration::from_secs(0));
        tokio::pin!(window);
        let mut window_armed = false;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    self.send_pings();
                    if self.check_finished(&mut on_complete) {
                        return;
                    }
                }

                () = window.as_mut(), if window_armed => {
                    window_armed = false;
                    self.emit_progress_report();
                }

                msg = self.rx.recv() => match msg {
                    Some(PoolMessage::Progress { report, reply }) => {
                        let known = self.slaves.contains_key(&report.slave_id);
                        let verdict = self.receive_progress(report);
                        // First report of a round arms the window; reports
                        // landing inside it are coalesced into one emission.
                        if known && !window_armed {
                            window
                                .as_mut()
                                .reset(Instant::now() + self.options.progress_window);
                            window_armed = true;
                        }
                        let _ = reply.send(verdict);
                    }
                    Some(PoolMessage::Probe { slave_id, outcome }) => {
                        self.record_probe(&slave_id, outcome);
                    }
                    Some(PoolMessage::Stop) => self.stop_slaves(),
                    None => return,
                },
            }
        }
    }

    async fn submit_all(&mut self, spec: &TestSpec, master_addr: &str) {
        let submissions = self.slaves.values().map(|slave| {
            let conn = slave.conn.clone();
            let id = slave.id.clone();
            let request = SubmitRequest {
                slave_id: slave.id.clone(),
                master: master_addr.to_string(),
                spec: spec.clone(),
            };
            async move { (id, conn.submit(&request).await) }
        });
        for (id, result) in future::join_all(submissions).await {
            if let Err(error) = result {
                // The slave still counts as started; the ping loop will
                // declare it failed if it stays unreachable.
                tracing::warn!(slave = %id, %error, "failed to submit the test spec");
            } else {
                tracing::debug!(slave = %id, "test spec submitted");
            }
            if let Some(slave) = self.slaves.get_mut(&id) {
                slave.state = SlaveState::Running;
            }
        }
    }

    /// One liveness round, atomic from the pool's point of view:
    /// unanswered probes from the previous round condemn their slaves, then
    /// every running slave gets a fresh probe, then completion is checked.
    fn send_pings(&mut self) {
        for slave in self.slaves.values_mut() {
            if slave.state == SlaveState::Ping {
                tracing::warn!(slave = %slave.id, "slave missed a ping round; marking it failed");
                slave.state = SlaveState::Error;
            }
        }
        for slave in self.slaves.values_mut() {
            if slave.state != SlaveState::Running {
                continue;
            }
            slave.state = SlaveState::Ping;
            let conn = slave.conn.clone();
            let slave_id = slave.id.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let outcome = match conn.probe_state().await {
                    Ok(ProbeStatus::Running) => ProbeOutcome::Running,
                    Ok(ProbeStatus::Stopped) => ProbeOutcome::Done,
                    Ok(ProbeStatus::Other(status)) => {
                        // Counted against the slave by the next round.
                        tracing::debug!(slave = %slave_id, %status, "unexpected state-probe status");
                        return;
                    }
                    Err(error) => {
                        tracing::debug!(slave = %slave_id, %error, "state probe failed");
                        return;
                    }
                };
                let _ = tx.send(PoolMessage::Probe { slave_id, outcome }).await;
            });
        }
    }

    fn record_probe(&mut self, slave_id: &str, outcome: ProbeOutcome) {
        let Some(slave) = self.slaves.get_mut(slave_id) else {
            return;
        };
        // Terminal states are sticky; a probe answered after the slave was
        // condemned does not resurrect it.
        if matches!(slave.state, SlaveState::Ping | SlaveState::Running) {
            slave.state = match outcome {
                ProbeOutcome::Running => SlaveState::Running,
                ProbeOutcome::Done => SlaveState::Done,
            };
        }
    }

    /// Merges one slave's progress into the registry.
    ///
    /// Reports from ids outside the pool are dropped silently: they are
    /// either late arrivals after teardown or noise, and neither may touch
    /// the registry. A report from a known slave is also an implicit
    /// liveness signal — even one arriving after the slave's `done`, whose
    /// samples must still count.
    fn receive_progress(&mut self, report: StatReport) -> Result<(), MergeError> {
        let Some(slave) = self.slaves.get_mut(&report.slave_id) else {
            tracing::debug!(slave = %report.slave_id, "dropping progress from unknown slave");
            return Ok(());
        };
        if slave.state != SlaveState::Error {
            slave.state = SlaveState::Running;
        }
        for snapshot in &report.stats {
            self.registry.merge_snapshot(snapshot)?;
        }
        Ok(())
    }

    fn emit_progress_report(&mut self) {
        tracing::debug!(stats = self.registry.len(), "emitting aggregated report");
        self.sink.emit(&mut self.registry);
        self.registry.rotate();
    }

    /// Completes the run once every slave is terminal: the registry is
    /// snapshotted and cleared, the slave map is torn down, and the callback
    /// fires exactly once. Progress arriving after this point finds no slave
    /// entry and is dropped.
    fn check_finished(&mut self, on_complete: &mut Option<CompletionCallback>) -> bool {
        if !self.slaves.values().all(|slave| slave.state.is_terminal()) {
            return false;
        }
        tracing::info!("every slave is finished; completing the run");
        let summary = self.registry.summaries();
        self.registry.clear();
        self.slaves.clear();
        if let Some(callback) = on_complete.take() {
            callback(summary);
        }
        true
    }

    fn stop_slaves(&self) {
        for slave in self.slaves.values() {
            if slave.state.is_terminal() {
                continue;
            }
            let conn = slave.conn.clone();
            let slave_id = slave.id.clone();
            tokio::spawn(async move {
                if let Err(error) = conn.stop().await {
                    tracing::debug!(slave = %slave_id, %error, "stop request failed");
                }
            });
        }
    }
}
