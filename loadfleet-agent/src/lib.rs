//! The slave-side agent of the loadfleet distributed load-test coordinator.
//!
//! An [`Agent`] is embedded in a load-generating process. It serves the
//! slave half of the `/remote` protocol: the master submits a [`TestSpec`]
//! to `POST /remote`, probes `GET /remote/state` for liveness (200 while the
//! local scheduler is running, 410 Gone once it has stopped), and may ask
//! `POST /remote/stop` to abort. In the other direction, the agent pushes a
//! progress report to the master every report interval, carrying interval
//! snapshots of everything recorded in its [`SharedStats`].
//!
//! The load generation itself is the job of the embedding process: it
//! implements [`LocalScheduler`], resolves the spec's generator identifier
//! against whatever catalog it keeps, and records samples through the stats
//! handle the agent hands it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use loadfleet_api::{Registry, Reportable, StatReport, SubmitRequest, TestSpec};

mod push;
mod server;
pub(crate) mod sync;

/// Drives the actual load generation on a slave node.
///
/// The agent only ever observes whether the scheduler is running, asks it to
/// stop, and hands it submitted specs; pacing, concurrency, and request
/// generation are entirely the implementor's concern.
pub trait LocalScheduler: Send + Sync + 'static {
    /// Begins running `spec`, recording observations into `stats`.
    ///
    /// Returns an error without starting anything if the spec's generator is
    /// not in the local catalog or a test is already in flight.
    fn start(&self, spec: &TestSpec, stats: &SharedStats) -> Result<(), SchedulerError>;

    fn running(&self) -> bool;

    fn stop_all(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown request generator {0:?}")]
    UnknownGenerator(String),
    #[error("a test is already running")]
    AlreadyRunning,
}

/// Why a `POST /remote` submission was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to build the HTTP client for the master: {0}")]
    Client(#[from] reqwest::Error),
}

/// The slave's identity and route back to its master.
///
/// Created when the first submission arrives; the embedded client is reused
/// for every progress push to this master.
#[derive(Debug, Clone)]
pub struct SlaveContext {
    id: String,
    master: String,
    client: reqwest::Client,
}

impl SlaveContext {
    fn new(id: String, master: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { id, master, client })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    pub(crate) async fn push(&self, report: &StatReport) -> Result<(), reqwest::Error> {
        let url = format!("http://{}/remote/progress", self.master);
        // Transport-level completion is all we wait for; the master's answer
        // carries no information the slave acts on.
        let response = self.client.post(url).json(report).send().await?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "master declined a progress report");
        }
        Ok(())
    }
}

/// Shared handle to the slave's local statistics registry.
///
/// Scheduler implementations register [`Reportable`]s up front and then feed
/// samples by name; the agent's pusher drains interval snapshots from the
/// same registry.
#[derive(Clone, Default)]
pub struct SharedStats(Arc<sync::Mutex<Registry>>);

impl SharedStats {
    pub fn register(&self, reportable: Reportable) {
        self.0.lock().register(reportable);
    }

    /// Records a numeric sample into the named statistic. Samples for names
    /// that were never registered are dropped.
    pub fn record_value(&self, name: &str, value: f64) {
        let mut registry = self.0.lock();
        match registry.get_mut(name) {
            Some(reportable) => reportable.put(value),
            None => tracing::debug!(stat = name, "dropping sample for unregistered statistic"),
        }
    }

    /// Records a keyed sample (e.g. a status code) into the named statistic.
    pub fn record_key(&self, name: &str, key: &str) {
        let mut registry = self.0.lock();
        match registry.get_mut(name) {
            Some(reportable) => reportable.put(key),
            None => tracing::debug!(stat = name, "dropping sample for unregistered statistic"),
        }
    }

    /// Runs `f` with the registry locked, for anything the helpers above
    /// don't cover.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Drains one progress report: interval snapshots of every statistic,
    /// then a rotation so the next interval starts clean.
    pub(crate) fn take_report(&self, slave_id: &str) -> Option<StatReport> {
        let mut registry = self.0.lock();
        if registry.is_empty() {
            return None;
        }
        let stats = registry.snapshots();
        registry.rotate();
        Some(StatReport {
            slave_id: slave_id.to_string(),
            stats,
        })
    }
}

struct AgentInner {
    scheduler: Arc<dyn LocalScheduler>,
    stats: SharedStats,
    context: sync::Mutex<Option<SlaveContext>>,
}

/// The slave lifecycle agent.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    pub fn new(scheduler: impl LocalScheduler) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                scheduler: Arc::new(scheduler),
                stats: SharedStats::default(),
                context: sync::Mutex::new(None),
            }),
        }
    }

    /// The stats handle scheduler implementations record into.
    pub fn stats(&self) -> SharedStats {
        self.inner.stats.clone()
    }

    /// The slave's context, present once a submission has been accepted.
    pub fn context(&self) -> Option<SlaveContext> {
        self.inner.context.lock().clone()
    }

    /// The agent's HTTP surface. Public so a process serving both roles can
    /// merge this router with a master's; routing is by path.
    pub fn router(&self) -> axum::Router {
        server::router(self.clone())
    }

    /// Binds `addr` and serves the agent until the process exits.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), axum::BoxError> {
        tracing::info!(%addr, "serving slave agent");
        axum::Server::try_bind(&addr)?
            .serve(self.router().into_make_service())
            .await?;
        Ok(())
    }

    /// Handles `POST /remote`: establishes the slave context, starts the
    /// local scheduler on the submitted spec, and spawns the progress
    /// pusher.
    pub fn submit(&self, request: SubmitRequest) -> Result<(), SubmitError> {
        let SubmitRequest {
            slave_id,
            master,
            spec,
        } = request;
        let context = SlaveContext::new(slave_id, master)?;
        self.inner.scheduler.start(&spec, &self.inner.stats)?;
        tracing::info!(
            slave = context.id(),
            master = context.master(),
            test = %spec.name,
            "registered as a slave; local tests started"
        );

        let report_interval = Duration::from_millis(spec.report_interval_ms.max(1));
        *self.inner.context.lock() = Some(context.clone());
        tokio::spawn(push::run(
            context,
            self.inner.scheduler.clone(),
            self.inner.stats.clone(),
            report_interval,
        ));
        Ok(())
    }

    pub(crate) fn scheduler(&self) -> &dyn LocalScheduler {
        &*self.inner.scheduler
    }
}
