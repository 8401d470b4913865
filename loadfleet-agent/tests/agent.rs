use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use loadfleet_agent::{Agent, LocalScheduler, SchedulerError, SharedStats};
use loadfleet_api::{
    Histogram, HistogramParams, Reportable, ResultsCounter, Sketch, StatReport, SubmitRequest,
    TestSpec,
};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct StubScheduler(Arc<StubInner>);

#[derive(Default)]
struct StubInner {
    running: AtomicBool,
    specs: Mutex<Vec<TestSpec>>,
}

impl StubScheduler {
    fn submitted(&self) -> Vec<TestSpec> {
        self.0.specs.lock().unwrap().clone()
    }
}

impl LocalScheduler for StubScheduler {
    fn start(&self, spec: &TestSpec, stats: &SharedStats) -> Result<(), SchedulerError> {
        if spec.generator != "http-get" {
            return Err(SchedulerError::UnknownGenerator(spec.generator.clone()));
        }
        if self.0.running.swap(true, SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.0.specs.lock().unwrap().push(spec.clone());

        stats.register(Reportable::new(
            "latency",
            Sketch::Histogram(Histogram::new(HistogramParams {
                num_buckets: 10,
                ..HistogramParams::default()
            })),
            true,
        ));
        stats.register(Reportable::new(
            "results",
            Sketch::ResultsCounter(ResultsCounter::default()),
            true,
        ));
        stats.record_value("latency", 1.0);
        stats.record_value("latency", 3.0);
        stats.record_key("results", "200");
        Ok(())
    }

    fn running(&self) -> bool {
        self.0.running.load(SeqCst)
    }

    fn stop_all(&self) {
        self.0.running.store(false, SeqCst);
    }
}

fn serve_agent(agent: &Agent) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
        .serve(agent.router().into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// A stand-in master that records every progress report it receives.
fn serve_master() -> (SocketAddr, mpsc::UnboundedReceiver<StatReport>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route(
            "/remote/progress",
            post(
                |State(tx): State<mpsc::UnboundedSender<StatReport>>, Json(report): Json<StatReport>| async move {
                    let _ = tx.send(report);
                    StatusCode::OK
                },
            ),
        )
        .with_state(tx);
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, rx)
}

fn submit_request(master: SocketAddr, generator: &str, report_interval_ms: u64) -> SubmitRequest {
    SubmitRequest {
        slave_id: "slave-1".into(),
        master: master.to_string(),
        spec: TestSpec {
            name: "smoke".into(),
            generator: generator.into(),
            concurrency: 2,
            time_limit_ms: None,
            target_rps: None,
            report_interval_ms,
        },
    }
}

#[tokio::test]
async fn submission_starts_tests_and_establishes_the_context() {
    let scheduler = StubScheduler::default();
    let agent = Agent::new(scheduler.clone());
    let addr = serve_agent(&agent);
    let (master, _rx) = serve_master();

    assert!(agent.context().is_none());

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/remote"))
        .json(&submit_request(master, "http-get", 60_000))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let context = agent.context().expect("context after submission");
    assert_eq!(context.id(), "slave-1");
    assert_eq!(context.master(), master.to_string());
    assert_eq!(scheduler.submitted().len(), 1);

    // Running scheduler answers 200; a stopped one is Gone.
    let state = client
        .get(format!("http://{addr}/remote/state"))
        .send()
        .await
        .unwrap();
    assert_eq!(state.status(), StatusCode::OK);

    let stop = client
        .post(format!("http://{addr}/remote/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(stop.status(), StatusCode::OK);
    assert!(!scheduler.running());

    let state = client
        .get(format!("http://{addr}/remote/state"))
        .send()
        .await
        .unwrap();
    assert_eq!(state.status(), StatusCode::GONE);
}

#[tokio::test]
async fn state_is_gone_before_any_submission() {
    let agent = Agent::new(StubScheduler::default());
    let addr = serve_agent(&agent);

    let response = reqwest::get(format!("http://{addr}/remote/state"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn unknown_generators_are_rejected() {
    let agent = Agent::new(StubScheduler::default());
    let addr = serve_agent(&agent);
    let (master, _rx) = serve_master();

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/remote"))
        .json(&submit_request(master, "teleport", 60_000))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("teleport"));
}

#[tokio::test]
async fn resubmission_while_running_conflicts() {
    let agent = Agent::new(StubScheduler::default());
    let addr = serve_agent(&agent);
    let (master, _rx) = serve_master();

    let client = reqwest::Client::new();
    let first = client
        .post(format!("http://{addr}/remote"))
        .json(&submit_request(master, "http-get", 60_000))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client
        .post(format!("http://{addr}/remote"))
        .json(&submit_request(master, "http-get", 60_000))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_submissions_are_client_errors() {
    let agent = Agent::new(StubScheduler::default());
    let addr = serve_agent(&agent);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/remote"))
        .header("content-type", "application/json")
        .body("not json at all")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn anything_else_is_method_not_allowed() {
    let agent = Agent::new(StubScheduler::default());
    let addr = serve_agent(&agent);

    let client = reqwest::Client::new();
    for url in [
        format!("http://{addr}/remote"),
        format!("http://{addr}/elsewhere"),
    ] {
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

#[tokio::test]
async fn progress_is_pushed_until_the_scheduler_stops() {
    let scheduler = StubScheduler::default();
    let agent = Agent::new(scheduler.clone());
    let addr = serve_agent(&agent);
    let (master, mut reports) = serve_master();

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/remote"))
        .json(&submit_request(master, "http-get", 50))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .expect("no progress within 5s")
        .expect("progress channel closed");
    assert_eq!(report.slave_id, "slave-1");
    let latency = report
        .stats
        .iter()
        .find(|snapshot| snapshot.name == "latency")
        .expect("latency snapshot");
    assert_eq!(latency.interval.kind(), "Histogram");
    assert_eq!(latency.interval.length(), 2);
    let results = report
        .stats
        .iter()
        .find(|snapshot| snapshot.name == "results")
        .expect("results snapshot");
    assert_eq!(results.interval.length(), 1);

    // The interval rotates after each push, so the next report starts empty.
    let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .expect("no second report within 5s")
        .expect("progress channel closed");
    let latency = report
        .stats
        .iter()
        .find(|snapshot| snapshot.name == "latency")
        .expect("latency snapshot");
    assert_eq!(latency.interval.length(), 0);

    // Stopping the scheduler ends the pushes after one final report.
    scheduler.stop_all();
    tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .expect("no final report within 5s")
        .expect("progress channel closed");
}
