#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use loadfleet::pool::PoolHandle;
use loadfleet::report::ReportSink;
use loadfleet::server;
use loadfleet_api::{Registry, StatSnapshot, SubmitRequest, TestSpec};
use tokio::sync::mpsc;

/// A slave that speaks the protocol without generating any load: records
/// submissions, answers state probes from a flag, and honors stop requests.
pub struct StubSlave {
    running: AtomicBool,
}

impl StubSlave {
    pub fn serve(
        running: bool,
    ) -> (
        SocketAddr,
        Arc<StubSlave>,
        mpsc::UnboundedReceiver<SubmitRequest>,
    ) {
        let stub = Arc::new(StubSlave {
            running: AtomicBool::new(running),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let submit_tx = tx.clone();
        let state_stub = stub.clone();
        let stop_stub = stub.clone();
        let app = Router::new()
            .route(
                "/remote",
                post(move |Json(request): Json<SubmitRequest>| async move {
                    let _ = submit_tx.send(request);
                    StatusCode::OK
                }),
            )
            .route(
                "/remote/state",
                get(move || async move {
                    if state_stub.running.load(SeqCst) {
                        StatusCode::OK
                    } else {
                        StatusCode::GONE
                    }
                }),
            )
            .route(
                "/remote/stop",
                post(move || async move {
                    stop_stub.running.store(false, SeqCst);
                    StatusCode::OK
                }),
            );
        let server =
            axum::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        (addr, stub, rx)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, SeqCst);
    }
}

/// Serves the master's progress endpoint for a pool and returns its address.
pub fn serve_master(pool: PoolHandle) -> SocketAddr {
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
        .serve(server::router(pool).into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Forwards every aggregated emission to a channel for assertions.
pub struct CaptureSink(pub mpsc::UnboundedSender<Vec<StatSnapshot>>);

impl ReportSink for CaptureSink {
    fn emit(&mut self, registry: &mut Registry) {
        let _ = self.0.send(registry.snapshots());
    }
}

/// The latency report each slave posts in the two-slave scenario: three
/// samples (one 1, two 3s) in a histogram of `num_buckets` buckets.
pub fn latency_report(slave_id: &str, num_buckets: usize) -> serde_json::Value {
    let mut items = vec![0u64; num_buckets];
    items[1] = 1;
    items[3] = 2;
    serde_json::json!({
        "slaveId": slave_id,
        "stats": [{
            "name": "latency",
            "addToHttpReport": true,
            "interval": {
                "type": "Histogram",
                "params": {"numBuckets": num_buckets},
                "items": items,
                "extra": [],
                "sum": 7,
                "min": 1,
                "max": 3,
                "length": 3
            }
        }]
    })
}

pub fn test_spec(report_interval_ms: u64) -> TestSpec {
    TestSpec {
        name: "smoke".into(),
        generator: "http-get".into(),
        concurrency: 2,
        time_limit_ms: None,
        target_rps: None,
        report_interval_ms,
    }
}

/// An address nothing is listening on.
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
