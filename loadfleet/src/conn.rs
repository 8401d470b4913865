//! Per-slave HTTP client.

use std::time::Duration;

use loadfleet_api::SubmitRequest;
use reqwest::StatusCode;

/// What a `/remote/state` probe said about a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeStatus {
    /// 200: the slave's local scheduler is still running.
    Running,
    /// 410 Gone: the scheduler has stopped; the slave is finished.
    Stopped,
    /// Anything else; treated the same as no response at all.
    Other(StatusCode),
}

/// One slave's connection, owned by the pool that created it.
#[derive(Debug, Clone)]
pub(crate) struct SlaveConn {
    addr: String,
    client: reqwest::Client,
}

impl SlaveConn {
    /// The request timeout is bounded by the ping period: a probe that has
    /// not answered by the next round is already counted against the slave.
    pub(crate) fn new(addr: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            addr: addr.to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub(crate) async fn submit(&self, request: &SubmitRequest) -> Result<(), SubmitError> {
        let response = self
            .client
            .post(self.url("/remote"))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Rejected(status));
        }
        Ok(())
    }

    pub(crate) async fn probe_state(&self) -> Result<ProbeStatus, reqwest::Error> {
        let response = self.client.get(self.url("/remote/state")).send().await?;
        Ok(match response.status() {
            StatusCode::OK => ProbeStatus::Running,
            StatusCode::GONE => ProbeStatus::Stopped,
            other => ProbeStatus::Other(other),
        })
    }

    /// Fire-and-forget; the slave's answer is not interpreted.
    pub(crate) async fn stop(&self) -> Result<(), reqwest::Error> {
        self.client.post(self.url("/remote/stop")).send().await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SubmitError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("slave rejected the submission with status {0}")]
    Rejected(StatusCode),
}
