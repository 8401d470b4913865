//! The slave half of the `/remote` HTTP surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use loadfleet_api::SubmitRequest;

use crate::{Agent, SchedulerError, SubmitError};

pub(crate) fn router(agent: Agent) -> Router {
    Router::new()
        .route("/remote", post(submit))
        .route("/remote/state", get(state))
        .route("/remote/stop", post(stop))
        .fallback(method_not_allowed)
        .with_state(agent)
}

async fn submit(State(agent): State<Agent>, Json(request): Json<SubmitRequest>) -> Response {
    match agent.submit(request) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(SubmitError::Scheduler(error @ SchedulerError::UnknownGenerator(_))) => {
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
        Err(SubmitError::Scheduler(error @ SchedulerError::AlreadyRunning)) => {
            (StatusCode::CONFLICT, error.to_string()).into_response()
        }
        Err(SubmitError::Client(error)) => {
            tracing::error!(%error, "failed to build the client for the master");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 200 while the local scheduler runs, 410 Gone once it has stopped (or was
/// never started). The 410 is the master's completion signal.
async fn state(State(agent): State<Agent>) -> StatusCode {
    if agent.scheduler().running() {
        StatusCode::OK
    } else {
        StatusCode::GONE
    }
}

async fn stop(State(agent): State<Agent>) -> StatusCode {
    tracing::info!("master asked to stop all local tests");
    agent.scheduler().stop_all();
    StatusCode::OK
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
