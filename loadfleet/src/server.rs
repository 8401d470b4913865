//! The master half of the `/remote` HTTP surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use loadfleet_api::StatReport;

use crate::pool::PoolHandle;

pub fn router(pool: PoolHandle) -> Router {
    Router::new()
        .route("/remote/progress", post(progress))
        .fallback(method_not_allowed)
        .with_state(pool)
}

async fn progress(State(pool): State<PoolHandle>, Json(report): Json<StatReport>) -> Response {
    match pool.progress(report).await {
        // A merge failure means master and slaves disagree about a stat's
        // shape; that misconfiguration is surfaced, not swallowed.
        Some(Err(error)) => {
            tracing::error!(%error, "failed to merge a progress report");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
        Some(Ok(())) => StatusCode::OK.into_response(),
        None => {
            tracing::debug!("pool already completed; dropping progress report");
            StatusCode::OK.into_response()
        }
    }
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
