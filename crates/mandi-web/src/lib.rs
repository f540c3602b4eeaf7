//! JSON API for the price ticker and manual sync trigger.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mandi_core::CommodityTrend;
use mandi_sync::{connect_store, list_current_trends, MandiJob, SyncConfig};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "mandi-web";

#[derive(Clone)]
pub struct AppState {
    pub job: Arc<MandiJob>,
}

impl AppState {
    pub fn new(job: Arc<MandiJob>) -> Self {
        Self { job }
    }
}

#[derive(Debug, Serialize)]
struct TrendsResponse {
    success: bool,
    count: usize,
    data: Vec<CommodityTrend>,
}

#[derive(Debug, Serialize)]
struct SyncStarted {
    success: bool,
    message: &'static str,
    run_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ApiFailure {
    success: bool,
    message: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/trends", get(trends_handler))
        .route("/api/sync-mandi", post(sync_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let port = config.web_port;
    let store = connect_store(&config).await?;
    let job = Arc::new(MandiJob::new(config, store)?);

    let scheduler = job.maybe_build_scheduler().await?;
    if let Some(sched) = &scheduler {
        sched.start().await.context("starting scheduler")?;
    }

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "mandi web listening");
    axum::serve(listener, app(AppState::new(job))).await?;
    Ok(())
}

async fn trends_handler(State(state): State<Arc<AppState>>) -> Response {
    match list_current_trends(state.job.store().as_ref()).await {
        Ok(data) => Json(TrendsResponse {
            success: true,
            count: data.len(),
            data,
        })
        .into_response(),
        Err(err) => {
            error!(error = %err, "fetching crop trends failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch crop trends. Please try again later.",
            )
        }
    }
}

async fn sync_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(source) = state.job.default_source().cloned() else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to start sync: no report source is configured (set MANDI_SOURCE)",
        );
    };
    let run_id = state.job.trigger(source);
    info!(%run_id, "manual mandi sync triggered");
    (
        StatusCode::ACCEPTED,
        Json(SyncStarted {
            success: true,
            message: "Mandi price sync started in background. The ticker will update in a few minutes.",
            run_id,
        }),
    )
        .into_response()
}

fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiFailure {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}
