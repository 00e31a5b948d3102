//! HTTP adapter: a health probe plus the on-demand report trigger.

use crate::Context;
use crate::pipeline::{self, RunSummary};
use anyhow::Context as _;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use hyper::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

pub fn app(ctx: Arc<Context>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/report", post(trigger_report))
        .layer(CatchPanicLayer::new())
        .with_state(ctx)
}

pub async fn serve(addr: SocketAddr, ctx: Arc<Context>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app(ctx)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "postings-report",
    }))
}

/// What `POST /report` answers with, success or not.
#[derive(serde::Serialize)]
struct RunResponse {
    success: bool,
    count: usize,
    skipped: usize,
    email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RunResponse {
    fn from_summary(summary: RunSummary) -> Self {
        let message = if summary.email_sent {
            format!("Found {} job posting(s) - email sent", summary.count)
        } else {
            "No job postings found".to_string()
        };
        RunResponse {
            success: true,
            count: summary.count,
            skipped: summary.skipped,
            email_sent: summary.email_sent,
            message: Some(message),
            error: None,
        }
    }

    fn from_error(error: String) -> Self {
        RunResponse {
            success: false,
            count: 0,
            skipped: 0,
            email_sent: false,
            message: None,
            error: Some(error),
        }
    }
}

async fn trigger_report(State(ctx): State<Arc<Context>>) -> axum::response::Response {
    match pipeline::run(&ctx.store, &ctx.graph, &ctx.config, None).await {
        Ok(summary) => Json(RunResponse::from_summary(summary)).into_response(),
        Err(err) => {
            tracing::error!("report run failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RunResponse::from_error(err.to_string())),
            )
                .into_response()
        }
    }
}
