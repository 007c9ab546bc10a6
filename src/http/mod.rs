//! The HTTP surface: a thin JSON translation layer over the coordinators
//! in the crate root. Every handler takes the shared `AppContext`,
//! extracts/validates its request body, calls into the coordinator, and
//! maps the result to a JSON response; `AppError`'s `IntoResponse` impl
//! does the status-code mapping.

mod aggregate;
mod buckets;
mod datas3ts;
mod delete;
mod download;
mod upload;

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub type AppState = Arc<AppContext>;

/// Every handler here only coordinates catalog writes and presigned-URL
/// minting -- the bulk TAR transfer happens directly between the client
/// and S3, never through this server -- so one fixed timeout is safe
/// across the whole surface.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/v1/buckets", get(buckets::list).post(buckets::create))
        .route("/api/v1/datas3ts", get(datas3ts::list).post(datas3ts::create).delete(datas3ts::remove))
        .route("/api/v1/datas3ts/import", post(datas3ts::import))
        .route("/api/v1/datas3ts/clear", post(datas3ts::clear))
        .route("/api/v1/upload-datarange", post(upload::start))
        .route("/api/v1/upload-datarange/complete", post(upload::complete))
        .route("/api/v1/upload-datarange/cancel", post(upload::cancel))
        .route("/api/v1/aggregate", post(aggregate::start))
        .route("/api/v1/aggregate/complete", post(aggregate::complete))
        .route("/api/v1/aggregate/cancel", post(aggregate::cancel))
        .route("/api/v1/datarange/delete", post(delete::delete_datarange))
        .route("/api/v1/dataranges", get(delete::list_dataranges))
        .route("/api/v1/download", post(download::download))
        .route("/api/v1/datapoints-bitmap", get(download::datapoints_bitmap))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(REQUEST_TIMEOUT),
        )
        .with_state(Arc::new(ctx))
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, axum::Json<serde_json::Value>) {
    let message = if err.is::<tower::timeout::error::Elapsed>() {
        format!("request exceeded the {}s timeout", REQUEST_TIMEOUT.as_secs())
    } else {
        format!("unhandled middleware error: {err}")
    };
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(serde_json::json!({ "error": message })))
}

async fn health() -> &'static str {
    "ok"
}
