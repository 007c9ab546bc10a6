use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::AppResult;

#[derive(Deserialize)]
pub struct DownloadRequest {
    pub datas3t_name: String,
    pub first: i64,
    pub last: i64,
}

#[derive(Serialize)]
pub struct SegmentView {
    pub presigned_url: String,
    pub range: String,
}

#[derive(Serialize)]
pub struct DownloadResponse {
    pub segments: Vec<SegmentView>,
}

pub async fn download(State(ctx): State<AppState>, Json(req): Json<DownloadRequest>) -> AppResult<Json<DownloadResponse>> {
    let segments = crate::download::plan_download(&ctx, &req.datas3t_name, req.first, req.last).await?;
    Ok(Json(DownloadResponse {
        segments: segments.into_iter().map(|s| SegmentView { presigned_url: s.presigned_url, range: s.range }).collect(),
    }))
}

#[derive(Deserialize)]
pub struct DatapointsBitmapQuery {
    pub datas3t_name: String,
}

pub async fn datapoints_bitmap(State(ctx): State<AppState>, Query(query): Query<DatapointsBitmapQuery>) -> AppResult<impl IntoResponse> {
    let bitmap = crate::download::datapoints_bitmap(&ctx, &query.datas3t_name).await?;
    let mut buf = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut buf).map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], Bytes::from(buf)))
}
