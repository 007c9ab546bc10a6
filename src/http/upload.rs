use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::AppResult;
use crate::object_store::CompletedPart;

#[derive(Deserialize)]
pub struct StartUploadRequest {
    pub datas3t_name: String,
    pub first_idx: i64,
    pub num_points: i64,
    pub data_size: i64,
}

#[derive(Serialize)]
pub struct PartUploadUrlView {
    pub part_number: i32,
    pub url: String,
}

#[derive(Serialize)]
pub struct StartUploadResponse {
    pub upload_id: Uuid,
    pub direct: bool,
    pub index_put_url: String,
    pub data_put_url: Option<String>,
    pub part_upload_urls: Vec<PartUploadUrlView>,
}

impl From<crate::upload::StartUploadResponse> for StartUploadResponse {
    fn from(r: crate::upload::StartUploadResponse) -> Self {
        Self {
            upload_id: r.upload_id,
            direct: r.direct,
            index_put_url: r.index_put_url,
            data_put_url: r.data_put_url,
            part_upload_urls: r.part_upload_urls.into_iter().map(|p| PartUploadUrlView { part_number: p.part_number, url: p.url }).collect(),
        }
    }
}

pub async fn start(State(ctx): State<AppState>, Json(req): Json<StartUploadRequest>) -> AppResult<Json<StartUploadResponse>> {
    let resp = crate::upload::start(&ctx, &req.datas3t_name, req.first_idx, req.num_points, req.data_size).await?;
    Ok(Json(resp.into()))
}

#[derive(Debug, Deserialize)]
pub struct PartEtag {
    pub part_number: i32,
    pub e_tag: String,
}

#[derive(Deserialize)]
pub struct CompleteUploadRequest {
    pub upload_id: Uuid,
    pub part_etags: Option<Vec<PartEtag>>,
}

#[derive(Serialize)]
pub struct DatarangeView {
    pub id: i64,
    pub min_key: i64,
    pub max_key: i64,
    pub size_bytes: i64,
}

impl From<crate::db::models::Datarange> for DatarangeView {
    fn from(d: crate::db::models::Datarange) -> Self {
        Self {
            id: d.id,
            min_key: d.min_key,
            max_key: d.max_key,
            size_bytes: d.size_bytes,
        }
    }
}

pub async fn complete(State(ctx): State<AppState>, Json(req): Json<CompleteUploadRequest>) -> AppResult<Json<DatarangeView>> {
    let part_etags = req.part_etags.map(|parts| {
        parts
            .into_iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                e_tag: p.e_tag,
            })
            .collect()
    });
    let datarange = crate::upload::complete(&ctx, crate::upload::CompleteUploadRequest { upload_id: req.upload_id, part_etags }).await?;
    Ok(Json(datarange.into()))
}

#[derive(Deserialize)]
pub struct CancelUploadRequest {
    pub upload_id: Uuid,
}

pub async fn cancel(State(ctx): State<AppState>, Json(req): Json<CancelUploadRequest>) -> AppResult<()> {
    crate::upload::cancel(&ctx, req.upload_id).await
}
