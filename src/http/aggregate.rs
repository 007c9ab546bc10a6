use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::upload::{DatarangeView, PartEtag, PartUploadUrlView};
use super::AppState;
use crate::error::AppResult;
use crate::object_store::CompletedPart;

#[derive(Deserialize)]
pub struct StartAggregateRequest {
    pub datas3t_name: String,
    pub first_idx: i64,
    pub last_idx: i64,
}

#[derive(Serialize)]
pub struct SourceDownloadUrlsView {
    pub source_id: i64,
    pub data_get_url: String,
    pub index_get_url: String,
}

#[derive(Serialize)]
pub struct StartAggregateResponse {
    pub aggregate_id: Uuid,
    pub direct: bool,
    pub sources: Vec<SourceDownloadUrlsView>,
    pub index_put_url: String,
    pub data_put_url: Option<String>,
    pub part_upload_urls: Vec<PartUploadUrlView>,
}

impl From<crate::aggregate::StartAggregateResponse> for StartAggregateResponse {
    fn from(r: crate::aggregate::StartAggregateResponse) -> Self {
        Self {
            aggregate_id: r.aggregate_id,
            direct: r.direct,
            sources: r
                .sources
                .into_iter()
                .map(|s| SourceDownloadUrlsView {
                    source_id: s.source_id,
                    data_get_url: s.data_get_url,
                    index_get_url: s.index_get_url,
                })
                .collect(),
            index_put_url: r.index_put_url,
            data_put_url: r.data_put_url,
            part_upload_urls: r.part_upload_urls.into_iter().map(|p| PartUploadUrlView { part_number: p.part_number, url: p.url }).collect(),
        }
    }
}

pub async fn start(State(ctx): State<AppState>, Json(req): Json<StartAggregateRequest>) -> AppResult<Json<StartAggregateResponse>> {
    let resp = crate::aggregate::start(&ctx, &req.datas3t_name, req.first_idx, req.last_idx).await?;
    Ok(Json(resp.into()))
}

#[derive(Deserialize)]
pub struct CompleteAggregateRequest {
    pub aggregate_id: Uuid,
    pub part_etags: Option<Vec<PartEtag>>,
    pub total_data_size: i64,
}

pub async fn complete(State(ctx): State<AppState>, Json(req): Json<CompleteAggregateRequest>) -> AppResult<Json<DatarangeView>> {
    let part_etags = req.part_etags.map(|parts| {
        parts
            .into_iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                e_tag: p.e_tag,
            })
            .collect()
    });
    let datarange = crate::aggregate::complete(
        &ctx,
        crate::aggregate::CompleteAggregateRequest {
            aggregate_id: req.aggregate_id,
            part_etags,
            total_data_size: req.total_data_size,
        },
    )
    .await?;
    Ok(Json(datarange.into()))
}

#[derive(Deserialize)]
pub struct CancelAggregateRequest {
    pub aggregate_id: Uuid,
}

pub async fn cancel(State(ctx): State<AppState>, Json(req): Json<CancelAggregateRequest>) -> AppResult<()> {
    crate::aggregate::cancel(&ctx, req.aggregate_id).await
}
