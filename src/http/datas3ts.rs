use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{AppError, AppResult};

#[derive(Serialize)]
pub struct Datas3tView {
    pub name: String,
    pub bucket_name: String,
    pub upload_counter: i64,
}

impl From<crate::db::models::Datas3t> for Datas3tView {
    fn from(d: crate::db::models::Datas3t) -> Self {
        Self {
            name: d.name,
            bucket_name: d.bucket_name,
            upload_counter: d.upload_counter,
        }
    }
}

pub async fn list(State(ctx): State<AppState>) -> AppResult<Json<Vec<Datas3tView>>> {
    let datas3ts = crate::db::datas3ts::list(ctx.catalog.pool()).await?;
    Ok(Json(datas3ts.into_iter().map(Datas3tView::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateDatas3tRequest {
    pub name: String,
    pub bucket_name: String,
}

pub async fn create(State(ctx): State<AppState>, Json(req): Json<CreateDatas3tRequest>) -> AppResult<Json<Datas3tView>> {
    crate::validation::validate_name("datas3t", &req.name)?;

    crate::db::buckets::get(ctx.catalog.pool(), &req.bucket_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("bucket {} not found", req.bucket_name)))?;

    let datas3t = crate::db::datas3ts::insert(ctx.catalog.pool(), &req.name, &req.bucket_name).await?;
    Ok(Json(Datas3tView::from(datas3t)))
}

#[derive(Deserialize)]
pub struct NamedDatas3tRequest {
    pub datas3t_name: String,
}

pub async fn remove(State(ctx): State<AppState>, Json(req): Json<NamedDatas3tRequest>) -> AppResult<()> {
    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), &req.datas3t_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {} not found", req.datas3t_name)))?;

    let dataranges = crate::db::dataranges::list_for_datas3t(ctx.catalog.pool(), datas3t.id).await?;
    if !dataranges.is_empty() {
        return Err(AppError::Conflict(format!("datas3t {} still has {} dataranges", req.datas3t_name, dataranges.len())));
    }

    crate::db::datas3ts::delete_by_name(ctx.catalog.pool(), &req.datas3t_name).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct ImportRequest {
    pub bucket_name: String,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub imported_datas3ts: Vec<String>,
}

pub async fn import(State(ctx): State<AppState>, Json(req): Json<ImportRequest>) -> AppResult<Json<ImportResponse>> {
    let imported_datas3ts = crate::import::import(&ctx, &req.bucket_name).await?;
    Ok(Json(ImportResponse { imported_datas3ts }))
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub deleted_dataranges: usize,
}

pub async fn clear(State(ctx): State<AppState>, Json(req): Json<NamedDatas3tRequest>) -> AppResult<Json<ClearResponse>> {
    let deleted_dataranges = crate::delete::clear(&ctx, &req.datas3t_name).await?;
    Ok(Json(ClearResponse { deleted_dataranges }))
}

