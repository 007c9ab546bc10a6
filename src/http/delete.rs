use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::upload::DatarangeView;
use super::AppState;
use crate::error::AppResult;

#[derive(Deserialize)]
pub struct DeleteDatarangeRequest {
    pub datas3t_name: String,
    pub min_key: i64,
    pub max_key: i64,
}

pub async fn delete_datarange(State(ctx): State<AppState>, Json(req): Json<DeleteDatarangeRequest>) -> AppResult<()> {
    crate::delete::delete(&ctx, &req.datas3t_name, req.min_key, req.max_key).await
}

#[derive(Deserialize)]
pub struct ListDatarangesQuery {
    pub datas3t_name: String,
}

#[derive(Serialize)]
pub struct ListDatarangesResponse {
    pub dataranges: Vec<DatarangeView>,
}

pub async fn list_dataranges(State(ctx): State<AppState>, Query(query): Query<ListDatarangesQuery>) -> AppResult<Json<ListDatarangesResponse>> {
    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), &query.datas3t_name)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("datas3t {} not found", query.datas3t_name)))?;

    let dataranges = crate::db::dataranges::list_for_datas3t(ctx.catalog.pool(), datas3t.id).await?;
    Ok(Json(ListDatarangesResponse {
        dataranges: dataranges.into_iter().map(DatarangeView::from).collect(),
    }))
}
