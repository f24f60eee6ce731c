use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::batch::BatchProgress;

/// `GET /api/status/:batch_id`: point-in-time progress of one batch.
pub async fn batch(
    State(ctx): State<ApiContext>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgress>, ApiError> {
    ctx.progress
        .snapshot(&batch_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Analysis {batch_id} not found")))
}

/// `GET /api/status`: ids of every tracked batch.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<String>>, ApiError> {
    let mut ids = ctx.progress.batch_ids()?;
    ids.sort();
    Ok(Json(ids))
}
