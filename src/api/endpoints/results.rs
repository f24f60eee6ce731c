use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::results::{
    list_recent_results, resolve_result_file, ResultSummary, RECENT_RESULTS_LIMIT,
};

#[derive(Serialize)]
pub struct ResultsResponse {
    pub results: Vec<ResultSummary>,
}

/// `GET /api/results`: the most recent saved diagnoses, newest first.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<ResultsResponse>, ApiError> {
    let dir = ctx.results_dir.clone();
    let results =
        tokio::task::spawn_blocking(move || list_recent_results(&dir, RECENT_RESULTS_LIMIT))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(|e| ApiError::Internal(format!("Listing results failed: {e}")))?;
    Ok(Json(ResultsResponse { results }))
}

/// `GET /api/results/:filename`: one saved report as a text attachment.
pub async fn download(
    State(ctx): State<ApiContext>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = resolve_result_file(&ctx.results_dir, &filename)
        .ok_or_else(|| ApiError::NotFound(format!("Result {filename} not found")))?;

    let body = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Reading {}: {e}", path.display())))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}
