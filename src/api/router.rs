use axum::routing::get;
use axum::Router;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the status router with all endpoints under `/api/`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn status_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/status", get(endpoints::status::list))
        .route("/status/:batch_id", get(endpoints::status::batch))
        .route("/results", get(endpoints::results::list))
        .route("/results/:filename", get(endpoints::results::download))
        .with_state(ctx);

    Router::new().nest("/api", api)
}
