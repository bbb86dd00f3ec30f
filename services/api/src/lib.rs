pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};

pub use state::{AppState, InterviewLocks, ReportModels, TokenSettings};

pub fn build_router(state: AppState) -> Router {
    // Permissive CORS so a separately served frontend can call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/token", get(routes::token))
        .route("/api/interviews/{id}/finalize", post(routes::finalize))
        .route("/api/interviews/{id}/report", get(routes::report))
        .route(
            "/api/interviews/{id}/report_overrides",
            patch(routes::patch_overrides),
        )
        .layer(cors)
        .with_state(state)
}
