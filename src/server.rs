use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Execution
        .route(
            "/testcases/{id}/execute",
            post(crate::routes::execute::execute_case),
        )
        .route(
            "/testcases/{id}/cancel",
            post(crate::routes::execute::cancel_case),
        )
        // Results
        .route(
            "/testcases/{id}/results",
            get(crate::routes::results::case_results),
        )
        .route("/results/{id}", get(crate::routes::results::result_by_id))
        // Folder hierarchy
        .route("/folders/tree", get(crate::routes::folders::folder_tree))
        // Dashboard
        .route(
            "/dashboard/summary",
            get(crate::routes::dashboard::summary_all),
        )
        .route(
            "/dashboard/summary/{environment}",
            get(crate::routes::dashboard::summary_for_environment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .with_state(state)
}
