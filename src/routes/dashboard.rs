use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::dashboard;
use crate::error::EngineError;
use crate::model::Environment;
use crate::state::SharedState;

/// GET /dashboard/summary — rollups for every environment.
pub async fn summary_all(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, EngineError> {
    let summaries = dashboard::summarize_all(&state)?;
    Ok(Json(serde_json::json!({
        "summaries": summaries,
    })))
}

/// GET /dashboard/summary/{environment}
pub async fn summary_for_environment(
    State(state): State<SharedState>,
    Path(environment): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let environment: Environment = environment
        .parse()
        .map_err(|_| EngineError::UnknownEnvironment(environment))?;
    let summary = dashboard::summarize(&state, environment)?;
    Ok(Json(summary))
}
