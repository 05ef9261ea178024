use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::EngineError;
use crate::state::SharedState;

/// GET /testcases/{id}/results — execution history, newest first.
pub async fn case_results(
    State(state): State<SharedState>,
    Path(case_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    if state.store.get_case(case_id)?.is_none() {
        return Err(EngineError::CaseNotFound(case_id));
    }
    let results = state.store.list_results(case_id)?;
    Ok(Json(serde_json::json!({
        "case_id": case_id,
        "results": results,
    })))
}

/// GET /results/{id} — one execution result, including a still-running one.
pub async fn result_by_id(
    State(state): State<SharedState>,
    Path(result_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let result = state
        .store
        .get_result(result_id)?
        .ok_or(EngineError::ResultNotFound(result_id))?;
    Ok(Json(result))
}
