use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::dispatcher;
use crate::error::EngineError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ExecuteQuery {
    /// When false the handler returns as soon as the Running row exists;
    /// the execution finishes in the background.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// POST /testcases/{id}/execute
pub async fn execute_case(
    State(state): State<SharedState>,
    Path(case_id): Path<i64>,
    Query(query): Query<ExecuteQuery>,
) -> Result<impl IntoResponse, EngineError> {
    if query.wait {
        let result = dispatcher::execute(&state, case_id).await?;
        Ok(Json(serde_json::json!({
            "result": result,
        })))
    } else {
        let handle = dispatcher::start(&state, case_id).await?;
        Ok(Json(serde_json::json!({
            "result_id": handle.result_id,
            "status": "running",
        })))
    }
}

/// POST /testcases/{id}/cancel
pub async fn cancel_case(
    State(state): State<SharedState>,
    Path(case_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    // None only in the instant before the Running row is assigned; the
    // cancel signal has landed either way.
    let result_id = dispatcher::cancel(&state, case_id)?;
    Ok(Json(serde_json::json!({
        "result_id": result_id,
        "status": "cancelling",
    })))
}
