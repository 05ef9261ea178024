use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::EngineError;
use crate::hierarchy;
use crate::state::SharedState;

/// GET /folders/tree — the full folder forest with inferred kinds.
pub async fn folder_tree(State(state): State<SharedState>) -> Result<impl IntoResponse, EngineError> {
    let folders = state.store.list_folders()?;
    let tree = hierarchy::build_tree(&folders)?;
    Ok(Json(serde_json::json!({
        "tree": tree,
    })))
}
