use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Test case {0} not found")]
    CaseNotFound(i64),

    #[error("Execution result {0} not found")]
    ResultNotFound(i64),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Unsupported tool kind: {0}")]
    UnsupportedToolKind(String),

    #[error("Parameter '{key}' is not recognized for {tool} jobs")]
    UnrecognizedParameter { tool: &'static str, key: String },

    #[error("Execution already in progress for test case {0}")]
    ExecutionAlreadyInProgress(i64),

    #[error("No execution in progress for test case {0}")]
    NoSuchExecution(i64),

    #[error("Folder graph contains a cycle (folder {0} is its own ancestor)")]
    CyclicFolderGraph(i64),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::CaseNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::ResultNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::ScriptNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::UnsupportedToolKind(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::UnrecognizedParameter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::ExecutionAlreadyInProgress(_) => StatusCode::CONFLICT,
            EngineError::NoSuchExecution(_) => StatusCode::CONFLICT,
            EngineError::CyclicFolderGraph(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::UnknownEnvironment(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
