use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub executions_in_flight: usize,
    pub data_dir: String,
    pub scripts_dir: String,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        executions_in_flight: state.running_count(),
        data_dir: state.config.data_dir.display().to_string(),
        scripts_dir: state.config.scripts_dir.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes_to_json() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            executions_in_flight: 2,
            data_dir: "/tmp/data".to_string(),
            scripts_dir: "/tmp/scripts".to_string(),
        };
        let json = serde_json::to_string(&response).expect("should serialize");
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"executions_in_flight\":2"));
    }
}
