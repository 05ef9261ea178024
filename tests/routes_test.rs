#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use testlab_engine::config::EngineConfig;
use testlab_engine::model::{Environment, FolderKind, Parameters};
use testlab_engine::server::build_router;
use testlab_engine::state::{EngineState, SharedState};
use testlab_engine::store::{NewFolder, NewTestCase, TestStore};

struct Harness {
    state: SharedState,
    router: Router,
    scripts: TempDir,
    _data: TempDir,
}

fn harness() -> Harness {
    let data = TempDir::new().unwrap();
    let scripts = TempDir::new().unwrap();
    let store = TestStore::new(data.path()).unwrap();
    let config = EngineConfig {
        data_dir: data.path().to_path_buf(),
        scripts_dir: scripts.path().to_path_buf(),
        port: 0,
        k6_timeout: Duration::from_secs(60),
        browser_timeout: Duration::from_secs(60),
        synthetic_fallback: true,
        k6_bin: PathBuf::from("k6"),
        playwright_bin: PathBuf::from("npx"),
        python_bin: PathBuf::from("/bin/sh"),
    };
    let state = Arc::new(EngineState::new(config, store));
    Harness {
        router: build_router(state.clone()),
        state,
        scripts,
        _data: data,
    }
}

impl Harness {
    fn script_case(&self, name: &str, body: &str) -> i64 {
        let file = format!("{}.py", name);
        std::fs::write(self.scripts.path().join(&file), body).unwrap();
        self.state
            .store
            .insert_case(&NewTestCase {
                name: name.to_string(),
                main_category: None,
                sub_category: None,
                detail_category: None,
                tool_kind: "selenium".to_string(),
                script_path: file,
                environment: Environment::Dev,
                folder_id: None,
                parameters: Parameters::new(),
                status: None,
            })
            .unwrap()
    }

    async fn request(&self, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness();
    let (status, body) = h.request("GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["executions_in_flight"], 0);
}

#[tokio::test]
async fn test_execute_waits_and_returns_result() {
    let h = harness();
    let case_id = h.script_case("ok", "exit 0\n");

    let (status, body) = h
        .request("POST", &format!("/testcases/{}/execute", case_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["outcome"], "pass");
    assert_eq!(body["result"]["case_id"], case_id);
}

#[tokio::test]
async fn test_execute_nowait_returns_running_result_id() {
    let h = harness();
    let case_id = h.script_case("bg", "exit 0\n");

    let (status, body) = h
        .request("POST", &format!("/testcases/{}/execute?wait=false", case_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let result_id = body["result_id"].as_i64().unwrap();
    assert!(h.state.store.get_result(result_id).unwrap().is_some());
}

#[tokio::test]
async fn test_execute_unknown_case_is_404() {
    let h = harness();
    let (status, body) = h.request("POST", "/testcases/999/execute").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_execute_missing_script_is_422() {
    let h = harness();
    let case_id = h
        .state
        .store
        .insert_case(&NewTestCase {
            name: "ghost".to_string(),
            main_category: None,
            sub_category: None,
            detail_category: None,
            tool_kind: "selenium".to_string(),
            script_path: "missing.py".to_string(),
            environment: Environment::Dev,
            folder_id: None,
            parameters: Parameters::new(),
            status: None,
        })
        .unwrap();

    let (status, _) = h
        .request("POST", &format!("/testcases/{}/execute", case_id))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_cancel_without_execution_is_409() {
    let h = harness();
    let case_id = h.script_case("idle", "exit 0\n");
    let (status, _) = h
        .request("POST", &format!("/testcases/{}/cancel", case_id))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_results_listing_and_unknown_case() {
    let h = harness();
    let case_id = h.script_case("hist", "exit 0\n");

    let (status, body) = h
        .request("GET", &format!("/testcases/{}/results", case_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 0);

    h.request("POST", &format!("/testcases/{}/execute", case_id))
        .await;
    let (_, body) = h
        .request("GET", &format!("/testcases/{}/results", case_id))
        .await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["outcome"], "pass");

    let (status, _) = h.request("GET", "/testcases/999/results").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_folder_tree_endpoint() {
    let h = harness();
    let root = h
        .state
        .store
        .insert_folder(&NewFolder {
            name: "dev".to_string(),
            kind: None,
            environment: Some(Environment::Dev),
            parent_id: None,
        })
        .unwrap();
    h.state
        .store
        .insert_folder(&NewFolder {
            name: "2025-08-30".to_string(),
            kind: None,
            environment: None,
            parent_id: Some(root),
        })
        .unwrap();

    let (status, body) = h.request("GET", "/folders/tree").await;
    assert_eq!(status, StatusCode::OK);
    let tree = body["tree"].as_array().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0]["kind"], "environment");
    assert_eq!(tree[0]["children"][0]["kind"], "deployment_date");
    // Environment inherited from the root.
    assert_eq!(tree[0]["children"][0]["environment"], "dev");
}

#[tokio::test]
async fn test_dashboard_summary_for_environment() {
    let h = harness();
    let folder = h
        .state
        .store
        .insert_folder(&NewFolder {
            name: "dev".to_string(),
            kind: Some(FolderKind::Environment),
            environment: Some(Environment::Dev),
            parent_id: None,
        })
        .unwrap();
    let case_id = h.script_case("rollup", "exit 0\n");
    // Move the case under the dev folder by recreating it there.
    h.state.store.delete_case(case_id).unwrap();
    let case_id = h
        .state
        .store
        .insert_case(&NewTestCase {
            name: "rollup".to_string(),
            main_category: None,
            sub_category: None,
            detail_category: None,
            tool_kind: "selenium".to_string(),
            script_path: "rollup.py".to_string(),
            environment: Environment::Dev,
            folder_id: Some(folder),
            parameters: Parameters::new(),
            status: None,
        })
        .unwrap();

    // One statusless case: the placeholder distribution applies.
    let (status, body) = h.request("GET", "/dashboard/summary/dev").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["is_synthetic"], true);

    // A real execution replaces the placeholder.
    h.request("POST", &format!("/testcases/{}/execute", case_id))
        .await;
    let (_, body) = h.request("GET", "/dashboard/summary/dev").await;
    assert_eq!(body["is_synthetic"], false);
    assert_eq!(body["passed"], 1);
    assert_eq!(body["pass_rate"], 100.0);
}

#[tokio::test]
async fn test_folder_environment_rollup_updates_despite_case_field() {
    let h = harness();
    let folder = h
        .state
        .store
        .insert_folder(&NewFolder {
            name: "staging".to_string(),
            kind: Some(FolderKind::Environment),
            environment: Some(Environment::Staging),
            parent_id: None,
        })
        .unwrap();
    // The case's own environment field disagrees with its owning folder;
    // the folder decides which rollup the case belongs to.
    let file = "mislabeled.py";
    std::fs::write(h.scripts.path().join(file), "exit 0\n").unwrap();
    let case_id = h
        .state
        .store
        .insert_case(&NewTestCase {
            name: "mislabeled".to_string(),
            main_category: None,
            sub_category: None,
            detail_category: None,
            tool_kind: "selenium".to_string(),
            script_path: file.to_string(),
            environment: Environment::Dev,
            folder_id: Some(folder),
            parameters: Parameters::new(),
            status: None,
        })
        .unwrap();

    // Prime the staging cache, then execute.
    let (_, body) = h.request("GET", "/dashboard/summary/staging").await;
    assert_eq!(body["is_synthetic"], true);

    h.request("POST", &format!("/testcases/{}/execute", case_id))
        .await;

    let (_, body) = h.request("GET", "/dashboard/summary/staging").await;
    assert_eq!(body["is_synthetic"], false);
    assert_eq!(body["passed"], 1);
}

#[tokio::test]
async fn test_dashboard_summary_all_environments() {
    let h = harness();
    let (status, body) = h.request("GET", "/dashboard/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summaries"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_dashboard_unknown_environment_is_422() {
    let h = harness();
    let (status, body) = h.request("GET", "/dashboard/summary/mars").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("mars"));
}
