//! HTTP step behavior against a mocked server

use khor_config::{ExecutionContext, OrchestratorConfig};
use khor_graph::GraphStore;
use khor_workflow::{load_pipeline, PipelineRunner, StepStatus};
use serde_json::Map;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline_ttl(url: &str, verb: &str, extra: &str) -> String {
    format!(
        r#"
        @prefix kh: <https://khor.dev/ontology#> .
        @prefix op: <https://khor.dev/op#> .
        op:p op:steps ( op:call ) .
        op:call a kh:HttpStep ;
            op:httpUrl "{url}" ;
            op:httpMethod "{verb}" ;
            op:onError "continue" {extra} .
        "#
    )
}

async fn run_pipeline(ttl: &str, root: &std::path::Path) -> khor_workflow::PipelineRun {
    let store = GraphStore::new().unwrap();
    store.ingest_turtle(ttl, None).unwrap();
    let snapshot = store.snapshot();
    let pipeline = load_pipeline(&snapshot, "https://khor.dev/op#p").unwrap();
    let mut config = OrchestratorConfig::default();
    config.project_root = root.to_path_buf();
    let runner = PipelineRunner::new(config, ExecutionContext::rooted(root));
    runner.run(&snapshot, &pipeline, Map::new()).await
}

#[tokio::test]
async fn successful_get_parses_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "name": "Ada"})),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ttl = pipeline_ttl(&format!("{}/users/1", server.uri()), "GET", "");
    let run = run_pipeline(&ttl, dir.path()).await;

    assert_eq!(run.results[0].status, StepStatus::Ok);
    let output = run.context.step_output("https://khor.dev/op#call").unwrap();
    assert_eq!(output["success"], true);
    assert_eq!(output["status"], 200);
    assert_eq!(output["responseData"]["id"], 1);
    assert_eq!(output["method"], "GET");
}

#[tokio::test]
async fn not_found_surfaces_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ttl = pipeline_ttl(&format!("{}/users/404", server.uri()), "GET", "");
    let run = run_pipeline(&ttl, dir.path()).await;

    assert_eq!(run.results[0].status, StepStatus::Error);
    assert_eq!(run.results[0].error.as_deref(), Some("HTTP 404: Not Found"));
    let output = run.context.step_output("https://khor.dev/op#call").unwrap();
    assert_eq!(output["success"], false);
    assert_eq!(output["status"], 404);
}

#[tokio::test]
async fn json_body_and_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header("x-khor", "1"))
        .and(body_json(serde_json::json!({"n": 3})))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let extra = r#";
            op:httpHeaders "{\"x-khor\": \"1\"}" ;
            op:httpBody "{\"n\": 3}" "#;
    let ttl = pipeline_ttl(&format!("{}/ingest", server.uri()), "POST", extra);
    let run = run_pipeline(&ttl, dir.path()).await;

    assert_eq!(run.results[0].status, StepStatus::Ok, "{:?}", run.results[0].error);
    let output = run.context.step_output("https://khor.dev/op#call").unwrap();
    assert_eq!(output["status"], 201);
}

#[tokio::test]
async fn connection_failure_reads_as_request_failed() {
    let dir = TempDir::new().unwrap();
    // Unroutable port on localhost
    let ttl = pipeline_ttl("http://127.0.0.1:9/unreachable", "GET", "");
    let run = run_pipeline(&ttl, dir.path()).await;

    assert_eq!(run.results[0].status, StepStatus::Error);
    assert_eq!(run.results[0].error.as_deref(), Some("HTTP request failed"));
}

#[tokio::test]
async fn missing_method_is_a_step_error() {
    let dir = TempDir::new().unwrap();
    let ttl = r#"
        @prefix kh: <https://khor.dev/ontology#> .
        @prefix op: <https://khor.dev/op#> .
        op:p op:steps ( op:call ) .
        op:call a kh:HttpStep ;
            op:httpUrl "https://example.org/x" ;
            op:onError "continue" .
    "#;
    let run = run_pipeline(ttl, dir.path()).await;
    assert_eq!(run.results[0].status, StepStatus::Error);
    assert!(run.results[0]
        .error
        .as_ref()
        .unwrap()
        .contains("HTTP step missing method"));
}
