//! Client tests against live local servers.
//!
//! The admin client talks to the real gateway router over the in-memory
//! store; the pipeline client talks to a stub backend.

use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bookmaker_admin_api::store::MemoryStore;
use bookmaker_admin_api::{build_router, AppState};
use bookmaker_client::{
    AdminApiClient, AdminApiError, CountMode, Filters, PipelineClient, PipelineError, RunAgent,
    SelectOptions, StartPipeline, DEFAULT_MODEL,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const SECRET: &str = "client-test-secret";

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn gateway() -> String {
    let state = AppState::new(Arc::new(MemoryStore::new()), Some(SECRET.to_string()));
    serve(build_router(state, 1024 * 1024)).await
}

// ── Admin gateway ──────────────────────────────────────────────

#[tokio::test]
async fn test_admin_client_crud_flow() {
    let url = gateway().await;
    let client = AdminApiClient::new(&url, SECRET);

    let inserted = client
        .insert(
            "tactics",
            &json!([
                {"project_id": "p1", "name": "Tear-off", "priority": 1},
                {"project_id": "p1", "name": "Underlayment", "priority": 2},
                {"project_id": "p1", "name": "Ridge vent", "priority": 3}
            ]),
        )
        .await
        .unwrap();
    assert_eq!(inserted.len(), 3);

    let page = client
        .select_with_count(
            "tactics",
            &Filters::new().eq("project_id", "p1").gte("priority", 2),
            &SelectOptions::new()
                .order("priority", false)
                .limit(1)
                .count(CountMode::Exact),
        )
        .await
        .unwrap();
    assert_eq!(page.count, Some(2));
    assert_eq!(page.rows[0]["name"], json!("Ridge vent"));

    let updated = client
        .update(
            "tactics",
            &json!({"category": "ventilation"}),
            &Filters::new().eq("name", "Ridge vent"),
        )
        .await
        .unwrap();
    assert_eq!(updated[0]["category"], json!("ventilation"));

    let single = client
        .select_single("tactics", &Filters::new().eq("category", "ventilation"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(single["priority"], json!(3));

    let removed = client
        .delete("tactics", &Filters::new().in_list("priority", [1, 2]))
        .await
        .unwrap();
    assert_eq!(removed.len(), 2);

    let rest = client
        .select("tactics", &Filters::new(), &SelectOptions::new())
        .await
        .unwrap();
    assert_eq!(rest.len(), 1);
}

#[tokio::test]
async fn test_admin_client_upsert() {
    let url = gateway().await;
    let client = AdminApiClient::new(&url, SECRET);

    client
        .upsert("glossary", &json!({"id": "g1", "english_term": "soffit"}))
        .await
        .unwrap();
    let rows = client
        .upsert("glossary", &json!({"id": "g1", "spanish_term": "sofito"}))
        .await
        .unwrap();
    assert_eq!(rows[0]["english_term"], json!("soffit"));
    assert_eq!(rows[0]["spanish_term"], json!("sofito"));
}

#[tokio::test]
async fn test_admin_client_surfaces_envelope_errors() {
    let url = gateway().await;

    let client = AdminApiClient::new(&url, SECRET);
    let err = client
        .delete("projects", &Filters::new().eq("id", "p1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("INVALID_ACTION"));

    let err = client
        .select("user_settings", &Filters::new(), &SelectOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("INVALID_TABLE"));

    let err = client
        .select_single("chapters", &Filters::new().eq("id", "missing"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("DATABASE_ERROR"));

    let wrong = AdminApiClient::new(&url, "not-the-secret");
    let err = wrong
        .select("chapters", &Filters::new(), &SelectOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdminApiError::Api { ref code, ref message }
            if code == "UNAUTHORIZED" && message == "Invalid API secret"
    ));
}

// ── Pipeline backend ───────────────────────────────────────────

async fn backend() -> String {
    let app = Router::new()
        .route("/health", get(|| async {
            Json(json!({"status": "healthy", "timestamp": "2025-01-01T00:00:00", "config_loaded": true}))
        }))
        .route("/api/phases", get(|| async {
            Json(json!([
                {"phase": 1, "agents": [
                    {"name": "analyzer", "phase": 1, "is_chapter_level": true, "depends_on": []}
                ]}
            ]))
        }))
        .route(
            "/api/projects/:id/status",
            get(|Path(id): Path<String>| async move {
                if id == "missing" {
                    return Err((StatusCode::NOT_FOUND, Json(json!({"detail": "Project not found"}))));
                }
                Ok(Json(json!({
                    "project_id": id, "status": "running", "current_phase": 3,
                    "total_chapters": 12, "completed_chapters": 4, "is_running": true
                })))
            }),
        )
        .route(
            "/api/projects/:id/start",
            post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({
                    "status": "started", "project_id": id,
                    "start_phase": body["start_phase"], "end_phase": body["end_phase"],
                    "model": body["model"]
                }))
            }),
        )
        .route(
            "/api/projects/:id/pause",
            post(|| async {
                (StatusCode::CONFLICT, Json(json!({"detail": "Pipeline is not running"})))
            }),
        )
        .route(
            "/api/projects/:id/resume",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/api/projects/:id/stop",
            post(|Path(id): Path<String>| async move {
                Json(json!({"status": "stopped", "project_id": id}))
            }),
        )
        .route(
            "/api/projects/:id/phases/:phase",
            post(|Path((id, phase)): Path<(String, u32)>, Json(body): Json<Value>| async move {
                assert_eq!(body["phase"], json!(phase));
                Json(json!({"status": "started", "project_id": id, "phase": phase}))
            }),
        )
        .route(
            "/api/projects/:id/agents/:name",
            post(|Path((_, name)): Path<(String, String)>, Json(body): Json<Value>| async move {
                Json(json!({
                    "success": true, "agent_name": name, "duration_ms": 1200,
                    "input_tokens": 10, "output_tokens": 20, "tool_calls": 1,
                    "output": body["model"], "error": null
                }))
            }),
        );
    serve(app).await
}

#[tokio::test]
async fn test_pipeline_status_and_health() {
    let client = PipelineClient::new(backend().await);

    let status = client.status("p1").await.unwrap();
    assert_eq!(status.project_id, "p1");
    assert_eq!(status.completed_chapters, 4);
    assert!(status.is_running);

    let health = client.health().await.unwrap();
    assert!(health.config_loaded);

    let phases = client.phases().await.unwrap();
    assert_eq!(phases[0].agents[0].name, "analyzer");
}

#[tokio::test]
async fn test_pipeline_controls() {
    let client = PipelineClient::new(backend().await);

    let started = client.start("p1", &StartPipeline::default()).await.unwrap();
    assert_eq!(started.status, "started");
    assert_eq!(started.start_phase, Some(1));
    assert_eq!(started.end_phase, Some(11));

    let stopped = client.stop("p1").await.unwrap();
    assert_eq!(stopped.status, "stopped");

    let phase = client.run_phase("p1", 4, None).await.unwrap();
    assert_eq!(phase.phase, Some(4));

    let result = client
        .run_agent(
            "p1",
            "editor",
            &RunAgent {
                phase: 5,
                chapter_id: Some("c1".into()),
                model: None,
            },
        )
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.agent_name, "editor");
    assert_eq!(result.output.as_deref(), Some(DEFAULT_MODEL));
}

#[tokio::test]
async fn test_pipeline_error_details() {
    let client = PipelineClient::new(backend().await);

    let err = client.status("missing").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Api { status: 404, ref detail } if detail == "Project not found"
    ));

    let err = client.pause("p1").await.unwrap_err();
    assert_eq!(err.to_string(), "Pipeline is not running");

    let err = client.resume("p1").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Api { status: 500, ref detail } if detail == "HTTP 500"
    ));
}
