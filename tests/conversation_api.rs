//! Integration tests for the conversation engine and its REST API.
//!
//! Each test spins up an Axum server on a random port backed by an in-memory
//! database and a stub LLM, drives the engine the way a channel would, and
//! checks what the REST endpoints report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpListener;

use fitness_bot::conversation::{ApiState, ConversationEngine, EngineConfig, api_routes};
use fitness_bot::error::LlmError;
use fitness_bot::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use fitness_bot::planner::{LlmPlanGenerator, PlannerConfig};
use fitness_bot::predictor::{LinearProgressModel, ProgressPredictor};
use fitness_bot::store::LibSqlBackend;

/// Stub LLM provider for integration tests (no real API calls).
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: "  Day 1: 20 squats\nDay 2: rest  ".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// Start an Axum server on a random port, return (base url, engine).
async fn start_server() -> (String, Arc<ConversationEngine>) {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let llm: Arc<dyn LlmProvider> = Arc::new(StubLlm);
    let planner = Arc::new(LlmPlanGenerator::new(llm, PlannerConfig::default()));
    let model = LinearProgressModel::from_json_str(include_str!("../models/progress_model.json"))
        .unwrap();
    let predictor: Option<Arc<dyn ProgressPredictor>> = Some(Arc::new(model));
    let engine = Arc::new(ConversationEngine::new(
        store,
        planner,
        predictor,
        EngineConfig::default(),
    ));
    let app = api_routes(ApiState {
        engine: Arc::clone(&engine),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), engine)
}

async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

async fn create_profile(engine: &ConversationEngine, user: &str) {
    for answer in [
        "/start",
        "Alice",
        "29",
        "female",
        "65",
        "170",
        "weight loss",
        "intermediate",
    ] {
        engine.handle_message(user, answer).await;
    }
}

#[tokio::test]
async fn health_endpoint() {
    let (base, _engine) = start_server().await;
    let (status, body) = get_json(&format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_user_has_no_profile() {
    let (base, _engine) = start_server().await;
    let (status, body) = get_json(&format!("{base}/api/users/nobody/profile")).await;
    assert_eq!(status, 404);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn flow_status_tracks_the_dialogue() {
    let (base, engine) = start_server().await;
    let url = format!("{base}/api/users/42/flow");

    let (_, body) = get_json(&url).await;
    assert_eq!(body, serde_json::json!({"state": "idle"}));

    engine.handle_message("42", "/start").await;
    engine.handle_message("42", "Alice").await;

    let (status, body) = get_json(&url).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"], "in_flow");
    assert_eq!(body["flow"], "profile_creation");
    assert_eq!(body["step"], 1);
    assert_eq!(body["step_name"], "age");

    engine.handle_message("42", "/cancel").await;
    let (_, body) = get_json(&url).await;
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn created_profile_and_plan_are_served() {
    let (base, engine) = start_server().await;
    create_profile(&engine, "42").await;

    let url = format!("{base}/api/users/42/profile");
    let (status, body) = get_json(&url).await;
    assert_eq!(status, 200);
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["age"], 29);
    assert_eq!(body["gender"], "female");
    assert_eq!(body["fitness_goal"], "weight_loss");
    assert_eq!(body["fitness_level"], "intermediate");
    assert!(body.get("last_plan").is_none());

    let reply = engine.handle_message("42", "/plan").await;
    assert_eq!(reply.text, "Your Fitness Plan:\nDay 1: 20 squats\nDay 2: rest");

    let (_, body) = get_json(&url).await;
    assert_eq!(body["last_plan"], "Day 1: 20 squats\nDay 2: rest");
}

#[tokio::test]
async fn prediction_with_shipped_model() {
    let (_base, engine) = start_server().await;
    create_profile(&engine, "7").await;

    engine.handle_message("7", "/predict").await;
    for answer in ["4", "45", "7", "yes", "no"] {
        engine.handle_message("7", answer).await;
    }
    let reply = engine.handle_message("7", "80").await;

    assert!(reply.text.starts_with("Estimated time to reach your goal: "));
    assert!(reply.text.contains("weeks"));
    assert!(reply.text.contains("Expected weight change: -"));
}
