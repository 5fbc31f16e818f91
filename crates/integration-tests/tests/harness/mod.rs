//! Mock vendor backends for integration tests
//!
//! A single axum server answers on the paths every adapter calls, with canned
//! replies in each wire format. Azure and Vertex routes check the credentials
//! and addressing those backends require.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use quill_config::Config;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Reply used when a test does not set one
pub const DEFAULT_REPLY: &str = "Hello from the mock vendor";

/// How long a stalled handler waits before answering
const STALL: Duration = Duration::from_secs(30);

/// Key every mock section configures
pub const API_KEY: &str = "test-key";

/// Bearer token the Vertex section configures
pub const VERTEX_TOKEN: &str = "ya29.test-token";

/// Azure REST API version the adapter sends by default
const AZURE_API_VERSION: &str = "2024-06-01";

/// Backoff shared by every scenario, appended after the test's own sections
const RETRY_SECTION: &str = "[retry]\nbase_delay_ms = 1\nmax_retries = 3\n";

/// Parse `sections` with a short timeout and fast backoff
///
/// Top-level keys in `sections` must precede its tables.
pub fn config(sections: &str) -> Config {
    Config::from_toml_str(&format!("request_timeout_secs = 10\n{sections}\n{RETRY_SECTION}")).unwrap()
}

/// Mock vendor server
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<VendorState>,
}

/// Configures a [`MockVendor`] before it starts
#[derive(Default)]
pub struct MockVendorBuilder {
    reply: Option<String>,
    missing: Vec<String>,
    rate_limited: u32,
    stall: bool,
    truncated: bool,
    quota_mid_stream: bool,
}

struct VendorState {
    reply: String,
    /// Models answered with 404
    missing: Vec<String>,
    /// Remaining completion calls answered with 429
    rate_limited: AtomicU32,
    stall: bool,
    /// Streams close without the vendor's end marker
    truncated: bool,
    /// Remaining Anthropic streams that fail with a quota error after one fragment
    quota_mid_stream: AtomicU32,
    completions: AtomicU32,
    requested_models: Mutex<Vec<String>>,
}

impl MockVendorBuilder {
    pub fn reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_owned());
        self
    }

    /// Reject `model` as unknown
    pub fn missing(mut self, model: &str) -> Self {
        self.missing.push(model.to_owned());
        self
    }

    /// Answer the first `n` completion calls with 429
    pub const fn rate_limited(mut self, n: u32) -> Self {
        self.rate_limited = n;
        self
    }

    /// Hold every completion call open instead of answering
    pub const fn stall(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Close every stream before its end marker
    pub const fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// Fail the first Anthropic stream with a quota error after one fragment
    pub const fn quota_mid_stream(mut self) -> Self {
        self.quota_mid_stream = true;
        self
    }

    pub async fn start(self) -> anyhow::Result<MockVendor> {
        let state = Arc::new(VendorState {
            reply: self.reply.unwrap_or_else(|| DEFAULT_REPLY.to_owned()),
            missing: self.missing,
            rate_limited: AtomicU32::new(self.rate_limited),
            stall: self.stall,
            truncated: self.truncated,
            quota_mid_stream: AtomicU32::new(u32::from(self.quota_mid_stream)),
            completions: AtomicU32::new(0),
            requested_models: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(openai_chat))
            .route("/v1/models/{id}", routing::get(openai_model))
            .route("/v1/messages", routing::post(anthropic_messages))
            .route(
                "/v1beta/models/{call}",
                routing::get(gemini_model).post(gemini_generate),
            )
            .route("/api/generate", routing::post(ollama_generate))
            .route("/api/tags", routing::get(ollama_tags))
            .route("/api/version", routing::get(ollama_version))
            .route(
                "/openai/deployments/{deployment}/chat/completions",
                routing::post(azure_chat),
            )
            .route(
                "/v1/projects/{project}/locations/{location}/publishers/google/models/{call}",
                routing::post(vertex_generate),
            )
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockVendor { addr, shutdown, state })
    }
}

impl MockVendor {
    pub fn builder() -> MockVendorBuilder {
        MockVendorBuilder::default()
    }

    /// Start with default behavior
    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Absolute URL for a path on the mock
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Completion calls received, rejected ones included
    pub fn completion_count(&self) -> u32 {
        self.state.completions.load(Ordering::Relaxed)
    }

    /// Model of every completion call, in arrival order
    pub fn requested_models(&self) -> Vec<String> {
        self.state.requested_models.lock().unwrap().clone()
    }

    pub fn openai_section(&self) -> String {
        format!(
            "[providers.openai]\napi_key = \"{API_KEY}\"\nbase_url = \"{}\"\n",
            self.url("/v1")
        )
    }

    pub fn anthropic_section(&self) -> String {
        format!(
            "[providers.anthropic]\napi_key = \"{API_KEY}\"\nbase_url = \"{}\"\n",
            self.url("/v1")
        )
    }

    pub fn gemini_section(&self) -> String {
        format!(
            "[providers.gemini]\napi_key = \"{API_KEY}\"\nbase_url = \"{}\"\n",
            self.url("/v1beta")
        )
    }

    pub fn azure_section(&self, deployment: &str) -> String {
        format!(
            "[providers.azure]\napi_key = \"{API_KEY}\"\nendpoint = \"{}\"\ndeployment = \"{deployment}\"\n",
            self.url("/")
        )
    }

    pub fn vertex_section(&self, project: &str) -> String {
        format!(
            "[providers.vertex]\nproject_id = \"{project}\"\naccess_token = \"{VERTEX_TOKEN}\"\nbase_url = \"{}\"\n",
            self.url("/v1")
        )
    }

    pub fn ollama_section(&self) -> String {
        format!("[providers.ollama]\nbase_url = \"{}\"\n", self.url(""))
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Shared behavior --

/// Count the call and answer with a rejection when one is due
async fn gate(state: &VendorState, model: &str) -> Option<Response> {
    state.completions.fetch_add(1, Ordering::Relaxed);
    state.requested_models.lock().unwrap().push(model.to_owned());

    if state.stall {
        tokio::time::sleep(STALL).await;
    }

    if state
        .rate_limited
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
    {
        return Some(error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"));
    }

    if state.missing.iter().any(|m| m == model) {
        return Some(not_found(model));
    }

    None
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": { "message": message } }))).into_response()
}

fn not_found(model: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, &format!("model '{model}' not found"))
}

/// Split the reply into word-sized stream fragments
fn fragments(reply: &str) -> Vec<String> {
    reply.split_inclusive(' ').map(str::to_owned).collect()
}

fn sse(frames: Vec<String>) -> Response {
    let events = frames
        .into_iter()
        .map(|data| Ok::<_, Infallible>(Event::default().data(data)));
    Sse::new(futures_util::stream::iter(events)).into_response()
}

fn requested_model(body: &Value) -> String {
    body["model"].as_str().unwrap_or_default().to_owned()
}

fn wants_stream(body: &Value) -> bool {
    body["stream"].as_bool().unwrap_or(false)
}

// -- OpenAI --

async fn openai_chat(State(state): State<Arc<VendorState>>, Json(body): Json<Value>) -> Response {
    let model = requested_model(&body);
    openai_reply(&state, &model, &body).await
}

async fn openai_reply(state: &VendorState, model: &str, body: &Value) -> Response {
    if let Some(rejection) = gate(state, model).await {
        return rejection;
    }

    if !wants_stream(body) {
        return Json(json!({
            "id": "chatcmpl-mock",
            "model": model,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": state.reply },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12 }
        }))
        .into_response();
    }

    let mut frames: Vec<String> = fragments(&state.reply)
        .into_iter()
        .map(|fragment| json!({ "choices": [{ "index": 0, "delta": { "content": fragment } }] }).to_string())
        .collect();
    if !state.truncated {
        frames.push(json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }] }).to_string());
        frames.push("[DONE]".to_owned());
    }
    sse(frames)
}

async fn openai_model(State(state): State<Arc<VendorState>>, Path(id): Path<String>) -> Response {
    if state.missing.contains(&id) {
        return not_found(&id);
    }
    Json(json!({ "id": id, "owned_by": "mock" })).into_response()
}

// -- Anthropic --

async fn anthropic_messages(State(state): State<Arc<VendorState>>, Json(body): Json<Value>) -> Response {
    let model = requested_model(&body);
    if let Some(rejection) = gate(&state, &model).await {
        return rejection;
    }

    if !wants_stream(&body) {
        return Json(json!({
            "id": "msg_mock",
            "model": model,
            "content": [{ "type": "text", "text": state.reply }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 5, "output_tokens": 7 }
        }))
        .into_response();
    }

    let mut frames = vec![
        json!({ "type": "message_start", "message": { "model": model, "usage": { "input_tokens": 5, "output_tokens": 0 } } })
            .to_string(),
        json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } })
            .to_string(),
    ];
    let deltas = fragments(&state.reply).into_iter().map(|fragment| {
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": fragment } })
            .to_string()
    });

    let fail_midway = state
        .quota_mid_stream
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok();
    if fail_midway {
        frames.extend(deltas.take(1));
        frames.push(
            json!({ "type": "error", "error": { "type": "rate_limit_error", "message": "Rate limited" } }).to_string(),
        );
        return sse(frames);
    }

    frames.extend(deltas);
    frames.push(json!({ "type": "content_block_stop", "index": 0 }).to_string());
    frames.push(
        json!({ "type": "message_delta", "delta": { "stop_reason": "end_turn" }, "usage": { "output_tokens": 7 } })
            .to_string(),
    );
    if !state.truncated {
        frames.push(json!({ "type": "message_stop" }).to_string());
    }
    sse(frames)
}

// -- Gemini --

fn gemini_chunk(text: &str, finish_reason: Option<&str>) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": finish_reason
        }],
        "usageMetadata": { "promptTokenCount": 5, "candidatesTokenCount": 7, "totalTokenCount": 12 }
    })
}

/// `POST /v1beta/models/{model}:{method}`
async fn gemini_generate(State(state): State<Arc<VendorState>>, Path(call): Path<String>) -> Response {
    gemini_reply(&state, &call).await
}

async fn gemini_reply(state: &VendorState, call: &str) -> Response {
    let Some((model, method)) = call.split_once(':') else {
        return error_response(StatusCode::BAD_REQUEST, "missing method");
    };
    if let Some(rejection) = gate(state, model).await {
        return rejection;
    }

    if method == "generateContent" {
        return Json(gemini_chunk(&state.reply, Some("STOP"))).into_response();
    }

    let mut frames: Vec<String> = fragments(&state.reply)
        .into_iter()
        .map(|fragment| gemini_chunk(&fragment, None).to_string())
        .collect();
    if !state.truncated {
        frames.push(gemini_chunk("", Some("STOP")).to_string());
    }
    sse(frames)
}

async fn gemini_model(State(state): State<Arc<VendorState>>, Path(id): Path<String>) -> Response {
    if state.missing.contains(&id) {
        return not_found(&id);
    }
    Json(json!({
        "name": format!("models/{id}"),
        "supportedGenerationMethods": ["generateContent", "countTokens"]
    }))
    .into_response()
}

// -- Ollama --

async fn ollama_generate(State(state): State<Arc<VendorState>>, Json(body): Json<Value>) -> Response {
    let model = requested_model(&body);
    if let Some(rejection) = gate(&state, &model).await {
        return rejection;
    }

    let last = json!({
        "model": model,
        "response": "",
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 5,
        "eval_count": 7
    });

    if !wants_stream(&body) {
        let mut whole = last;
        whole["response"] = Value::String(state.reply.clone());
        return Json(whole).into_response();
    }

    let mut lines: Vec<String> = fragments(&state.reply)
        .into_iter()
        .map(|fragment| json!({ "model": model, "response": fragment, "done": false }).to_string())
        .collect();
    if !state.truncated {
        lines.push(last.to_string());
    }

    let body = lines.join("\n") + "\n";
    ([(header::CONTENT_TYPE, "application/x-ndjson")], Body::from(body)).into_response()
}

async fn ollama_tags(State(state): State<Arc<VendorState>>) -> Json<Value> {
    let models: Vec<Value> = ["llama3.1:latest", "llama3.1:8b", "qwen2.5-coder:7b"]
        .into_iter()
        .filter(|name| !state.missing.iter().any(|m| m == *name))
        .map(|name| json!({ "name": name }))
        .collect();
    Json(json!({ "models": models }))
}

async fn ollama_version() -> Json<Value> {
    Json(json!({ "version": "0.5.7" }))
}

// -- Azure --

/// `POST /openai/deployments/{deployment}/chat/completions?api-version=...`
async fn azure_chat(
    State(state): State<Arc<VendorState>>,
    Path(deployment): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return error_response(StatusCode::UNAUTHORIZED, "missing or invalid api-key header");
    }
    if query.get("api-version").map(String::as_str) != Some(AZURE_API_VERSION) {
        return error_response(StatusCode::BAD_REQUEST, "missing or unsupported api-version");
    }

    openai_reply(&state, &deployment, &body).await
}

// -- Vertex --

/// `POST /v1/projects/{project}/locations/{location}/publishers/google/models/{model}:{method}`
async fn vertex_generate(
    State(state): State<Arc<VendorState>>,
    Path((project, location, call)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let expected = format!("Bearer {VERTEX_TOKEN}");
    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return error_response(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
    }
    if project != "acme" || location != "us-central1" {
        return error_response(StatusCode::FORBIDDEN, &format!("unknown project {project} in {location}"));
    }

    gemini_reply(&state, &call).await
}
