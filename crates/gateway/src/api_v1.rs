//! HTTP API v1: the client-facing operations of the assistant.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`           Send a message, get a `Reply`
//! - `POST   /v1/chat/stream`    Send a message, get an SSE stream
//! - `POST   /v1/confirm`        Approve or reject a pending action
//! - `GET    /v1/history`        Stored messages, optionally one conversation
//! - `DELETE /v1/history`        Clear one conversation or everything
//! - `GET    /v1/conversations`  Recently active conversations
//! - `GET    /v1/favorites`      Saved queries, newest first
//! - `POST   /v1/favorites`      Save a query
//! - `DELETE /v1/favorites/{id}` Remove a saved query
//! - `GET    /v1/tools`          Tool catalog with classification
//! - `GET    /v1/logs`           SSE stream of domain events

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{info, warn};

use ledgerclaw_agent::{Assistant, Reply};
use ledgerclaw_core::error::AgentError;
use ledgerclaw_core::history::{ConversationSummary, Favorite, HistoryRecord};
use ledgerclaw_core::message::ConversationId;
use ledgerclaw_core::tool::ToolClass;

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub assistant: Arc<Assistant>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiV1State {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            assistant,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedApiState = Arc<ApiV1State>;

type ApiError = (StatusCode, Json<Reply>);

/// Build the v1 router (mounted under `/v1`).
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/confirm", post(confirm_handler))
        .route("/history", get(history_handler).delete(clear_history_handler))
        .route("/conversations", get(conversations_handler))
        .route("/favorites", get(favorites_handler).post(add_favorite_handler))
        .route("/favorites/{id}", delete(remove_favorite_handler))
        .route("/tools", get(list_tools_handler))
        .route("/logs", get(log_stream_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
    pub confirmed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub removed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub query: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteListResponse {
    pub favorites: Vec<Favorite>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub class: ToolClass,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Rate-limit key: `X-Client-Id`, then `Authorization`, then `anonymous`.
/// Blank header values are skipped.
fn client_key(headers: &HeaderMap) -> String {
    ["X-Client-Id", "Authorization"]
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| "anonymous".to_string())
}

fn status_for(err: &AgentError) -> StatusCode {
    match err {
        AgentError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AgentError::Expired => StatusCode::GONE,
        AgentError::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: AgentError) -> ApiError {
    (status_for(&err), Json(Reply::error(&err)))
}

fn client_error(status: StatusCode, text: &str) -> ApiError {
    (status, Json(Reply::Error { text: text.into() }))
}

fn conversation_id(raw: Option<String>) -> Option<ConversationId> {
    raw.filter(|s| !s.trim().is_empty()).map(ConversationId)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<Reply>, ApiError> {
    let key = client_key(&headers);
    info!(message_len = payload.message.len(), "v1/chat request");

    state
        .assistant
        .send_message(&key, conversation_id(payload.conversation_id), &payload.message)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let key = client_key(&headers);
    info!(message_len = payload.message.len(), "v1/chat/stream SSE request");

    let rx = state.assistant.stream_message(
        key,
        conversation_id(payload.conversation_id),
        payload.message,
    );

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Sse::new(stream)
}

async fn confirm_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<Reply>, ApiError> {
    info!(confirmed = payload.confirmed, "v1/confirm request");

    state
        .assistant
        .resolve_confirmation(&payload.token, payload.confirmed)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "Confirmation failed");
            api_error(e)
        })
}

async fn history_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let id = conversation_id(query.conversation_id);
    let messages = state
        .assistant
        .list_history(id.as_ref())
        .await
        .map_err(api_error)?;
    let count = messages.len();
    Ok(Json(HistoryResponse { messages, count }))
}

async fn clear_history_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ClearResponse>, ApiError> {
    let id = conversation_id(query.conversation_id);
    let removed = state
        .assistant
        .clear_history(id.as_ref())
        .await
        .map_err(api_error)?;
    Ok(Json(ClearResponse { removed }))
}

async fn conversations_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let conversations = state.assistant.conversations().await.map_err(api_error)?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn favorites_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<FavoriteListResponse>, ApiError> {
    let favorites = state.assistant.favorites().await.map_err(api_error)?;
    let count = favorites.len();
    Ok(Json(FavoriteListResponse { favorites, count }))
}

async fn add_favorite_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<FavoriteRequest>,
) -> Result<(StatusCode, Json<Favorite>), ApiError> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(client_error(StatusCode::BAD_REQUEST, "A favorite needs a query."));
    }
    let favorite = state
        .assistant
        .add_favorite(query, payload.label.as_deref())
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

async fn remove_favorite_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> Result<Json<RemovedResponse>, ApiError> {
    if state.assistant.remove_favorite(id).await.map_err(api_error)? {
        Ok(Json(RemovedResponse { removed: true }))
    } else {
        Err(client_error(StatusCode::NOT_FOUND, "No such favorite."))
    }
}

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolDto> = state
        .assistant
        .tool_catalog()
        .into_iter()
        .map(|spec| ToolDto {
            name: spec.name,
            description: spec.description,
            input_schema: spec.input_schema,
            class: spec.class,
        })
        .collect();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

/// `GET /v1/logs`: domain events as they are published. Lagged events are dropped.
async fn log_stream_handler(
    State(state): State<SharedApiState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.assistant.event_bus().subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.name()).data(data))
        });

    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tower::ServiceExt;

    use ledgerclaw_config::AppConfig;
    use ledgerclaw_core::error::ProviderError;
    use ledgerclaw_core::provider::{ModelTurn, Provider, ProviderRequest, ProviderResponse, Usage};
    use ledgerclaw_core::tool::ToolCall;

    /// Replays queued turns in order.
    struct ScriptedProvider {
        turns: Mutex<VecDeque<Result<ModelTurn, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Result<ModelTurn, ProviderError>>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let turn = self
                .turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::MalformedResponse("script exhausted".into())))?;
            Ok(ProviderResponse {
                turn,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    fn final_turn(text: &str) -> Result<ModelTurn, ProviderError> {
        Ok(ModelTurn::Final { text: text.into() })
    }

    fn status_update_turn() -> Result<ModelTurn, ProviderError> {
        Ok(ModelTurn::ToolUse {
            text: String::new(),
            calls: vec![ToolCall {
                id: "t1".into(),
                name: "update_invoice_status".into(),
                arguments: serde_json::json!({"doc_type": "invoice", "doc_id": "INV-1", "status": 3}),
            }],
        })
    }

    async fn test_app(
        dir: &tempfile::TempDir,
        turns: Vec<Result<ModelTurn, ProviderError>>,
    ) -> (Router, Arc<Assistant>) {
        let mut config = AppConfig::default();
        config.history.backend = "memory".into();
        config.ledger.path = Some(dir.path().join("ledger.sqlite"));
        config.rate_limit.max_requests = 3;
        let provider = Arc::new(ScriptedProvider::new(turns));
        let assistant = Arc::new(
            ledgerclaw_agent::assistant_with_provider(&config, provider)
                .await
                .unwrap(),
        );
        let app = v1_router(Arc::new(ApiV1State::new(assistant.clone())));
        (app, assistant)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn client_key_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "anonymous");
        headers.insert("Authorization", "Bearer abc".parse().unwrap());
        assert_eq!(client_key(&headers), "Bearer abc");
        headers.insert("X-Client-Id", "web-1".parse().unwrap());
        assert_eq!(client_key(&headers), "web-1");
    }

    #[test]
    fn blank_client_id_falls_through_to_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Id", "".parse().unwrap());
        headers.insert("Authorization", "Bearer abc".parse().unwrap());
        assert_eq!(client_key(&headers), "Bearer abc");

        headers.insert("Authorization", "  ".parse().unwrap());
        assert_eq!(client_key(&headers), "anonymous");
    }

    #[tokio::test]
    async fn chat_returns_message_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir, vec![final_turn("Hello from the ledger")]).await;

        let response = app
            .oneshot(post_json("/chat", serde_json::json!({"message": "hi", "conversation_id": "c1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["type"], "message");
        assert_eq!(json["text"], "Hello from the ledger");
        assert_eq!(json["conversation_id"], "c1");
    }

    #[tokio::test]
    async fn backend_failure_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir, vec![Err(ProviderError::Network("down".into()))]).await;

        let response = app
            .oneshot(post_json("/chat", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["type"], "error");
    }

    #[tokio::test]
    async fn rate_limited_client_gets_429() {
        let dir = tempfile::tempdir().unwrap();
        let turns = (0..4).map(|_| final_turn("ok")).collect();
        let (app, _) = test_app(&dir, turns).await;

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(post_json("/chat", serde_json::json!({"message": "hi"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(post_json("/chat", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["text"], "Rate limit exceeded. Please wait a moment.");

        // A different client key has its own window.
        let mut request = post_json("/chat", serde_json::json!({"message": "hi"}));
        request.headers_mut().insert("X-Client-Id", "other".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn confirm_flow_and_expired_token() {
        let dir = tempfile::tempdir().unwrap();
        let (app, assistant) =
            test_app(&dir, vec![status_update_turn(), final_turn("Marked as paid.")]).await;

        let response = app
            .clone()
            .oneshot(post_json("/chat", serde_json::json!({"message": "mark INV-1 paid"})))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["type"], "confirmation_needed");
        assert_eq!(json["tool_name"], "update_invoice_status");
        assert_eq!(json["description"], "Update invoice INV-1 status to paid");
        assert_eq!(assistant.pending_count(), 1);
        let token = json["token"].as_str().unwrap().to_string();

        let confirm = serde_json::json!({"token": token, "confirmed": true});
        let response = app.clone().oneshot(post_json("/confirm", confirm.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["text"], "Marked as paid.");
        assert_eq!(json["tools_used"][0]["confirmed"], true);

        let response = app.clone().oneshot(post_json("/confirm", confirm)).await.unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        let json = body_json(response).await;
        assert_eq!(json["type"], "error");
        assert_eq!(json["text"], "This action has expired. Please try again.");

        let request = Request::builder().uri("/history").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["count"], 2);
        assert!(json["messages"][0].get("tool_calls").is_none());
        assert_eq!(json["messages"][1]["tool_calls"][0]["tool"], "update_invoice_status");
        assert_eq!(json["messages"][1]["tool_calls"][0]["confirmed"], true);
    }

    #[tokio::test]
    async fn favorites_save_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir, vec![]).await;

        let response = app
            .clone()
            .oneshot(post_json("/favorites", serde_json::json!({"query": "Overdue invoices by contact"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let first = body_json(response).await;
        assert_eq!(first["label"], "Overdue invoices by contact");

        let response = app
            .clone()
            .oneshot(post_json("/favorites", serde_json::json!({"query": "Revenue this month", "label": "Revenue"})))
            .await
            .unwrap();
        let second = body_json(response).await;

        let request = Request::builder().uri("/favorites").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["favorites"][0]["label"], "Revenue");

        let uri = format!("/favorites/{}", first["id"]);
        let request = Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["removed"], true);

        let request = Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let request = Request::builder().uri("/favorites").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["favorites"][0]["id"], second["id"]);
    }

    #[tokio::test]
    async fn blank_favorite_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (app, assistant) = test_app(&dir, vec![]).await;

        let response = app
            .oneshot(post_json("/favorites", serde_json::json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["type"], "error");
        assert!(assistant.favorites().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_list_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir, vec![final_turn("one"), final_turn("two")]).await;

        for (conv, msg) in [("a", "first"), ("b", "second")] {
            app.clone()
                .oneshot(post_json("/chat", serde_json::json!({"message": msg, "conversation_id": conv})))
                .await
                .unwrap();
        }

        let request = Request::builder()
            .uri("/history?conversation_id=a")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["messages"][0]["content"], "first");

        let request = Request::builder().uri("/conversations").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(json["conversations"].as_array().unwrap().len(), 2);

        let request = Request::builder()
            .method("DELETE")
            .uri("/history")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(json["removed"], 4);

        let request = Request::builder().uri("/history").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn list_tools_with_classification() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir, vec![]).await;

        let request = Request::builder().uri("/tools").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: ToolListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.count, 9);
        let class_of = |name: &str| json.tools.iter().find(|t| t.name == name).map(|t| t.class);
        assert_eq!(class_of("query_database"), Some(ToolClass::ReadOnly));
        assert_eq!(class_of("send_document"), Some(ToolClass::Mutating));
    }

    #[tokio::test]
    async fn stream_emits_named_events() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir, vec![final_turn("A short streamed answer, in pieces")]).await;

        let response = app
            .oneshot(post_json("/chat/stream", serde_json::json!({"message": "hi", "conversation_id": "s1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        let names: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("event:").map(str::trim))
            .collect();
        assert_eq!(names.first(), Some(&"tools_used"));
        assert_eq!(names.last(), Some(&"done"));
        assert!(names.iter().filter(|n| **n == "text_delta").count() >= 2);
        assert!(text.contains("\"conversation_id\":\"s1\""));
    }

    #[tokio::test]
    async fn stream_suspends_with_confirmation_event() {
        let dir = tempfile::tempdir().unwrap();
        let (app, assistant) = test_app(&dir, vec![status_update_turn()]).await;

        let response = app
            .oneshot(post_json("/chat/stream", serde_json::json!({"message": "mark paid"})))
            .await
            .unwrap();
        let text = body_text(response).await;
        let names: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("event:").map(str::trim))
            .collect();
        assert_eq!(names, vec!["tool_started", "confirmation_needed"]);
        assert_eq!(assistant.pending_count(), 1);
    }
}
