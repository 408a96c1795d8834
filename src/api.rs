//! REST API server for the dialogue agent
//!
//! Conversations live server-side: each session id maps to one
//! [`Session`] behind its own mutex, so a turn owns the state exclusively
//! while it runs.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::agent::{FlowKind, Orchestrator, Session, TurnReply};
use crate::clock::Clock;
use crate::error::AgentError;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub flow: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: Option<String>,
    pub tickers: Vec<String>,
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    #[serde(flatten)]
    reply: TurnReply,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn failure(error: AgentError) -> Reply {
    let status = match &error {
        AgentError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        AgentError::InputEmpty | AgentError::Config(_) => StatusCode::BAD_REQUEST,
        AgentError::DataUnavailable(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(error.to_string())))
}

/// =============================
/// API State
/// =============================

const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_SESSIONS: usize = 10_000;

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    kind: FlowKind,
    last_seen: DateTime<Utc>,
}

impl SessionEntry {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            clock: orchestrator.clock(),
            orchestrator,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: DEFAULT_SESSION_IDLE,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Sessions idle longer than `idle_timeout` are evicted, and at most
    /// `max_sessions` are kept.
    pub fn with_session_limits(mut self, idle_timeout: Duration, max_sessions: usize) -> Self {
        self.idle_timeout = idle_timeout;
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Existing session for `id`, or a fresh one of `kind`. A session of a
    /// different flow than the one requested is replaced.
    async fn session(&self, id: &str, kind: Option<FlowKind>) -> Arc<Mutex<Session>> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;

        if let Some(entry) = sessions.get_mut(id) {
            if kind.map_or(true, |kind| kind == entry.kind) {
                entry.last_seen = now;
                return entry.session.clone();
            }
        }

        if !sessions.contains_key(id) {
            self.evict(&mut sessions, now);
        }

        let kind = kind.unwrap_or_default();
        let session = Arc::new(Mutex::new(Session::new(kind)));
        sessions.insert(
            id.to_string(),
            SessionEntry {
                session: session.clone(),
                kind,
                last_seen: now,
            },
        );
        session
    }

    /// Drop idle sessions, then the least recently seen ones until there is
    /// room for one more. Sessions with a turn in flight are never evicted.
    fn evict(&self, sessions: &mut HashMap<String, SessionEntry>, now: DateTime<Utc>) {
        let before = sessions.len();
        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, entry| {
            let idle = (now - entry.last_seen).to_std().unwrap_or_default();
            entry.in_use() || idle <= idle_timeout
        });

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| !entry.in_use())
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted chat sessions");
        }
    }

    async fn forget(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// =============================
/// Helpers: stable identifiers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

/// Accept a UUID as-is, hash any other non-empty string to a stable one.
fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Reply {
    let kind = match req.flow.as_deref().map(str::parse::<FlowKind>).transpose() {
        Ok(kind) => kind,
        Err(e) => return failure(e),
    };

    let session_id = match req.session_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_or_stable_uuid(Some(raw), "").to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    let session = state.session(&session_id, kind).await;
    let mut session = session.lock().await;

    if let Err(e) = state
        .orchestrator
        .converse(&session_id, &mut session, &req.message)
        .await
    {
        warn!(session_id = %session_id, error = %e, "chat turn rejected");
        return failure(e);
    }

    let reply = session.reply();
    info!(
        session_id = %session_id,
        flow = ?reply.flow,
        stage = reply.stage,
        terminated = reply.terminated,
        "chat turn"
    );

    if reply.terminated {
        drop(session);
        state.forget(&session_id).await;
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(ChatResponse { session_id, reply })),
    )
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze_handler(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> Reply {
    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user").to_string();
    let period = req.period.unwrap_or_default();

    info!(user_id = %user_id, tickers = ?req.tickers, "Received analysis request");

    match state
        .orchestrator
        .analyze_tickers(&user_id, &req.tickers, &period)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => failure(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/analyze", post(analyze_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::llm::TextGenerator;
    use crate::test_support::{self, ScriptedGenerator, StubMetricsSource};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state_with_clock(limit: u64) -> (ApiState, ManualClock) {
        let clock = ManualClock::at_epoch_secs(1_759_276_800);
        let now = clock.now();
        let source = Arc::new(StubMetricsSource::new().with_quote("TAEE11", 35.0, &[(1.5, 20)], now));
        let generator: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator::new(["Resposta."]));
        let orchestrator = test_support::orchestrator(generator, source, &clock, limit);
        (ApiState::new(Arc::new(orchestrator)), clock)
    }

    fn state(limit: u64) -> ApiState {
        state_with_clock(limit).0
    }

    async fn post(state: &ApiState, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_stable_uuid() {
        let a = parse_or_stable_uuid(Some("sessao-1"), "x");
        assert_eq!(a, parse_or_stable_uuid(Some(" sessao-1 "), "y"));
        assert_ne!(a, parse_or_stable_uuid(Some("sessao-2"), "x"));
        assert_eq!(a.get_version_num(), 4);

        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_or_stable_uuid(Some(&id.to_string()), "x"), id);
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = create_router(state(5)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_session_persists_between_requests() {
        let state = state(50);

        let (status, body) = post(&state, "/api/chat", json!({ "session_id": "s-1" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stage"], "aguardar_nome");

        let (_, body) = post(&state, "/api/chat", json!({ "session_id": "s-1", "message": "ana" })).await;
        assert_eq!(body["data"]["stage"], "responder_perguntas");
        assert_eq!(body["data"]["user_name"], "Ana");

        let (_, body) = post(&state, "/api/chat", json!({ "session_id": "s-1", "message": "tchau" })).await;
        assert_eq!(body["data"]["terminated"], true);
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_chat_without_session_id_gets_one() {
        let state = state(50);
        let (status, body) = post(&state, "/api/chat", json!({ "flow": "order" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["flow"], "order");
        assert!(body["data"]["session_id"].as_str().is_some());
        assert_eq!(body["data"]["cart"]["total"], "R$ 0,00");
    }

    #[tokio::test]
    async fn test_unknown_flow_is_bad_request() {
        let (status, body) = post(&state(5), "/api/chat", json!({ "flow": "clima" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_chat_rate_limit_maps_to_429() {
        let state = state(1);
        post(&state, "/api/chat", json!({ "session_id": "s-2" })).await;
        let (status, body) = post(&state, "/api/chat", json!({ "session_id": "s-2", "message": "Bia" })).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().unwrap().contains("Rate limit"));
    }

    #[tokio::test]
    async fn test_analyze_endpoint() {
        let state = state(5);
        let (status, body) = post(
            &state,
            "/api/analyze",
            json!({ "user_id": "alice", "tickers": ["taee11", "XXXX3"] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let ranking = body["data"]["ranking"].as_array().unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0]["ticker_id"], "TAEE11");
        assert_eq!(ranking[1]["available"], false);
        assert_eq!(body["data"]["period"], "1y");
    }

    #[tokio::test]
    async fn test_analyze_without_tickers() {
        let (status, _) = post(&state(5), "/api/analyze", json!({ "tickers": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let (state, clock) = state_with_clock(1000);
        let state = state.with_session_limits(Duration::from_secs(600), 1000);

        for _ in 0..50 {
            post(&state, "/api/chat", json!({ "message": "oi" })).await;
        }
        assert_eq!(state.session_count().await, 50);

        post(&state, "/api/chat", json!({ "session_id": "ativa", "message": "oi" })).await;
        clock.advance_secs(601);
        post(&state, "/api/chat", json!({ "session_id": "nova" })).await;
        assert_eq!(state.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_session_map_is_capped() {
        let (state, clock) = state_with_clock(1000);
        let state = state.with_session_limits(Duration::from_secs(3600), 3);

        for id in ["a", "b", "c", "d"] {
            post(&state, "/api/chat", json!({ "session_id": id })).await;
            clock.advance_secs(1);
        }
        assert_eq!(state.session_count().await, 3);

        // "a" was the least recently seen and starts over.
        let (_, body) = post(&state, "/api/chat", json!({ "session_id": "a", "message": "Rui" })).await;
        assert_eq!(body["data"]["stage"], "aguardar_nome");
        assert_eq!(state.session_count().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_share_one_session() {
        let state = state(1000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.session("mesma", None).await })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }
        assert!(sessions.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(state.session_count().await, 1);
    }
}
