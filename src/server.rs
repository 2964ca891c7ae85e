//! HTTP + WebSocket transport
//!
//! Routes:
//! - `/api/chat/*`       council conversation
//! - `/api/journal/*`    journaling
//! - `/api/meditation/*` guided meditation, including the live session socket
//!
//! Every endpoint takes an optional `user_id`; without one the demo identity
//! is used.

use crate::config::{Settings, DEMO_USER_ID};
use crate::council::{CouncilEngine, CouncilPolicy};
use crate::db::JournalStore;
use crate::embeddings::{Embedder, GeminiEmbedder};
use crate::error::CouncilError;
use crate::journal::{JournalSearch, JournalService};
use crate::llm::{CompletionService, GeminiClient};
use crate::meditation::{self, MeditationService};
use crate::personas::PersonaRegistry;
use crate::retrieval::{ContextRetriever, JournalRetriever};
use crate::types::{
    FollowUpAnswer, JournalResponse, MeditationPlan, PersonaSummary, ReflectionResponse,
    SessionState, Stage, StageContent, TurnReply,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// How often idle sessions are swept
const REAPER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub council: CouncilEngine,
    pub journal: Arc<JournalService>,
    pub meditation: MeditationService,
}

impl AppState {
    pub fn new(
        settings: Settings,
        council: CouncilEngine,
        journal: Arc<JournalService>,
        meditation: MeditationService,
    ) -> Self {
        Self {
            settings,
            council,
            journal,
            meditation,
        }
    }

    /// Wire every service against the hosted model and the on-disk journal
    pub fn from_settings(settings: Settings) -> Result<Self> {
        std::fs::create_dir_all(&settings.data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", settings.data_dir))?;
        let store = Arc::new(JournalStore::open(&settings.db_path())?);

        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let chat: Arc<dyn CompletionService> = Arc::new(GeminiClient::new(
            http.clone(),
            &settings.api_base,
            &settings.google_api_key,
            &settings.chat_model,
        ));
        let utility: Arc<dyn CompletionService> = Arc::new(GeminiClient::new(
            http.clone(),
            &settings.api_base,
            &settings.google_api_key,
            &settings.utility_model,
        ));
        let embedder: Arc<dyn Embedder> = Arc::new(GeminiEmbedder::new(
            http,
            &settings.api_base,
            &settings.google_api_key,
            &settings.embedding_model,
        ));
        let retriever: Arc<dyn ContextRetriever> =
            Arc::new(JournalRetriever::new(Arc::clone(&store), Arc::clone(&embedder)));

        let registry = Arc::new(PersonaRegistry::load_or_builtins(
            settings.personas_path.as_deref(),
        ));
        let council = CouncilEngine::new(registry, chat, Arc::clone(&retriever))
            .with_policy(CouncilPolicy::from_settings(&settings));

        let journal = Arc::new(
            JournalService::new(store, embedder, Arc::clone(&utility), retriever)
                .with_timeouts(settings.llm_timeout, settings.retrieval_timeout),
        );
        let meditation = MeditationService::new(utility, Arc::clone(&journal))
            .with_timeout(settings.llm_timeout);

        Ok(Self::new(settings, council, journal, meditation))
    }
}

impl IntoResponse for CouncilError {
    fn into_response(self) -> Response {
        let status = match &self {
            CouncilError::UnknownPersona(_) | CouncilError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CouncilError::NoActiveSession(_) | CouncilError::NotFound(_) => StatusCode::NOT_FOUND,
            CouncilError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, CouncilError>;

fn user_or_demo(user_id: Option<String>) -> String {
    user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEMO_USER_ID.to_string())
}

/// A JSON body id wins over the query string
fn body_or_query(query: UserQuery, body: Option<Json<UserQuery>>) -> String {
    let from_body = body
        .and_then(|Json(body)| body.user_id)
        .filter(|id| !id.trim().is_empty());
    user_or_demo(from_body.or(query.user_id))
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub agent: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub agent: String,
    pub persona_id: Option<String>,
    pub stage: Stage,
}

impl From<TurnReply> for ChatResponse {
    fn from(reply: TurnReply) -> Self {
        let agent = reply.stage.name().to_string();
        Self {
            message: ChatMessage {
                role: "assistant".to_string(),
                content: reply.assistant_text,
                agent: agent.clone(),
            },
            agent,
            persona_id: reply.persona_id,
            stage: reply.stage,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MentorRequest {
    pub persona_id: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: String,
    pub session: SessionState,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub content: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    pub original_entry: String,
    #[serde(default)]
    pub follow_up_answers: Vec<FollowUpAnswer>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub user_id: Option<String>,
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize)]
pub struct ReflectionRequest {
    pub content: String,
    /// Seconds; informational only
    pub session_duration: Option<u32>,
    pub user_id: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Council
        .route("/api/chat/message", post(send_message))
        .route("/api/chat/reset", post(reset_session))
        .route("/api/chat/mentor", post(select_mentor))
        .route("/api/chat/mentor/exit", post(exit_mentor))
        .route("/api/chat/personas", get(list_personas))
        .route("/api/chat/session", get(get_session))
        // Journal
        .route("/api/journal/ingest", post(ingest_entry))
        .route("/api/journal/follow-up", post(follow_up))
        .route("/api/journal/search", post(search_entries))
        .route("/api/journal/session", get(journal_session))
        // Meditation
        .route("/api/meditation/stages", get(meditation_stages))
        .route("/api/meditation/stage/{id}/content", get(stage_content))
        .route("/api/meditation/reflection", post(save_reflection))
        .route("/api/meditation/health", get(meditation_health))
        .route("/api/meditation/ws/session", get(meditation_socket))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "The Mirror API is running" }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "environment": state.settings.environment,
        "sessions": state.council.sessions().len(),
    }))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let user_id = user_or_demo(request.user_id);
    let reply = state.council.handle_message(&user_id, &request.message).await?;
    Ok(Json(reply.into()))
}

async fn reset_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    body: Option<Json<UserQuery>>,
) -> Json<serde_json::Value> {
    let user_id = body_or_query(query, body);
    let existed = state.council.reset_session(&user_id).await;
    Json(serde_json::json!({ "status": "reset", "existed": existed }))
}

async fn select_mentor(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MentorRequest>,
) -> ApiResult<serde_json::Value> {
    let user_id = user_or_demo(request.user_id);
    let persona = state
        .council
        .select_mentor_explicitly(&user_id, &request.persona_id)
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok", "persona": persona })))
}

async fn exit_mentor(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    body: Option<Json<UserQuery>>,
) -> ApiResult<serde_json::Value> {
    let user_id = body_or_query(query, body);
    state.council.exit_mentor(&user_id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn list_personas(State(state): State<Arc<AppState>>) -> Json<Vec<PersonaSummary>> {
    Json(state.council.list_personas())
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<SessionView> {
    let user_id = user_or_demo(query.user_id);
    let session = state.council.get_session(&user_id).await?;
    Ok(Json(SessionView {
        phase: format!("{:?}", session.phase()),
        session,
    }))
}

async fn ingest_entry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<JournalResponse> {
    let user_id = user_or_demo(request.user_id);
    Ok(Json(state.journal.ingest(&user_id, &request.content).await?))
}

async fn follow_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FollowUpRequest>,
) -> ApiResult<JournalResponse> {
    let user_id = user_or_demo(request.user_id);
    let response = state
        .journal
        .follow_up(&user_id, &request.original_entry, &request.follow_up_answers)
        .await?;
    Ok(Json(response))
}

async fn search_entries(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<JournalSearch> {
    let user_id = user_or_demo(request.user_id);
    Ok(Json(
        state
            .journal
            .search(&user_id, &request.query, request.top_k)
            .await?,
    ))
}

async fn journal_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Json<serde_json::Value> {
    let user_id = user_or_demo(query.user_id);
    match state.journal.session(&user_id) {
        Some(session) => Json(serde_json::json!(session)),
        None => Json(serde_json::json!({ "status": "no_active_session" })),
    }
}

async fn meditation_stages() -> Json<MeditationPlan> {
    Json(meditation::plan())
}

async fn stage_content(
    State(state): State<Arc<AppState>>,
    Path(stage_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> ApiResult<StageContent> {
    let user_id = user_or_demo(query.user_id);
    Ok(Json(state.meditation.stage_content(&stage_id, &user_id).await?))
}

async fn save_reflection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReflectionRequest>,
) -> ApiResult<ReflectionResponse> {
    let user_id = user_or_demo(request.user_id);
    if let Some(seconds) = request.session_duration {
        tracing::debug!("[MEDITATION] Reflection after {}s session", seconds);
    }
    Ok(Json(state.meditation.reflection(&user_id, &request.content).await?))
}

async fn meditation_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "meditation",
        "stages": meditation::STAGES.len(),
        "total_duration": meditation::total_duration(),
    }))
}

async fn meditation_socket(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = user_or_demo(query.user_id);
    ws.on_upgrade(move |socket| handle_meditation_socket(socket, state, user_id))
}

async fn handle_meditation_socket(mut socket: WebSocket, state: Arc<AppState>, user_id: String) {
    tracing::info!("[MEDITATION] Session socket opened for {}", user_id);

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let reply = state.meditation.handle_frame(&user_id, text.as_str()).await;
                let json = match serde_json::to_string(&reply) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("[MEDITATION] Failed to encode frame: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    tracing::info!("[MEDITATION] Session socket closed for {}", user_id);
}

// ============================================================================
// Serving
// ============================================================================

/// Sweep idle council sessions in the background. A zero TTL disables it.
pub fn spawn_session_reaper(state: Arc<AppState>) -> Option<tokio::task::JoinHandle<()>> {
    let ttl = state.settings.session_ttl;
    if ttl.is_zero() {
        return None;
    }
    let max_idle = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAPER_INTERVAL.min(ttl));
        loop {
            ticker.tick().await;
            state.council.evict_idle(max_idle);
        }
    }))
}

/// Bind and serve until the process is stopped
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<()> {
    let app = create_router(Arc::clone(&state));
    let _reaper = spawn_session_reaper(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("The Mirror listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
