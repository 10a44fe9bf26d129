//! The token and chat gateway.
//!
//! A stateless HTTP service: mints room access tokens for web clients and
//! proxies chat messages to the Azure OpenAI deployment. Nothing is stored
//! between requests.

mod app_error;

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use app_error::AppError;
use azure_chat::{ChatClient, ChatTurn, build_messages};
use quotevoice_core::{AzureOpenAiConfig, LiveKitConfig, RoomName};
use livekit_room::RoomService;

const DEFAULT_PORT: u16 = 8000;

const NOT_CONFIGURED_RESPONSE: &str = "I'm currently being set up. Please configure your Azure OpenAI credentials (AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT) in the .env.local file.";

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful customer support assistant for GetMyQuotation, a platform that connects customers with verified suppliers for home interior and furniture needs.\n\nYour role is to:\n- Help customers understand how to get quotes for interior work and furniture\n- Explain the platform's features (verified suppliers, no spam, fast responses)\n- Assist with questions about pricing, timelines, and services\n- Guide users to fill out the form to get rates from suppliers\n- Be friendly, concise, and helpful\n\nKeep responses conversational and under 150 words unless more detail is needed.";

#[tokio::main]
async fn main() -> Result<()> {
    let env_path = dotenvy::dotenv_override();

    tracing_subscriber::fmt::init();

    if let Ok(env_path) = env_path {
        info!("Environment variables loaded from {env_path:?}");
    }

    let addr = match env::var("QUOTEVOICE_GATEWAY_ADDRESS") {
        Ok(addr) => addr
            .parse()
            .context("Failed to parse QUOTEVOICE_GATEWAY_ADDRESS")?,
        Err(_) => SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
    };

    {
        let args: Vec<String> = env::args().collect();
        if args.len() == 2 && args[1] == "check-health" {
            return check_health(addr).await;
        }
        if args.len() != 1 {
            bail!("No arguments except `check-health` are expected")
        }
    }

    // Both backends are optional at startup; requests that need a missing one
    // answer with an explanation instead of taking the process down.
    let state = AppState::from_env()?;

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {:?}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/token", get(get_token))
        .route("/health", get(get_health))
        .route("/api/chat", post(post_chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Clone)]
struct AppState {
    rooms: Option<Arc<RoomService>>,
    chat: Option<ChatClient>,
}

impl AppState {
    fn from_env() -> Result<Self> {
        let rooms = match LiveKitConfig::from_env() {
            Ok(config) => Some(Arc::new(RoomService::new(config))),
            Err(e) => {
                warn!("Token endpoint disabled: {e:#}");
                None
            }
        };

        let chat = match AzureOpenAiConfig::from_env() {
            Some(config) => Some(ChatClient::new(config)?),
            None => {
                warn!("Azure OpenAI credentials are not configured");
                None
            }
        };

        Ok(Self { rooms, chat })
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(default = "default_room_name")]
    room_name: String,
    #[serde(default = "default_participant_name")]
    participant_name: String,
}

fn default_room_name() -> String {
    "voice-assistant".to_string()
}

fn default_participant_name() -> String {
    "user".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenResponse {
    token: String,
    url: String,
    room: String,
}

async fn get_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, AppError> {
    let rooms = state
        .rooms
        .as_ref()
        .ok_or_else(|| anyhow!("LiveKit credentials not configured"))?;

    let room = RoomName::from(query.room_name);
    let token = rooms.join_token(&room, &query.participant_name, &query.participant_name)?;

    Ok(Json(TokenResponse {
        token,
        url: rooms.url().to_string(),
        room: room.into(),
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatResponse {
    response: String,
}

async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let Some(chat) = &state.chat else {
        return Ok(Json(ChatResponse {
            response: NOT_CONFIGURED_RESPONSE.to_string(),
        }));
    };

    let messages = build_messages(
        CHAT_SYSTEM_PROMPT,
        &request.conversation_history,
        &request.message,
    );
    let response = chat.complete(&messages).await?;
    Ok(Json(ChatResponse { response }))
}

/// The healthcheck lives in the executable so the container image does not
/// need `curl`.
async fn check_health(address: SocketAddr) -> Result<()> {
    let uri = format!("http://{address}/health");
    let status = reqwest::get(uri).await?.status();
    if status != StatusCode::OK {
        bail!("Healthcheck failed with status code {}", status)
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn unconfigured_app() -> Router {
        app(AppState {
            rooms: None,
            chat: None,
        })
    }

    fn app_with_rooms() -> Router {
        let rooms = Arc::new(RoomService::new(LiveKitConfig {
            url: "wss://example.livekit.cloud".into(),
            api_key: "devkey".into(),
            api_secret: "devsecret-devsecret-devsecret".into(),
        }));
        app(AppState {
            rooms: Some(rooms),
            chat: None,
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = unconfigured_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn token_without_credentials_is_a_server_error() {
        let response = unconfigured_app()
            .oneshot(Request::get("/api/token").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn token_echoes_the_requested_room() {
        let response = app_with_rooms()
            .oneshot(
                Request::get("/api/token?room_name=kitchen&participant_name=alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let token: TokenResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(token.room, "kitchen");
        assert_eq!(token.url, "wss://example.livekit.cloud");
        assert_eq!(token.token.split('.').count(), 3);
    }

    #[tokio::test]
    async fn token_query_parameters_have_defaults() {
        let response = app_with_rooms()
            .oneshot(Request::get("/api/token").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let token: TokenResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(token.room, "voice-assistant");
    }

    #[tokio::test]
    async fn chat_without_credentials_degrades_to_a_canned_reply() {
        let request = Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "message": "hi", "conversation_history": [] }).to_string(),
            ))
            .unwrap();

        let response = unconfigured_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let chat: ChatResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(chat.response, NOT_CONFIGURED_RESPONSE);
    }

    #[tokio::test]
    async fn chat_history_is_optional_in_the_request_body() {
        let request = Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "message": "hi" }).to_string()))
            .unwrap();

        let response = unconfigured_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
