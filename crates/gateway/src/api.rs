//! REST endpoints for the chat UI.
//!
//! - `GET  /health`
//! - `POST /api/chat`                      — send a message, get the answer
//! - `POST /api/chat/stream`               — send a message, get SSE fragments
//! - `GET  /api/conversations`             — list conversations
//! - `POST /api/conversations`             — create a conversation
//! - `GET  /api/conversations/{id}`        — fetch one with its turns
//! - `POST /api/conversations/{id}/rename` — rename
//! - `DELETE /api/conversations/{id}`      — delete
//! - `POST /api/weather`                   — fetch + cache a weather report
//! - `POST /api/image`                     — plant image upload and analysis
//! - `POST /api/transcribe`                — audio to text
//! - `POST /api/speak`                     — text to audio

use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use farmbuddy_assistant::context::SituationalContext;
use farmbuddy_assistant::{APOLOGY, IMAGE_APOLOGY};
use farmbuddy_core::message::{ConversationId, Turn};
use farmbuddy_core::provider::ImageData;
use farmbuddy_core::store::MAX_TITLE_CHARS;
use farmbuddy_core::Language;

use crate::image;
use crate::SharedState;

/// Build the API router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/conversations", get(list_conversations_handler))
        .route("/api/conversations", post(create_conversation_handler))
        .route("/api/conversations/{id}", get(get_conversation_handler))
        .route("/api/conversations/{id}", delete(delete_conversation_handler))
        .route(
            "/api/conversations/{id}/rename",
            post(rename_conversation_handler),
        )
        .route("/api/weather", post(weather_handler))
        .route("/api/image", post(image_handler))
        .route("/api/transcribe", post(transcribe_handler))
        .route("/api/speak", post(speak_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message.into(),
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    message: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    success: bool,
    conversation_id: String,
    response: String,
}

#[derive(Serialize)]
struct ConversationListResponse {
    success: bool,
    conversations: Vec<ConversationSummaryDto>,
}

#[derive(Serialize)]
struct ConversationSummaryDto {
    id: String,
    title: String,
    turn_count: usize,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
struct ConversationDetailResponse {
    success: bool,
    id: String,
    title: String,
    turns: Vec<TurnDto>,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
struct TurnDto {
    id: String,
    role: String,
    content: String,
    image_path: Option<String>,
    created_at: String,
}

#[derive(Serialize)]
struct CreateConversationResponse {
    success: bool,
    conversation_id: String,
}

#[derive(Deserialize)]
struct RenameRequest {
    title: String,
}

#[derive(Serialize)]
struct RenameResponse {
    success: bool,
    title: String,
}

#[derive(Serialize)]
struct DeletedResponse {
    success: bool,
}

#[derive(Deserialize)]
struct WeatherRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Serialize)]
struct WeatherResponse {
    success: bool,
    report: String,
}

#[derive(Serialize)]
struct ImageResponse {
    success: bool,
    conversation_id: String,
    response: String,
    image_path: String,
}

#[derive(Serialize)]
struct TranscribeResponse {
    success: bool,
    text: String,
}

#[derive(Deserialize)]
struct SpeakRequest {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    20
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Resolve the target conversation: look up an existing one or create a
/// fresh one when no ID is given.
async fn resolve_conversation(
    state: &SharedState,
    requested: Option<&str>,
) -> Result<ConversationId, ApiError> {
    match requested {
        Some(id) => {
            let id = ConversationId::from(id);
            state
                .store
                .get(&id)
                .await
                .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
                .ok_or_else(|| {
                    api_error(StatusCode::NOT_FOUND, format!("Unknown conversation: {id}"))
                })?;
            Ok(id)
        }
        None => state
            .store
            .create()
            .await
            .map(|c| c.id)
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

fn resolve_language(state: &SharedState, requested: Option<&str>) -> Language {
    requested.map(Language::from_code).unwrap_or(state.language)
}

/// Weather for the conversation's session, falling back to the shared
/// "default" session that location updates without a conversation write to.
async fn session_weather(state: &SharedState, id: &ConversationId) -> Option<String> {
    match state.sessions.weather_report(&id.0).await {
        Some(report) => Some(report),
        None => state.sessions.weather_report("default").await,
    }
}

/// Kick off title summarization after the first user+assistant pair.
/// Detached from the response path: its failure never reaches the user.
fn spawn_title_task(state: SharedState, id: ConversationId, source_text: String) {
    tokio::spawn(async move {
        match state.store.turn_count(&id).await {
            Ok(2) => {}
            Ok(_) => return,
            Err(e) => {
                warn!(conversation = %id, error = %e, "Turn count for title failed");
                return;
            }
        }

        let title = state.titles.summarize(&source_text).await;
        match state.store.set_title_if_default(&id, &title).await {
            Ok(true) => info!(conversation = %id, %title, "Conversation titled"),
            Ok(false) => {}
            Err(e) => warn!(conversation = %id, error = %e, "Title write failed"),
        }
    });
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty message"));
    }

    let id = resolve_conversation(&state, payload.conversation_id.as_deref()).await?;

    state
        .store
        .append_turn(&id, &Turn::user(&message))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let history = state
        .store
        .turns(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let weather = session_weather(&state, &id).await;
    let language = resolve_language(&state, payload.language.as_deref());
    let situation = SituationalContext::now(language, weather);

    let answer = match state.assistant.respond(&history, &situation).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!(conversation = %id, error = %e, "Model call failed");
            APOLOGY.to_string()
        }
    };

    state
        .store
        .append_turn(&id, &Turn::assistant(&answer))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    spawn_title_task(state.clone(), id.clone(), message);

    Ok(Json(ChatResponse {
        success: true,
        conversation_id: id.to_string(),
        response: answer,
    }))
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty message"));
    }

    let id = resolve_conversation(&state, payload.conversation_id.as_deref()).await?;

    state
        .store
        .append_turn(&id, &Turn::user(&message))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let history = state
        .store
        .turns(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let weather = session_weather(&state, &id).await;
    let language = resolve_language(&state, payload.language.as_deref());
    let situation = SituationalContext::now(language, weather);

    // A provider failure opening the stream degrades to a one-fragment
    // apology, which the relay below persists like any other answer.
    let mut fragments = match state.assistant.respond_stream(&history, &situation).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(conversation = %id, error = %e, "Model call failed");
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx.send(APOLOGY.to_string()).await;
            rx
        }
    };

    // Relay fragments to the SSE stream while accumulating the full text;
    // the assistant turn is persisted once the provider stream closes.
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);
    let relay_state = state.clone();
    let relay_id = id.clone();
    tokio::spawn(async move {
        let mut accumulated = String::new();
        while let Some(fragment) = fragments.recv().await {
            accumulated.push_str(&fragment);
            // The client may disconnect mid-stream; keep draining so the
            // partial answer is still persisted.
            let _ = tx.send(fragment).await;
        }

        if let Err(e) = relay_state
            .store
            .append_turn(&relay_id, &Turn::assistant(&accumulated))
            .await
        {
            error!(conversation = %relay_id, error = %e, "Persisting streamed answer failed");
            return;
        }

        spawn_title_task(relay_state, relay_id, message);
    });

    let conversation_id = id.to_string();
    let first = futures::stream::once(async move {
        Ok::<_, Infallible>(
            SseEvent::default()
                .event("conversation")
                .data(conversation_id),
        )
    });
    let body = ReceiverStream::new(rx)
        .map(|fragment| Ok(SseEvent::default().event("fragment").data(fragment)));

    Ok(Sse::new(first.chain(body)))
}

async fn list_conversations_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let summaries = state
        .store
        .list(query.limit)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ConversationListResponse {
        success: true,
        conversations: summaries
            .into_iter()
            .map(|s| ConversationSummaryDto {
                id: s.id.to_string(),
                title: s.title,
                turn_count: s.turn_count,
                created_at: s.created_at.to_rfc3339(),
                updated_at: s.updated_at.to_rfc3339(),
            })
            .collect(),
    }))
}

async fn create_conversation_handler(
    State(state): State<SharedState>,
) -> Result<Json<CreateConversationResponse>, ApiError> {
    let conversation = state
        .store
        .create()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(CreateConversationResponse {
        success: true,
        conversation_id: conversation.id.to_string(),
    }))
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let id = ConversationId::from(&id);
    let conversation = state
        .store
        .get(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown conversation: {id}")))?;

    Ok(Json(ConversationDetailResponse {
        success: true,
        id: conversation.id.to_string(),
        title: conversation.title,
        turns: conversation
            .turns
            .into_iter()
            .map(|t| TurnDto {
                id: t.id,
                role: t.role.as_str().to_string(),
                content: t.content,
                image_path: t.image_path,
                created_at: t.created_at.to_rfc3339(),
            })
            .collect(),
        created_at: conversation.created_at.to_rfc3339(),
        updated_at: conversation.updated_at.to_rfc3339(),
    }))
}

async fn rename_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, ApiError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty title"));
    }
    // Clamp up front so the echoed title matches what the store keeps.
    let title: String = title.chars().take(MAX_TITLE_CHARS).collect();

    let id = ConversationId::from(&id);
    state.store.rename(&id, &title).await.map_err(|e| match e {
        farmbuddy_core::error::StoreError::NotFound(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string())
        }
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    })?;

    Ok(Json(RenameResponse {
        success: true,
        title,
    }))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = ConversationId::from(&id);
    let deleted = state
        .store
        .delete(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if !deleted {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown conversation: {id}"),
        ));
    }

    // The session is channel state tied to the conversation; drop it too.
    state.sessions.clear(&id.0).await;

    Ok(Json(DeletedResponse { success: true }))
}

async fn weather_handler(
    State(state): State<SharedState>,
    Json(payload): Json<WeatherRequest>,
) -> Result<Json<WeatherResponse>, ApiError> {
    let (Some(lat), Some(lon)) = (payload.lat, payload.lon) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing coordinates"));
    };

    let report = farmbuddy_weather::report(&state.weather, lat, lon).await;

    let key = payload
        .conversation_id
        .unwrap_or_else(|| "default".to_string());
    let stored = report.clone();
    state
        .sessions
        .update(&key, move |session| {
            session.location = Some((lat, lon));
            session.weather_report = Some(stored);
        })
        .await;

    Ok(Json(WeatherResponse {
        success: true,
        report,
    }))
}

async fn image_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<ImageResponse>, ApiError> {
    let mut image_bytes: Option<Vec<u8>> = None;
    let mut caption = String::new();
    let mut conversation_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
                image_bytes = Some(bytes.to_vec());
            }
            Some("message") => {
                caption = field
                    .text()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
                    .trim()
                    .to_string();
            }
            Some("conversation_id") => {
                conversation_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let Some(bytes) = image_bytes else {
        return Err(api_error(StatusCode::BAD_REQUEST, "No image provided"));
    };

    // Validation happens before any provider call or persistence.
    let detected = image::validate(&bytes)
        .map_err(|reason| api_error(StatusCode::BAD_REQUEST, reason))?;

    if caption.is_empty() {
        caption = "[Plant image uploaded for analysis]".to_string();
    }

    let id = resolve_conversation(&state, conversation_id.as_deref()).await?;

    let filename = format!("{}.{}", uuid::Uuid::new_v4(), detected.extension);
    let stored_path = state.upload_dir.join(&filename);
    tokio::fs::write(&stored_path, &bytes)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let image_path = stored_path.to_string_lossy().to_string();

    state
        .store
        .append_turn(&id, &Turn::user_with_image(&caption, &image_path))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let answer = match state
        .assistant
        .analyze_image(ImageData {
            mime_type: detected.mime_type.to_string(),
            bytes,
        })
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            warn!(conversation = %id, error = %e, "Image analysis failed");
            IMAGE_APOLOGY.to_string()
        }
    };

    state
        .store
        .append_turn(&id, &Turn::assistant(&answer))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // An image-only first exchange gets a fixed title.
    if state.store.turn_count(&id).await.unwrap_or(0) == 2 {
        let _ = state
            .store
            .set_title_if_default(&id, "Plant Disease Analysis")
            .await;
    }

    Ok(Json(ImageResponse {
        success: true,
        conversation_id: id.to_string(),
        response: answer,
        image_path,
    }))
}

async fn transcribe_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let Some(transcriber) = state.transcriber.clone() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Transcription is not configured",
        ));
    };

    let mut audio: Option<(Vec<u8>, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("audio") {
            let filename = field.file_name().unwrap_or("audio.webm").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
            audio = Some((bytes.to_vec(), filename));
        }
    }

    let Some((bytes, filename)) = audio else {
        return Err(api_error(StatusCode::BAD_REQUEST, "No audio provided"));
    };

    let text = transcriber
        .transcribe(bytes, &filename)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    Ok(Json(TranscribeResponse {
        success: true,
        text,
    }))
}

async fn speak_handler(
    State(state): State<SharedState>,
    Json(payload): Json<SpeakRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = payload.text.trim().to_string();
    if text.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty text"));
    }

    let language = resolve_language(&state, payload.language.as_deref());
    let audio = state
        .speech
        .synthesize(&text, language)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}
