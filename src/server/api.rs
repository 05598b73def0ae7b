use crate::agent::AIAgent;
use crate::auth::{ SecretValidator, SECRET_HEADER };
use crate::error::AppError;
use crate::models::api::*;
use crate::response::ReplyResult;
use crate::session::Session;
use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    middleware::{ self, Next },
    extract::{ State, Path, Request, rejection::JsonRejection },
    response::{ IntoResponse, Response },
    http::StatusCode,
};
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn };

type RequestLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct AppState {
    agent: Arc<AIAgent>,
    access: SecretValidator,
    signup: SecretValidator,
    limiter: Option<Arc<RequestLimiter>>,
}

impl AppState {
    /// A `max_requests_per_second` of 0 disables the global limiter.
    pub fn new(
        agent: Arc<AIAgent>,
        access: SecretValidator,
        signup: SecretValidator,
        max_requests_per_second: u32
    ) -> Self {
        let limiter = NonZeroU32::new(max_requests_per_second).map(|rate| {
            Arc::new(RateLimiter::direct(Quota::per_second(rate)))
        });
        Self { agent, access, signup, limiter }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let functions = Router::new()
        .route("/ai-chat", post(ai_chat_handler))
        .route("/execute-handler", post(execute_handler_handler))
        .route("/generate-caption", post(generate_caption_handler))
        .route("/generate-messages", post(generate_messages_handler))
        .route("/generate-reply", post(generate_reply_handler))
        .route("/validate-signup-key", post(validate_signup_key_handler))
        .route("/settings-chat", post(settings_chat_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    let admin = Router::new()
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}", get(get_session_handler).delete(end_session_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/functions/v1", functions)
        .merge(admin)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors)
        .with_state(state)
}

async fn require_secret(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state.access.validate(provided) {
        warn!("Rejected {} {}: bad or missing secret", req.method(), req.uri().path());
        return AppError::Unauthorized.into_response();
    }
    next.run(req).await
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Global request rate limit exceeded for {}", req.uri().path());
            return AppError::RateLimited("Too many requests, slow down".into()).into_response();
        }
    }
    next.run(req).await
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v).map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ai_chat_handler(
    State(state): State<AppState>,
    body: Result<Json<AiChatRequest>, JsonRejection>,
) -> Result<Json<AiChatResponse>, AppError> {
    let req = parse_body(body)?;
    let response = state.agent.chat(req).await?;
    Ok(Json(AiChatResponse { response }))
}

async fn execute_handler_handler(
    State(state): State<AppState>,
    body: Result<Json<ExecuteHandlerRequest>, JsonRejection>,
) -> Result<Json<ExecuteHandlerResponse>, AppError> {
    let req = parse_body(body)?;
    let result = state.agent.execute_handler(req).await?;
    Ok(Json(ExecuteHandlerResponse { result }))
}

async fn generate_caption_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateCaptionRequest>, JsonRejection>,
) -> Result<Json<GenerateCaptionResponse>, AppError> {
    let req = parse_body(body)?;
    let captions = state.agent.generate_captions(req).await?;
    Ok(Json(GenerateCaptionResponse { captions }))
}

async fn generate_messages_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateMessagesRequest>, JsonRejection>,
) -> Result<Json<GenerateMessagesResponse>, AppError> {
    let req = parse_body(body)?;
    let messages = state.agent.generate_messages(req).await?;
    Ok(Json(GenerateMessagesResponse { messages }))
}

async fn generate_reply_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateReplyRequest>, JsonRejection>,
) -> Result<Json<ReplyResult>, AppError> {
    let req = parse_body(body)?;
    Ok(Json(state.agent.generate_reply(req).await?))
}

async fn validate_signup_key_handler(
    State(state): State<AppState>,
    body: Result<Json<ValidateSignupKeyRequest>, JsonRejection>,
) -> Result<Json<ValidateSignupKeyResponse>, AppError> {
    let req = parse_body(body)?;
    let valid = state.signup.validate(req.secret_key.as_deref());
    info!("Signup key check: valid={}", valid);
    Ok(Json(ValidateSignupKeyResponse { valid }))
}

async fn settings_chat_handler(
    State(state): State<AppState>,
    body: Result<Json<SettingsChatRequest>, JsonRejection>,
) -> Result<Json<SettingsChatResponse>, AppError> {
    let req = parse_body(body)?;
    Ok(Json(state.agent.settings_chat(req).await?))
}

async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.agent.sessions().create().await;
    (StatusCode::CREATED, Json(session))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, Response> {
    state.agent
        .sessions()
        .get(&id).await
        .map(Json)
        .ok_or_else(|| {
            (StatusCode::NOT_FOUND, Json(ErrorBody { error: format!("Unknown session '{}'", id) })).into_response()
        })
}

async fn end_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.agent.sessions().end(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, response) = match state.agent.reload_prompts_if_changed().await {
        Ok(true) => (StatusCode::OK, ReloadResponse {
            success: true,
            message: "Reload complete".into(),
            details: Some(vec!["Prompts reloaded".into()]),
        }),
        Ok(false) => (StatusCode::OK, ReloadResponse {
            success: true,
            message: "Reload complete".into(),
            details: Some(vec!["Prompts unchanged".into()]),
        }),
        Err(e) => (StatusCode::BAD_REQUEST, ReloadResponse {
            success: false,
            message: "Reload errors".into(),
            details: Some(vec![format!("Prompts error: {}", e)]),
        }),
    };
    (code, Json(response)).into_response()
}
