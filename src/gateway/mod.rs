//! Axum-based HTTP gateway.
//!
//! The boundary layer: handlers translate requests into calls against the
//! auth, item, and transfer components and nothing else. Error kinds map to
//! HTTP statuses in exactly one place (`error.rs`); handlers never match on
//! error text. Request hygiene comes from the tower layers:
//! - Request body size limit (64KB max)
//! - Request timeouts (30s) to prevent slow-loris abuse
//! - CORS for browser clients

use crate::auth::{Authenticator, UserStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::items::ItemStore;
use crate::transfer::{OfferStore, TransferEngine};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s); every operation is a single store call
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Listing defaults when the query string omits offset/limit
const DEFAULT_PAGE_LIMIT: u32 = 10;
/// Hard ceiling on a single page
const MAX_PAGE_LIMIT: u32 = 100;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Authenticator,
    pub items: Arc<ItemStore>,
    pub transfers: TransferEngine,
    /// Whether new user registration is allowed.
    pub allow_registration: bool,
    /// Maximum registered users (0 = unlimited).
    pub max_users: u64,
    /// Base URL for this gateway, used to render transfer links.
    pub base_url: String,
}

impl AppState {
    fn users(&self) -> &UserStore {
        self.auth.users()
    }
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: &Config) -> anyhow::Result<()> {
    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "Refusing to bind to {host} — gateway would be exposed to the network.\n\
             Fix: use --host 127.0.0.1 (default), or set [gateway] allow_public_bind = true\n\
             in config.toml (NOT recommended without a fronting proxy)."
        );
    }

    let data_dir = config.data_dir()?;
    let users = Arc::new(UserStore::open(&data_dir.join("users.db"))?);
    let items = Arc::new(ItemStore::open(&data_dir.join("items.db"))?);
    let offers = Arc::new(OfferStore::open(&data_dir.join("items.db"))?);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    let state = AppState {
        auth: Authenticator::new(users.clone()),
        items: items.clone(),
        transfers: TransferEngine::new(users, items, offers),
        allow_registration: config.auth.allow_registration,
        max_users: config.auth.max_users,
        base_url: format!("http://{host}:{actual_port}"),
    };

    let app = router(state);
    tracing::info!("gateway listening on {host}:{actual_port}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router with middleware. Separate from [`run_gateway`] so tests
/// can drive it without a socket.
pub fn router(state: AppState) -> Router {
    // ── CORS — allow browser clients to connect from any origin ──
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/items", get(handle_list_items))
        .route("/api/items", post(handle_create_item))
        .route("/api/items/{id}", get(handle_get_item))
        .route("/api/items/{id}", delete(handle_delete_item))
        .route("/api/items/{id}/send", post(handle_send_item))
        .route("/api/transfers/{token}", post(handle_complete_transfer))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Loopback hosts are fine; anything else needs the config opt-in.
fn is_public_bind(host: &str) -> bool {
    !matches!(host, "127.0.0.1" | "localhost" | "::1")
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

type ApiResponse = Result<(StatusCode, Json<Value>)>;

/// Unwrap an extracted JSON body, classifying rejections as invalid input.
fn json_body<T>(
    body: std::result::Result<Json<T>, axum::extract::rejection::JsonRejection>,
) -> Result<T> {
    match body {
        Ok(Json(b)) => Ok(b),
        Err(e) => Err(Error::InvalidInput(format!("Invalid request: {e}"))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// REQUEST BODIES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct CreateItemBody {
    data: String,
}

#[derive(Deserialize)]
struct SendItemBody {
    recipient: String,
}

#[derive(Deserialize)]
struct CompleteTransferBody {
    item_id: i64,
}

#[derive(Deserialize)]
struct ListQuery {
    offset: Option<u32>,
    limit: Option<u32>,
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — always public (no secrets leaked)
async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/auth/register — create a new user account.
async fn handle_register(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    if !state.allow_registration {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Registration is disabled" })),
        ));
    }

    // Enforce max_users limit (0 = unlimited)
    if state.max_users > 0 && state.users().user_count()? >= state.max_users {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Maximum user limit reached" })),
        ));
    }

    let body = json_body(body)?;
    let user_id = state.users().register(&body.username, &body.password)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "registered", "user_id": user_id })),
    ))
}

/// POST /api/auth/login — authenticate and get a session token. Replaces
/// any previously issued token for this user.
async fn handle_login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let body = json_body(body)?;
    let (user, token) = state.auth.login(&body.username, &body.password)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "authenticated",
            "token": token,
            "user_id": user.id,
            "username": user.username,
        })),
    ))
}

/// GET /api/items?offset&limit — one page of the caller's items.
async fn handle_list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let user = state.auth.require_auth(extract_bearer_token(&headers))?;

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
    let items = state.items.list_by_owner(&user.id, offset, limit)?;

    let list: Vec<_> = items
        .iter()
        .map(|item| json!({ "id": item.id, "data": item.payload }))
        .collect();
    Ok((StatusCode::OK, Json(json!({ "items": list }))))
}

/// POST /api/items — store a new item owned by the caller.
async fn handle_create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<CreateItemBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let user = state.auth.require_auth(extract_bearer_token(&headers))?;
    let body = json_body(body)?;

    let item_id = state.items.create(&user.id, &body.data)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": item_id, "data": body.data })),
    ))
}

/// GET /api/items/{id} — fetch one of the caller's items.
async fn handle_get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> ApiResponse {
    let user = state.auth.require_auth(extract_bearer_token(&headers))?;

    let item = state.items.get_owned(&user.id, item_id)?;
    Ok((
        StatusCode::OK,
        Json(json!({ "id": item.id, "data": item.payload })),
    ))
}

/// DELETE /api/items/{id} — permanently remove one of the caller's items.
async fn handle_delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> ApiResponse {
    let user = state.auth.require_auth(extract_bearer_token(&headers))?;

    state.items.delete_owned(&user.id, item_id)?;
    Ok((StatusCode::OK, Json(json!({ "status": "deleted" }))))
}

/// POST /api/items/{id}/send — offer one of the caller's items to another
/// user. Responds with the single-use link the recipient must follow.
async fn handle_send_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
    body: std::result::Result<Json<SendItemBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let user = state.auth.require_auth(extract_bearer_token(&headers))?;
    let body = json_body(body)?;

    if body.recipient.trim().is_empty() {
        return Err(Error::InvalidInput("Receiver not specified".into()));
    }

    let offer = state.transfers.offer(&user.id, item_id, body.recipient.trim())?;
    let link = format!("{}/api/transfers/{}", state.base_url, offer.token);
    Ok((StatusCode::OK, Json(json!({ "id": item_id, "link": link }))))
}

/// POST /api/transfers/{token} — complete a transfer as the authenticated
/// recipient, presenting the offered item's id.
async fn handle_complete_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
    body: std::result::Result<Json<CompleteTransferBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let user = state.auth.require_auth(extract_bearer_token(&headers))?;
    let body = json_body(body)?;

    state.transfers.complete(&user.id, &token, body.item_id)?;
    Ok((
        StatusCode::OK,
        Json(json!({ "status": "received", "item_id": body.item_id })),
    ))
}

// ══════════════════════════════════════════════════════════════════════════════
// TESTS
// ══════════════════════════════════════════════════════════════════════════════
