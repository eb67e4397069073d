//! Operator HTTP API.
//!
//! Thin surface over the managers: account CRUD, status/config
//! patches, instance lifecycle, free-text command submission, and
//! scheduler snapshots. Rendering lives in an external UI.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::config::GlobalConfig;
use crate::events::EventBus;
use crate::instance::InstanceDeps;
use crate::manager::{AccountManager, InstanceDirectory};
use crate::models::Account;
use crate::scheduler::{CommandRegistry, QueueSnapshot};
use crate::session::http::HttpGameSession;
use crate::AppError;

/// Shared state behind every route.
pub struct AppState {
    /// Account records.
    pub accounts: Arc<AccountManager>,
    /// Live instances.
    pub directory: Arc<InstanceDirectory>,
    /// Dispatch table.
    pub registry: Arc<CommandRegistry>,
    /// Observability bus.
    pub events: EventBus,
    /// Global settings.
    pub settings: Arc<GlobalConfig>,
}

impl AppState {
    fn deps(&self) -> InstanceDeps {
        InstanceDeps {
            accounts: Arc::clone(&self.accounts),
            directory: Arc::clone(&self.directory),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
        }
    }
}

struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Response(_) => StatusCode::BAD_REQUEST,
            AppError::Session(_) => StatusCode::CONFLICT,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the API router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/accounts", get(list_accounts).post(create_account))
        .route("/api/accounts/{id}", get(get_account).delete(delete_account))
        .route("/api/accounts/{id}/status", patch(patch_status))
        .route("/api/accounts/{id}/config", patch(patch_config))
        .route("/api/accounts/{id}/login", post(login))
        .route("/api/accounts/{id}/logout", post(logout))
        .route("/api/accounts/{id}/send", post(send_command))
        .route("/api/accounts/{id}/commands", get(commands))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<Account>> {
    Json(state.accounts.list())
}

#[derive(Debug, Deserialize)]
struct CreateAccountRequest {
    id: String,
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAccountRequest>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.accounts.create(&request.id)?))
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.accounts.get(&id)?))
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    let account = state.accounts.get(&id)?;
    if account.online {
        state.directory.stop(&id).await?;
    }
    state.accounts.remove(&id)?;
    Ok(Json(account))
}

async fn patch_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.accounts.patch_status(&id, &patch)?))
}

async fn patch_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Account>> {
    Ok(Json(state.accounts.patch_config(&id, &patch)?))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    let account = state.accounts.get(&id)?;
    let params = account
        .session
        .clone()
        .ok_or_else(|| AppError::Session(format!("account {id} has no captured session")))?;
    let session = Arc::new(HttpGameSession::new(params, state.settings.mention_token()));
    state.directory.start(&id, session, state.deps()).await?;
    Ok(Json(state.accounts.get(&id)?))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    state.directory.stop(&id).await?;
    Ok(Json(state.accounts.get(&id)?))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
}

async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SendRequest>,
) -> ApiResult<StatusCode> {
    state
        .directory
        .send_free_text(&state.registry, &id, &request.text)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn commands(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<QueueSnapshot>> {
    let instance = state
        .directory
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("instance {id}")))?;
    Ok(Json(instance.scheduler().snapshot()))
}
