use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use shared::{
    dashboard::DashboardAggregate,
    domain::{Link, LinkId, Section, SectionId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateLinkRequest, CreateSectionRequest, DeleteSectionResponse, LoginRequest,
        LoginResponse, ReorderSectionsRequest, ServerEvent, UpdateLinkRequest,
        UpdateSectionRequest,
    },
};
use tokio::sync::broadcast::error::RecvError;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

use crate::{
    app_state::AppState,
    extract::{ApiJson, ApiPath, CurrentUser},
};

pub(crate) type Rejection = (StatusCode, Json<ApiError>);

pub(crate) fn build_router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/links/dashboard", get(http_fetch_dashboard))
        .route("/links", get(http_list_links).post(http_create_link))
        .route(
            "/links/:link_id",
            put(http_update_link).delete(http_delete_link),
        )
        .route(
            "/sections",
            get(http_list_sections).post(http_create_section),
        )
        .route("/sections/reorder", post(http_reorder_sections))
        .route(
            "/sections/:section_id",
            put(http_update_section).delete(http_delete_section),
        )
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Protected => StatusCode::FORBIDDEN,
        ErrorCode::InvalidIndex | ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn reject(err: ApiError) -> Rejection {
    let status = status_for(err.code);
    if status.is_server_error() {
        warn!(code = ?err.code, message = %err.message, "request failed");
    } else {
        debug!(code = ?err.code, message = %err.message, "request rejected");
    }
    (status, Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, Rejection> {
    state.api.storage.health_check().await.map_err(|e| {
        reject(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    let user_id = server_api::login(&state.api, &req.username)
        .await
        .map_err(reject)?;
    Ok(Json(LoginResponse { user_id: user_id.0 }))
}

async fn http_fetch_dashboard(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<DashboardAggregate>, Rejection> {
    let dashboard = server_api::fetch_dashboard(&state.api, user_id)
        .await
        .map_err(reject)?;
    Ok(Json(dashboard))
}

async fn http_list_links(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Link>>, Rejection> {
    let links = server_api::list_links(&state.api, user_id)
        .await
        .map_err(reject)?;
    Ok(Json(links))
}

async fn http_create_link(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    ApiJson(req): ApiJson<CreateLinkRequest>,
) -> Result<Json<Link>, Rejection> {
    let link = server_api::create_link(&state.api, user_id, &req)
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(Json(link))
}

async fn http_update_link(
    State(state): State<Arc<AppState>>,
    ApiPath(link_id): ApiPath<i64>,
    CurrentUser(user_id): CurrentUser,
    ApiJson(req): ApiJson<UpdateLinkRequest>,
) -> Result<Json<Link>, Rejection> {
    let link = server_api::update_link(&state.api, user_id, LinkId(link_id), &req)
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(Json(link))
}

async fn http_delete_link(
    State(state): State<Arc<AppState>>,
    ApiPath(link_id): ApiPath<i64>,
    CurrentUser(user_id): CurrentUser,
) -> Result<StatusCode, Rejection> {
    server_api::delete_link(&state.api, user_id, LinkId(link_id))
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_sections(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<Section>>, Rejection> {
    let sections = server_api::list_sections(&state.api, user_id)
        .await
        .map_err(reject)?;
    Ok(Json(sections))
}

async fn http_create_section(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    ApiJson(req): ApiJson<CreateSectionRequest>,
) -> Result<Json<Section>, Rejection> {
    let section = server_api::create_section(&state.api, user_id, &req.name)
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(Json(section))
}

async fn http_update_section(
    State(state): State<Arc<AppState>>,
    ApiPath(section_id): ApiPath<i64>,
    CurrentUser(user_id): CurrentUser,
    ApiJson(req): ApiJson<UpdateSectionRequest>,
) -> Result<Json<Section>, Rejection> {
    let section = server_api::update_section(&state.api, user_id, SectionId(section_id), &req)
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(Json(section))
}

async fn http_delete_section(
    State(state): State<Arc<AppState>>,
    ApiPath(section_id): ApiPath<i64>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<DeleteSectionResponse>, Rejection> {
    let response = server_api::delete_section(&state.api, user_id, SectionId(section_id))
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(Json(response))
}

async fn http_reorder_sections(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    ApiJson(req): ApiJson<ReorderSectionsRequest>,
) -> Result<StatusCode, Rejection> {
    server_api::reorder_sections(&state.api, user_id, &req.section_orders)
        .await
        .map_err(reject)?;
    state.notify_changed(user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, Rejection> {
    server_api::ensure_user(&state.api, user_id)
        .await
        .map_err(reject)?;
    Ok(ws.on_upgrade(move |socket| ws_connection(state, socket, user_id)))
}

/// Forwards this user's change notifications until either side hangs up.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    // Some skipped event may have been ours.
                    debug!(%user_id, skipped, "change listener lagged");
                    ServerEvent::DashboardChanged { user_id }
                }
                Err(RecvError::Closed) => break,
            };
            if event.user_id() != user_id {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
