use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use super::*;
use crate::test_support::{sample_dashboard, A, B, C};

type Params = Query<HashMap<String, String>>;

fn authorized(params: &HashMap<String, String>) -> Result<(), (StatusCode, Json<ApiError>)> {
    match params.get("user_id").map(String::as_str) {
        Some("7") => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new(ErrorCode::Unauthorized, "unknown user")),
        )),
    }
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route(
            "/login",
            post(|Json(req): Json<LoginRequest>| async move {
                if req.username == "alice" {
                    Ok(Json(LoginResponse { user_id: 7 }))
                } else {
                    Err((
                        StatusCode::BAD_REQUEST,
                        Json(ApiError::validation("username is required")),
                    ))
                }
            }),
        )
        .route(
            "/links/dashboard",
            get(|Query(params): Params| async move {
                authorized(&params)?;
                Ok::<_, (StatusCode, Json<ApiError>)>(Json(sample_dashboard()))
            }),
        )
        .route(
            "/sections/reorder",
            post(
                |Query(params): Params, Json(req): Json<ReorderSectionsRequest>| async move {
                    authorized(&params)?;
                    if req.section_orders.len() == 3 {
                        Err((
                            StatusCode::CONFLICT,
                            Json(ApiError::new(ErrorCode::Conflict, "database is locked")),
                        ))
                    } else {
                        Ok::<_, (StatusCode, Json<ApiError>)>(StatusCode::NO_CONTENT)
                    }
                },
            ),
        )
        .route(
            "/links/:id",
            delete(|Path(_id): Path<i64>| async move {
                (StatusCode::BAD_GATEWAY, "upstream went away")
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn login_binds_user_and_fetches_dashboard() {
    let server = spawn_server().await;
    let backend = HttpBackend::login(&server, "alice", DEFAULT_REQUEST_TIMEOUT)
        .await
        .expect("login");
    assert_eq!(backend.user_id(), UserId(7));
    assert!(!backend.server_url().ends_with('/'));

    let dashboard = backend.fetch_dashboard().await.expect("dashboard");
    assert_eq!(dashboard, sample_dashboard());
}

#[tokio::test]
async fn server_error_bodies_pass_through() {
    let server = spawn_server().await;

    let err = HttpBackend::login(&server, "", DEFAULT_REQUEST_TIMEOUT)
        .await
        .err()
        .expect("blank username");
    assert_eq!(err.code(), Some(ErrorCode::ValidationFailed));

    let stranger = HttpBackend::new(&server, UserId(8), DEFAULT_REQUEST_TIMEOUT).expect("client");
    let err = stranger.fetch_dashboard().await.expect_err("unknown user");
    assert_eq!(err.code(), Some(ErrorCode::Unauthorized));

    let backend = HttpBackend::new(&server, UserId(7), DEFAULT_REQUEST_TIMEOUT).expect("client");
    let err = backend
        .reorder_sections(&ordering_for(&[B, A, C]))
        .await
        .expect_err("conflict");
    assert_eq!(
        err,
        ClientError::Rejected(ApiError::new(ErrorCode::Conflict, "database is locked"))
    );
    backend
        .reorder_sections(&ordering_for(&[B, A]))
        .await
        .expect("no content is success");
}

#[tokio::test]
async fn non_json_error_falls_back_to_status() {
    let server = spawn_server().await;
    let backend = HttpBackend::new(&server, UserId(7), DEFAULT_REQUEST_TIMEOUT).expect("client");

    let err = backend.delete_link(LinkId(10)).await.expect_err("bad gateway");
    let ClientError::Rejected(api) = err else {
        panic!("expected a rejection, got {err:?}");
    };
    assert_eq!(api.code, ErrorCode::Internal);
    assert!(api.message.contains("502"), "{}", api.message);
    assert!(api.message.contains("upstream went away"));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpBackend::new(format!("http://{addr}"), UserId(7), DEFAULT_REQUEST_TIMEOUT)
        .expect("client");
    let err = backend.fetch_dashboard().await.expect_err("refused");
    assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
}

fn ordering_for(sequence: &[SectionId]) -> Vec<SectionOrder> {
    shared::ordering::to_order_assignments(sequence)
}
