use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use shared::domain::LinkId;
use tokio::sync::{broadcast, Notify};

use super::*;
use crate::test_support::{link, sample_dashboard, FakeBackend, A, B, C};

#[test]
fn feed_url_switches_scheme_and_keeps_base_path() {
    let url = change_feed_url("http://127.0.0.1:8443", UserId(4)).expect("url");
    assert_eq!(url.as_str(), "ws://127.0.0.1:8443/ws?user_id=4");

    let url = change_feed_url("https://vault.example.com/api/", UserId(9)).expect("url");
    assert_eq!(url.as_str(), "wss://vault.example.com/api/ws?user_id=9");
}

#[test]
fn feed_url_rejects_other_schemes() {
    assert!(change_feed_url("ftp://example.com", UserId(1)).is_err());
    assert!(change_feed_url("not a url", UserId(1)).is_err());
}

async fn feed(
    ws: WebSocketUpgrade,
    State(events): State<broadcast::Sender<ServerEvent>>,
) -> Response {
    let mut rx = events.subscribe();
    ws.on_upgrade(move |mut socket| async move {
        while let Ok(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                break;
            };
            if socket.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    })
}

async fn spawn_feed() -> (String, broadcast::Sender<ServerEvent>) {
    let (events, _) = broadcast::channel(16);
    let app = Router::new()
        .route("/ws", get(feed))
        .with_state(events.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), events)
}

async fn wait_for_link<Backend: DashboardBackend>(
    session: &DashboardSession<Backend>,
    id: LinkId,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.snapshot().await.link(id).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never refreshed");
}

fn changed(user_id: i64) -> ServerEvent {
    ServerEvent::DashboardChanged {
        user_id: UserId(user_id),
    }
}

#[tokio::test]
async fn own_change_refreshes_and_foreign_change_is_ignored() {
    let (server_url, events) = spawn_feed().await;
    let session = Arc::new(
        DashboardSession::open(FakeBackend::new(sample_dashboard()))
            .await
            .expect("open"),
    );
    let handle = spawn_change_listener(session.clone(), &server_url, UserId(1))
        .await
        .expect("listener");

    session.backend().insert_link(link(60, Some(C), false));
    events.send(changed(2)).expect("send");
    events.send(changed(1)).expect("send");

    wait_for_link(&session, LinkId(60)).await;
    assert_eq!(session.snapshot().await.bucket_of(LinkId(60)), Some(C));
    // open + one refresh; the other user's event fetched nothing
    assert_eq!(session.backend().fetch_count(), 2);
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn change_during_a_mutation_does_not_stop_the_listener() {
    let (server_url, events) = spawn_feed().await;
    let gate = Arc::new(Notify::new());
    let session = Arc::new(
        DashboardSession::open(FakeBackend::gated(sample_dashboard(), gate.clone()))
            .await
            .expect("open"),
    );
    let handle = spawn_change_listener(session.clone(), &server_url, UserId(1))
        .await
        .expect("listener");

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.move_section(B, 1, 0).await }
    });
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.backend().write_count() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("mutation never reached the backend");

    events.send(changed(1)).expect("send");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    assert_eq!(session.backend().fetch_count(), 1, "refresh was rejected");

    gate.notify_one();
    pending.await.expect("join").expect("move");
    assert_eq!(session.snapshot().await.section_ids(), vec![B, A, C]);

    session.backend().insert_link(link(61, Some(A), false));
    events.send(changed(1)).expect("send");
    wait_for_link(&session, LinkId(61)).await;
    handle.abort();
}
