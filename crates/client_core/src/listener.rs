use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use shared::{domain::UserId, protocol::ServerEvent};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::{backend::DashboardBackend, error::ClientError, session::DashboardSession};

/// `http(s)://host/base` to `ws(s)://host/base/ws?user_id=N`.
pub fn change_feed_url(server_url: &str, user_id: UserId) -> Result<Url> {
    let mut url = Url::parse(server_url).with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(anyhow!("server_url must be http or https, got {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {server_url} to {scheme}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some(&format!("user_id={user_id}")));
    Ok(url)
}

/// Subscribes to the server's change feed and refreshes `session` whenever
/// another writer touches this user's dashboard. Notifications that arrive
/// mid-mutation are dropped; the mutation's own refetch covers them.
pub async fn spawn_change_listener<B>(
    session: Arc<DashboardSession<B>>,
    server_url: &str,
    user_id: UserId,
) -> Result<JoinHandle<()>>
where
    B: DashboardBackend + 'static,
{
    let ws_url = change_feed_url(server_url, user_id)?;
    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
    let (_, mut ws_reader) = ws_stream.split();

    Ok(tokio::spawn(async move {
        while let Some(msg) = ws_reader.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) if event.user_id() == user_id => match session.refresh().await {
                        Ok(()) | Err(ClientError::MutationInFlight) => {}
                        Err(err) => warn!(%err, "refresh after change notification failed"),
                    },
                    Ok(_) => {}
                    Err(err) => warn!(%err, "invalid server event"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "websocket receive failed");
                    break;
                }
            }
        }
        debug!(%user_id, "change listener stopped");
    }))
}

#[cfg(test)]
#[path = "tests/listener_tests.rs"]
mod tests;
