use server_api::ApiContext;
use shared::{domain::UserId, protocol::ServerEvent};
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self { api, events }
    }

    /// Tells connected clients of `user_id` to refetch. Having no subscribers
    /// is not an error.
    pub(crate) fn notify_changed(&self, user_id: UserId) {
        let _ = self.events.send(ServerEvent::DashboardChanged { user_id });
    }
}
