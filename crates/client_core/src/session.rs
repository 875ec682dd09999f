use shared::{
    dashboard::DashboardAggregate,
    domain::{Link, LinkId, Section, SectionId},
    error::ApiError,
    ordering,
    protocol::{CreateLinkRequest, UpdateLinkRequest, UpdateSectionRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{
    backend::DashboardBackend,
    error::ClientError,
    optimistic::{self, Mutation, MutationKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Clean,
    /// Applied locally, not yet sent.
    PendingMutation { mutation: Mutation },
    /// Sent; waiting for the write and the follow-up refetch.
    Reconciling { mutation: Mutation },
    /// The write failed and the local state has been rolled back.
    Error { mutation: Mutation, error: ClientError },
}

impl SyncState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::PendingMutation { .. } | Self::Reconciling { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged(SyncState),
    /// The visible dashboard changed, optimistically or authoritatively.
    DashboardUpdated(DashboardAggregate),
    MutationFailed {
        mutation: Mutation,
        error: ClientError,
    },
}

struct SessionState {
    authoritative: DashboardAggregate,
    visible: DashboardAggregate,
    sync: SyncState,
    stale: bool,
    /// Bumped whenever a mutation starts; a refresh fetched under an older
    /// generation is discarded.
    generation: u64,
}

enum Outcome {
    Done,
    Link(Link),
    Section(Section),
    Reassigned(u64),
}

/// Client-side copy of one user's dashboard.
///
/// Mutations are applied locally first, then written, then confirmed by a
/// full refetch. Only one mutation may be in flight; a failed write restores
/// the pre-mutation dashboard and forces a refetch before the next mutation.
pub struct DashboardSession<B: DashboardBackend> {
    backend: B,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<ClientEvent>,
}

impl<B: DashboardBackend> DashboardSession<B> {
    pub fn new(backend: B, initial: DashboardAggregate) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            backend,
            inner: Mutex::new(SessionState {
                authoritative: initial.clone(),
                visible: initial,
                sync: SyncState::Clean,
                stale: false,
                generation: 0,
            }),
            events,
        }
    }

    /// Builds a session from the server's current dashboard.
    pub async fn open(backend: B) -> Result<Self, ClientError> {
        let initial = backend.fetch_dashboard().await?;
        Ok(Self::new(backend, initial))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> DashboardAggregate {
        self.inner.lock().await.visible.clone()
    }

    pub async fn state(&self) -> SyncState {
        self.inner.lock().await.sync.clone()
    }

    pub async fn is_stale(&self) -> bool {
        self.inner.lock().await.stale
    }

    /// Replaces local state with the server's. Rejected while a mutation is in
    /// flight; a fetch that lands after a mutation started is discarded.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let generation = {
            let guard = self.inner.lock().await;
            if guard.sync.is_busy() {
                return Err(ClientError::MutationInFlight);
            }
            guard.generation
        };
        let fetched = self.backend.fetch_dashboard().await?;

        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            debug!("discarding refresh that raced a mutation");
            return Ok(());
        }
        guard.authoritative = fetched.clone();
        guard.visible = fetched.clone();
        guard.stale = false;
        drop(guard);
        let _ = self.events.send(ClientEvent::DashboardUpdated(fetched));
        Ok(())
    }

    /// Moves the section at `from_index` to `to_index` of the visible order.
    pub async fn move_section(
        &self,
        moved: SectionId,
        from_index: usize,
        to_index: usize,
    ) -> Result<(), ClientError> {
        let current = self.snapshot().await.section_ids();
        let next = ordering::reorder(&current, moved, from_index, to_index)?;
        let assignments = ordering::to_order_assignments(&next);
        self.run(MutationKind::ReorderSections { assignments })
            .await
            .map(|_| ())
    }

    pub async fn toggle_pin(&self, link_id: LinkId) -> Result<(), ClientError> {
        let pinned = self
            .snapshot()
            .await
            .link(link_id)
            .map(|link| link.is_pinned)
            .ok_or_else(|| ClientError::Rejected(ApiError::not_found("link not found")))?;
        self.update_link(link_id, UpdateLinkRequest::pin(!pinned))
            .await
    }

    pub async fn update_link(
        &self,
        link_id: LinkId,
        patch: UpdateLinkRequest,
    ) -> Result<(), ClientError> {
        self.run(MutationKind::UpdateLink { link_id, patch })
            .await
            .map(|_| ())
    }

    pub async fn delete_link(&self, link_id: LinkId) -> Result<(), ClientError> {
        self.run(MutationKind::DeleteLink { link_id })
            .await
            .map(|_| ())
    }

    pub async fn create_link(&self, request: CreateLinkRequest) -> Result<Link, ClientError> {
        match self.run(MutationKind::CreateLink { request }).await? {
            Outcome::Link(link) => Ok(link),
            _ => Err(unexpected_outcome("create_link")),
        }
    }

    pub async fn create_section(&self, name: &str) -> Result<Section, ClientError> {
        let kind = MutationKind::CreateSection {
            name: name.to_string(),
        };
        match self.run(kind).await? {
            Outcome::Section(section) => Ok(section),
            _ => Err(unexpected_outcome("create_section")),
        }
    }

    pub async fn rename_section(
        &self,
        section_id: SectionId,
        name: &str,
    ) -> Result<(), ClientError> {
        let patch = UpdateSectionRequest {
            name: Some(name.to_string()),
            order: None,
        };
        self.run(MutationKind::UpdateSection { section_id, patch })
            .await
            .map(|_| ())
    }

    /// Returns how many links the server moved into the default section.
    pub async fn delete_section(&self, section_id: SectionId) -> Result<u64, ClientError> {
        match self.run(MutationKind::DeleteSection { section_id }).await? {
            Outcome::Reassigned(count) => Ok(count),
            _ => Err(unexpected_outcome("delete_section")),
        }
    }

    async fn run(&self, kind: MutationKind) -> Result<Outcome, ClientError> {
        let mutation = Mutation::new(kind);

        let needs_refetch = {
            let mut guard = self.inner.lock().await;
            if guard.sync.is_busy() {
                return Err(ClientError::MutationInFlight);
            }
            guard.sync = SyncState::PendingMutation {
                mutation: mutation.clone(),
            };
            guard.generation += 1;
            guard.stale
        };

        if needs_refetch {
            match self.backend.fetch_dashboard().await {
                Ok(fetched) => {
                    let mut guard = self.inner.lock().await;
                    guard.authoritative = fetched.clone();
                    guard.visible = fetched.clone();
                    guard.stale = false;
                    drop(guard);
                    let _ = self.events.send(ClientEvent::DashboardUpdated(fetched));
                }
                Err(error) => {
                    self.settle_clean().await;
                    return Err(error);
                }
            }
        }

        {
            let mut guard = self.inner.lock().await;
            let prediction = optimistic::apply(&guard.visible, &mutation.kind);
            let predicted = match prediction {
                Ok(predicted) => predicted,
                Err(err) => {
                    drop(guard);
                    self.settle_clean().await;
                    return Err(ClientError::Rejected(err));
                }
            };
            guard.visible = predicted.clone();
            drop(guard);
            let _ = self.events.send(ClientEvent::DashboardUpdated(predicted));
        }
        self.emit_state(SyncState::PendingMutation {
            mutation: mutation.clone(),
        });

        self.inner.lock().await.sync = SyncState::Reconciling {
            mutation: mutation.clone(),
        };
        self.emit_state(SyncState::Reconciling {
            mutation: mutation.clone(),
        });

        match self.dispatch(&mutation.kind).await {
            Ok(outcome) => {
                self.reconcile().await;
                Ok(outcome)
            }
            Err(error) => {
                self.revert(mutation, error.clone()).await;
                Err(error)
            }
        }
    }

    async fn dispatch(&self, kind: &MutationKind) -> Result<Outcome, ClientError> {
        match kind {
            MutationKind::ReorderSections { assignments } => self
                .backend
                .reorder_sections(assignments)
                .await
                .map(|_| Outcome::Done),
            MutationKind::CreateLink { request } => {
                self.backend.create_link(request).await.map(Outcome::Link)
            }
            MutationKind::UpdateLink { link_id, patch } => self
                .backend
                .update_link(*link_id, patch)
                .await
                .map(|_| Outcome::Done),
            MutationKind::DeleteLink { link_id } => self
                .backend
                .delete_link(*link_id)
                .await
                .map(|_| Outcome::Done),
            MutationKind::CreateSection { name } => self
                .backend
                .create_section(name)
                .await
                .map(Outcome::Section),
            MutationKind::UpdateSection { section_id, patch } => self
                .backend
                .update_section(*section_id, patch)
                .await
                .map(|_| Outcome::Done),
            MutationKind::DeleteSection { section_id } => self
                .backend
                .delete_section(*section_id)
                .await
                .map(|response| Outcome::Reassigned(response.reassigned_links)),
        }
    }

    /// The write landed; adopt the server's view. A failed refetch leaves the
    /// prediction visible and marks the session stale.
    async fn reconcile(&self) {
        let fetched = self.backend.fetch_dashboard().await;
        let mut guard = self.inner.lock().await;
        match fetched {
            Ok(fetched) => {
                guard.authoritative = fetched.clone();
                guard.visible = fetched.clone();
                guard.stale = false;
                guard.sync = SyncState::Clean;
                drop(guard);
                let _ = self.events.send(ClientEvent::DashboardUpdated(fetched));
            }
            Err(error) => {
                warn!(%error, "refetch after write failed");
                guard.authoritative = guard.visible.clone();
                guard.stale = true;
                guard.sync = SyncState::Clean;
                drop(guard);
            }
        }
        self.emit_state(SyncState::Clean);
    }

    /// Restores the last confirmed dashboard after a failed write.
    async fn revert(&self, mutation: Mutation, error: ClientError) {
        warn!(mutation_id = %mutation.id, %error, "mutation failed; reverting");
        let failed = SyncState::Error {
            mutation: mutation.clone(),
            error: error.clone(),
        };
        let previous = {
            let mut guard = self.inner.lock().await;
            guard.visible = guard.authoritative.clone();
            guard.stale = true;
            guard.sync = failed.clone();
            guard.visible.clone()
        };
        self.emit_state(failed);
        let _ = self.events.send(ClientEvent::DashboardUpdated(previous));
        let _ = self
            .events
            .send(ClientEvent::MutationFailed { mutation, error });
        self.settle_clean().await;
    }

    async fn settle_clean(&self) {
        self.inner.lock().await.sync = SyncState::Clean;
        self.emit_state(SyncState::Clean);
    }

    fn emit_state(&self, state: SyncState) {
        let _ = self.events.send(ClientEvent::StateChanged(state));
    }
}

fn unexpected_outcome(operation: &str) -> ClientError {
    ClientError::Transport(format!("{operation} completed without its result"))
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
