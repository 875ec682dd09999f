use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    dashboard::DashboardAggregate,
    domain::{Link, LinkId, Section, SectionId, UserId},
    error::ApiError,
    protocol::{
        CreateLinkRequest, DeleteSectionResponse, SectionOrder, UpdateLinkRequest,
        UpdateSectionRequest,
    },
};
use tokio::sync::Notify;

use crate::{
    backend::DashboardBackend,
    error::ClientError,
    optimistic::{self, MutationKind},
};

pub(crate) const A: SectionId = SectionId(1);
pub(crate) const B: SectionId = SectionId(2);
pub(crate) const C: SectionId = SectionId(3);

pub(crate) fn section(id: SectionId, order: i64, is_default: bool) -> Section {
    Section {
        id,
        name: format!("section-{id}"),
        order,
        user_id: UserId(1),
        is_default,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

pub(crate) fn link(id: i64, section_id: Option<SectionId>, is_pinned: bool) -> Link {
    Link {
        id: LinkId(id),
        title: format!("link-{id}"),
        url: format!("https://example.com/{id}"),
        description: None,
        is_pinned,
        user_id: UserId(1),
        section_id,
        created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
    }
}

/// Sections `[A, B, C]` with A as the default, one link in each of A and B.
pub(crate) fn sample_dashboard() -> DashboardAggregate {
    DashboardAggregate::project(
        vec![section(A, 0, true), section(B, 1, false), section(C, 2, false)],
        vec![link(10, Some(A), false), link(11, Some(B), false)],
    )
}

/// In-memory server. Writes can be made to fail or to block until released.
pub(crate) struct FakeBackend {
    pub(crate) dashboard: Mutex<DashboardAggregate>,
    pub(crate) fail_writes: Mutex<Option<ApiError>>,
    pub(crate) fail_fetches: Mutex<bool>,
    pub(crate) gate: Option<Arc<Notify>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    pub(crate) fetches: AtomicUsize,
    pub(crate) writes: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeBackend {
    pub(crate) fn new(dashboard: DashboardAggregate) -> Self {
        Self {
            dashboard: Mutex::new(dashboard),
            fail_writes: Mutex::new(None),
            fail_fetches: Mutex::new(false),
            gate: None,
            fetch_gate: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            next_id: AtomicUsize::new(100),
        }
    }

    pub(crate) fn gated(dashboard: DashboardAggregate, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(dashboard)
        }
    }

    pub(crate) fn fail_writes_with(&self, err: Option<ApiError>) {
        *self.fail_writes.lock().unwrap() = err;
    }

    /// The next fetch reads the dashboard immediately but only returns once
    /// `gate` is notified.
    pub(crate) fn hold_next_fetch(&self, gate: Arc<Notify>) {
        *self.fetch_gate.lock().unwrap() = Some(gate);
    }

    /// Simulates a write made by another client.
    pub(crate) fn insert_link(&self, added: Link) {
        let mut dashboard = self.dashboard.lock().unwrap();
        let (sections, mut links) = dashboard.clone().into_parts();
        links.push(added);
        *dashboard = DashboardAggregate::project(sections, links);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn server_dashboard(&self) -> DashboardAggregate {
        self.dashboard.lock().unwrap().clone()
    }

    async fn write(&self, kind: MutationKind) -> Result<(), ClientError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = self.fail_writes.lock().unwrap().clone() {
            return Err(ClientError::Rejected(err));
        }
        let mut dashboard = self.dashboard.lock().unwrap();
        *dashboard = optimistic::apply(&dashboard, &kind)?;
        Ok(())
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64
    }
}

#[async_trait]
impl DashboardBackend for FakeBackend {
    async fn fetch_dashboard(&self) -> Result<DashboardAggregate, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.fail_fetches.lock().unwrap() {
            return Err(ClientError::Transport("connection refused".into()));
        }
        let snapshot = self.server_dashboard();
        let held = self.fetch_gate.lock().unwrap().take();
        if let Some(gate) = held {
            gate.notified().await;
        }
        Ok(snapshot)
    }

    async fn reorder_sections(&self, assignments: &[SectionOrder]) -> Result<(), ClientError> {
        self.write(MutationKind::ReorderSections {
            assignments: assignments.to_vec(),
        })
        .await
    }

    async fn create_link(&self, request: &CreateLinkRequest) -> Result<Link, ClientError> {
        self.write(MutationKind::CreateLink {
            request: request.clone(),
        })
        .await?;
        let mut created = link(self.next_id(), request.section_id, request.is_pinned);
        created.title = request.title.clone();
        created.url = request.url.clone();
        let mut dashboard = self.dashboard.lock().unwrap();
        let (sections, mut links) = dashboard.clone().into_parts();
        links.push(created.clone());
        *dashboard = DashboardAggregate::project(sections, links);
        Ok(created)
    }

    async fn update_link(
        &self,
        link_id: LinkId,
        patch: &UpdateLinkRequest,
    ) -> Result<Link, ClientError> {
        self.write(MutationKind::UpdateLink {
            link_id,
            patch: patch.clone(),
        })
        .await?;
        self.server_dashboard()
            .link(link_id)
            .cloned()
            .ok_or_else(|| ClientError::Rejected(ApiError::not_found("link not found")))
    }

    async fn delete_link(&self, link_id: LinkId) -> Result<(), ClientError> {
        self.write(MutationKind::DeleteLink { link_id }).await
    }

    async fn create_section(&self, name: &str) -> Result<Section, ClientError> {
        self.write(MutationKind::CreateSection {
            name: name.to_string(),
        })
        .await?;
        let mut dashboard = self.dashboard.lock().unwrap();
        let (mut sections, links) = dashboard.clone().into_parts();
        let order = sections.iter().map(|s| s.order).max().map_or(0, |max| max + 1);
        let mut created = section(SectionId(self.next_id()), order, false);
        created.name = name.to_string();
        sections.push(created.clone());
        *dashboard = DashboardAggregate::project(sections, links);
        Ok(created)
    }

    async fn update_section(
        &self,
        section_id: SectionId,
        patch: &UpdateSectionRequest,
    ) -> Result<Section, ClientError> {
        self.write(MutationKind::UpdateSection {
            section_id,
            patch: patch.clone(),
        })
        .await?;
        self.server_dashboard()
            .section(section_id)
            .map(|entry| entry.section.clone())
            .ok_or_else(|| ClientError::Rejected(ApiError::not_found("section not found")))
    }

    async fn delete_section(
        &self,
        section_id: SectionId,
    ) -> Result<DeleteSectionResponse, ClientError> {
        let reassigned_links = self
            .server_dashboard()
            .section(section_id)
            .map_or(0, |entry| entry.links.len() as u64);
        self.write(MutationKind::DeleteSection { section_id }).await?;
        Ok(DeleteSectionResponse { reassigned_links })
    }
}
