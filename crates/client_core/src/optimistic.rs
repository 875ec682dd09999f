//! Local prediction of a mutation's effect on the dashboard.
//!
//! [`apply`] is pure: it never mutates its input and re-runs the same
//! projection the server uses, so a successful refetch normally replaces the
//! prediction with an identical value.

use shared::{
    dashboard::DashboardAggregate,
    domain::{LinkId, SectionId},
    error::{ApiError, ErrorCode},
    ordering,
    protocol::{CreateLinkRequest, SectionOrder, UpdateLinkRequest, UpdateSectionRequest},
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ReorderSections { assignments: Vec<SectionOrder> },
    CreateLink { request: CreateLinkRequest },
    UpdateLink { link_id: LinkId, patch: UpdateLinkRequest },
    DeleteLink { link_id: LinkId },
    CreateSection { name: String },
    UpdateSection { section_id: SectionId, patch: UpdateSectionRequest },
    DeleteSection { section_id: SectionId },
}

/// A user intent tracked by a session from dispatch until reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: Uuid,
    pub kind: MutationKind,
}

impl Mutation {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

pub fn apply(
    aggregate: &DashboardAggregate,
    kind: &MutationKind,
) -> Result<DashboardAggregate, ApiError> {
    let (mut sections, mut links) = aggregate.clone().into_parts();

    match kind {
        // Ids are assigned by the server; nothing to predict.
        MutationKind::CreateLink { .. } | MutationKind::CreateSection { .. } => {
            return Ok(aggregate.clone());
        }
        MutationKind::ReorderSections { assignments } => {
            ordering::validate_assignments(&aggregate.section_ids(), assignments)?;
            for section in &mut sections {
                if let Some(assignment) = assignments.iter().find(|a| a.id == section.id) {
                    section.order = assignment.order;
                }
            }
        }
        MutationKind::UpdateLink { link_id, patch } => {
            if let Some(Some(target)) = patch.section_id {
                if !sections.iter().any(|section| section.id == target) {
                    return Err(ApiError::not_found("section not found"));
                }
            }
            let link = links
                .iter_mut()
                .find(|link| link.id == *link_id)
                .ok_or_else(|| ApiError::not_found("link not found"))?;
            if let Some(title) = &patch.title {
                link.title = title.clone();
            }
            if let Some(url) = &patch.url {
                link.url = url.clone();
            }
            if let Some(description) = &patch.description {
                link.description = description.clone();
            }
            if let Some(is_pinned) = patch.is_pinned {
                link.is_pinned = is_pinned;
            }
            if let Some(section_id) = patch.section_id {
                link.section_id = section_id;
            }
        }
        MutationKind::DeleteLink { link_id } => {
            let before = links.len();
            links.retain(|link| link.id != *link_id);
            if links.len() == before {
                return Err(ApiError::not_found("link not found"));
            }
        }
        MutationKind::UpdateSection { section_id, patch } => {
            let section = sections
                .iter_mut()
                .find(|section| section.id == *section_id)
                .ok_or_else(|| ApiError::not_found("section not found"))?;
            if let Some(name) = &patch.name {
                section.name = name.clone();
            }
            if let Some(order) = patch.order {
                section.order = order;
            }
        }
        MutationKind::DeleteSection { section_id } => {
            let target = sections
                .iter()
                .find(|section| section.id == *section_id)
                .ok_or_else(|| ApiError::not_found("section not found"))?;
            if target.is_default {
                return Err(ApiError::new(
                    ErrorCode::Protected,
                    "the default section cannot be deleted",
                ));
            }
            let default_id = aggregate.default_section().map(|section| section.id);
            sections.retain(|section| section.id != *section_id);
            for link in &mut links {
                if link.section_id == Some(*section_id) {
                    link.section_id = default_id;
                }
            }
        }
    }

    Ok(DashboardAggregate::project(sections, links))
}

#[cfg(test)]
#[path = "tests/optimistic_tests.rs"]
mod tests;
