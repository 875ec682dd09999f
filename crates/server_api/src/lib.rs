use shared::{
    dashboard::DashboardAggregate,
    domain::{Link, LinkId, Section, SectionId, UserId},
    error::{ApiError, ErrorCode},
    ordering,
    protocol::{
        CreateLinkRequest, DeleteSectionResponse, SectionOrder, UpdateLinkRequest,
        UpdateSectionRequest,
    },
    validation,
};
use storage::{SectionDeletion, Storage};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn login(ctx: &ApiContext, username: &str) -> Result<UserId, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username must not be empty"));
    }
    let user_id = ctx
        .storage
        .create_user(username)
        .await
        .map_err(storage_failure)?;
    info!(%user_id, "user logged in");
    Ok(user_id)
}

/// Rejects requests on behalf of users the store has never seen.
pub async fn ensure_user(ctx: &ApiContext, user_id: UserId) -> Result<(), ApiError> {
    let exists = ctx
        .storage
        .user_exists(user_id)
        .await
        .map_err(storage_failure)?;
    if !exists {
        return Err(ApiError::new(ErrorCode::Unauthorized, "unknown user"));
    }
    Ok(())
}

pub async fn fetch_dashboard(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<DashboardAggregate, ApiError> {
    ensure_user(ctx, user_id).await?;
    let sections = ctx
        .storage
        .list_sections(user_id)
        .await
        .map_err(storage_failure)?;
    let links = ctx
        .storage
        .list_links(user_id)
        .await
        .map_err(storage_failure)?;
    Ok(DashboardAggregate::project(sections, links))
}

pub async fn list_links(ctx: &ApiContext, user_id: UserId) -> Result<Vec<Link>, ApiError> {
    ensure_user(ctx, user_id).await?;
    ctx.storage
        .list_links(user_id)
        .await
        .map_err(storage_failure)
}

pub async fn create_link(
    ctx: &ApiContext,
    user_id: UserId,
    request: &CreateLinkRequest,
) -> Result<Link, ApiError> {
    ensure_user(ctx, user_id).await?;
    let request = validation::create_link(request)?;
    if let Some(section_id) = request.section_id {
        ensure_owned_section(ctx, user_id, section_id).await?;
    }

    let link = ctx
        .storage
        .create_link(user_id, &request)
        .await
        .map_err(storage_failure)?;
    info!(%user_id, link_id = %link.id, "link created");
    Ok(link)
}

pub async fn update_link(
    ctx: &ApiContext,
    user_id: UserId,
    link_id: LinkId,
    patch: &UpdateLinkRequest,
) -> Result<Link, ApiError> {
    ensure_user(ctx, user_id).await?;
    let patch = validation::update_link(patch)?;
    if let Some(Some(section_id)) = patch.section_id {
        ensure_owned_section(ctx, user_id, section_id).await?;
    }

    let link = ctx
        .storage
        .update_link(user_id, link_id, &patch)
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::not_found("link not found"))?;
    info!(%user_id, %link_id, pinned = link.is_pinned, "link updated");
    Ok(link)
}

pub async fn delete_link(ctx: &ApiContext, user_id: UserId, link_id: LinkId) -> Result<(), ApiError> {
    ensure_user(ctx, user_id).await?;
    let deleted = ctx
        .storage
        .delete_link(user_id, link_id)
        .await
        .map_err(storage_failure)?;
    if !deleted {
        return Err(ApiError::not_found("link not found"));
    }
    info!(%user_id, %link_id, "link deleted");
    Ok(())
}

pub async fn list_sections(ctx: &ApiContext, user_id: UserId) -> Result<Vec<Section>, ApiError> {
    ensure_user(ctx, user_id).await?;
    ctx.storage
        .list_sections(user_id)
        .await
        .map_err(storage_failure)
}

pub async fn create_section(
    ctx: &ApiContext,
    user_id: UserId,
    name: &str,
) -> Result<Section, ApiError> {
    ensure_user(ctx, user_id).await?;
    let name = validation::section_name(name)?;
    let section = ctx
        .storage
        .create_section(user_id, &name)
        .await
        .map_err(storage_failure)?;
    info!(%user_id, section_id = %section.id, order = section.order, "section created");
    Ok(section)
}

pub async fn update_section(
    ctx: &ApiContext,
    user_id: UserId,
    section_id: SectionId,
    patch: &UpdateSectionRequest,
) -> Result<Section, ApiError> {
    ensure_user(ctx, user_id).await?;
    let patch = UpdateSectionRequest {
        name: patch
            .name
            .as_deref()
            .map(validation::section_name)
            .transpose()?,
        order: patch.order,
    };

    let section = ctx
        .storage
        .update_section(user_id, section_id, &patch)
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::not_found("section not found"))?;
    info!(%user_id, %section_id, "section updated");
    Ok(section)
}

/// Deletes a section after moving its links into the default section.
pub async fn delete_section(
    ctx: &ApiContext,
    user_id: UserId,
    section_id: SectionId,
) -> Result<DeleteSectionResponse, ApiError> {
    ensure_user(ctx, user_id).await?;
    match ctx
        .storage
        .delete_section(user_id, section_id)
        .await
        .map_err(storage_failure)?
    {
        SectionDeletion::Deleted { reassigned_links } => {
            info!(%user_id, %section_id, reassigned = reassigned_links, "section deleted");
            Ok(DeleteSectionResponse { reassigned_links })
        }
        SectionDeletion::NotFound => Err(ApiError::not_found("section not found")),
        SectionDeletion::Protected => Err(ApiError::new(
            ErrorCode::Protected,
            "the default section cannot be deleted",
        )),
    }
}

/// Applies a full rank reassignment of the user's sections, or nothing.
pub async fn reorder_sections(
    ctx: &ApiContext,
    user_id: UserId,
    assignments: &[SectionOrder],
) -> Result<(), ApiError> {
    ensure_user(ctx, user_id).await?;
    let existing: Vec<SectionId> = ctx
        .storage
        .list_sections(user_id)
        .await
        .map_err(storage_failure)?
        .into_iter()
        .map(|section| section.id)
        .collect();
    ordering::validate_assignments(&existing, assignments)?;

    let applied = ctx
        .storage
        .apply_order_assignments(user_id, assignments)
        .await
        .map_err(storage_failure)?;
    if !applied {
        // A section vanished between validation and the write.
        warn!(%user_id, "reorder rolled back");
        return Err(ApiError::new(
            ErrorCode::Conflict,
            "sections changed while reordering",
        ));
    }
    info!(%user_id, sections = assignments.len(), "sections reordered");
    Ok(())
}

async fn ensure_owned_section(
    ctx: &ApiContext,
    user_id: UserId,
    section_id: SectionId,
) -> Result<(), ApiError> {
    ctx.storage
        .get_section(user_id, section_id)
        .await
        .map_err(storage_failure)?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("section not found"))
}

fn storage_failure(err: anyhow::Error) -> ApiError {
    if storage::is_contention(&err) {
        return ApiError::new(ErrorCode::Conflict, err.to_string());
    }
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
