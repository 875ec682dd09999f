use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{SectionId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<SectionId>,
}

/// Partial link update. An absent field is left unchanged; an explicit
/// `null` for `section_id` or `description` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLinkRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub section_id: Option<Option<SectionId>>,
}

impl UpdateLinkRequest {
    pub fn pin(is_pinned: bool) -> Self {
        Self {
            is_pinned: Some(is_pinned),
            ..Self::default()
        }
    }

    pub fn move_to(section_id: Option<SectionId>) -> Self {
        Self {
            section_id: Some(section_id),
            ..Self::default()
        }
    }
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSectionRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSectionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// One entry of a full rank reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOrder {
    pub id: SectionId,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderSectionsRequest {
    pub section_orders: Vec<SectionOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSectionResponse {
    pub reassigned_links: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Something in the user's dashboard was written; clients should refetch.
    DashboardChanged { user_id: UserId },
}

impl ServerEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::DashboardChanged { user_id } => *user_id,
        }
    }
}
