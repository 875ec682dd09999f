use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(SectionId);
id_newtype!(LinkId);

/// Name given to the section every user starts with.
pub const DEFAULT_SECTION_NAME: &str = "Uncategorized";

pub const MAX_SECTION_NAME_CHARS: usize = 100;
pub const MAX_LINK_TITLE_CHARS: usize = 200;
pub const MAX_LINK_URL_CHARS: usize = 2048;
pub const MAX_LINK_DESCRIPTION_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub order: i64,
    pub user_id: UserId,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_pinned: bool,
    pub user_id: UserId,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    pub created_at: DateTime<Utc>,
}
