use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{Link, LinkId, Section, SectionId, UserId, DEFAULT_SECTION_NAME},
    protocol::{CreateLinkRequest, SectionOrder, UpdateLinkRequest, UpdateSectionRequest},
};

const SECTION_COLUMNS: &str = "id, user_id, name, position, is_default, created_at";
const LINK_COLUMNS: &str =
    "id, user_id, section_id, title, url, description, is_pinned, created_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Outcome of [`Storage::delete_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionDeletion {
    Deleted { reassigned_links: u64 },
    NotFound,
    Protected,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Returns the id for `username`, creating the user and its default
    /// section on first sight. Safe to call repeatedly.
    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&mut *tx)
        .await?;
        let user_id = UserId(rec.get::<i64, _>(0));

        sqlx::query(
            "INSERT INTO sections (user_id, name, position, is_default, created_at)
             SELECT ?, ?, 0, 1, ?
             WHERE NOT EXISTS (SELECT 1 FROM sections WHERE user_id = ? AND is_default = 1)",
        )
        .bind(user_id.0)
        .bind(DEFAULT_SECTION_NAME)
        .bind(Utc::now())
        .bind(user_id.0)
        .execute(&mut *tx)
        .await
        .context("failed to create default section")?;

        tx.commit().await?;
        Ok(user_id)
    }

    pub async fn user_exists(&self, user_id: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_sections(&self, user_id: UserId) -> Result<Vec<Section>> {
        let rows = sqlx::query(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections WHERE user_id = ? ORDER BY position ASC, id ASC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(section_from_row).collect()
    }

    pub async fn get_section(
        &self,
        user_id: UserId,
        section_id: SectionId,
    ) -> Result<Option<Section>> {
        let row = sqlx::query(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections WHERE id = ? AND user_id = ?"
        ))
        .bind(section_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(section_from_row).transpose()
    }

    pub async fn default_section(&self, user_id: UserId) -> Result<Option<Section>> {
        let row = sqlx::query(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections WHERE user_id = ? AND is_default = 1"
        ))
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(section_from_row).transpose()
    }

    /// Appends a section after the user's current highest rank.
    pub async fn create_section(&self, user_id: UserId, name: &str) -> Result<Section> {
        let row = sqlx::query(&format!(
            "INSERT INTO sections (user_id, name, position, is_default, created_at)
             VALUES (?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM sections WHERE user_id = ?), 0, ?)
             RETURNING {SECTION_COLUMNS}"
        ))
        .bind(user_id.0)
        .bind(name)
        .bind(user_id.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        section_from_row(&row)
    }

    pub async fn update_section(
        &self,
        user_id: UserId,
        section_id: SectionId,
        patch: &UpdateSectionRequest,
    ) -> Result<Option<Section>> {
        let row = sqlx::query(&format!(
            "UPDATE sections
             SET name = COALESCE(?, name), position = COALESCE(?, position)
             WHERE id = ? AND user_id = ?
             RETURNING {SECTION_COLUMNS}"
        ))
        .bind(patch.name.as_deref())
        .bind(patch.order)
        .bind(section_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(section_from_row).transpose()
    }

    /// Deletes a non-default section, moving its links into the default
    /// section within the same transaction.
    pub async fn delete_section(
        &self,
        user_id: UserId,
        section_id: SectionId,
    ) -> Result<SectionDeletion> {
        let mut tx = self.pool.begin().await?;

        let target = sqlx::query("SELECT is_default FROM sections WHERE id = ? AND user_id = ?")
            .bind(section_id.0)
            .bind(user_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(target) = target else {
            return Ok(SectionDeletion::NotFound);
        };
        if target.get::<bool, _>(0) {
            return Ok(SectionDeletion::Protected);
        }

        let default_id = default_section_id(&mut *tx, user_id).await?;
        let reassigned_links =
            sqlx::query("UPDATE links SET section_id = ? WHERE user_id = ? AND section_id = ?")
                .bind(default_id.0)
                .bind(user_id.0)
                .bind(section_id.0)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        sqlx::query("DELETE FROM sections WHERE id = ? AND user_id = ?")
            .bind(section_id.0)
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SectionDeletion::Deleted { reassigned_links })
    }

    /// Writes every rank in `assignments` or none of them. Returns `false`
    /// (and leaves the store untouched) when an id is not owned by `user_id`.
    pub async fn apply_order_assignments(
        &self,
        user_id: UserId,
        assignments: &[SectionOrder],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        for assignment in assignments {
            let updated =
                sqlx::query("UPDATE sections SET position = ? WHERE id = ? AND user_id = ?")
                    .bind(assignment.order)
                    .bind(assignment.id.0)
                    .bind(user_id.0)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            if updated != 1 {
                tx.rollback().await?;
                return Ok(false);
            }
        }
        tx.commit().await?;
        Ok(true)
    }

    pub async fn list_links(&self, user_id: UserId) -> Result<Vec<Link>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE user_id = ? ORDER BY id ASC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(link_from_row).collect()
    }

    pub async fn get_link(&self, user_id: UserId, link_id: LinkId) -> Result<Option<Link>> {
        let row = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = ? AND user_id = ?"
        ))
        .bind(link_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(link_from_row).transpose()
    }

    /// Inserts an already validated link.
    pub async fn create_link(&self, user_id: UserId, link: &CreateLinkRequest) -> Result<Link> {
        let row = sqlx::query(&format!(
            "INSERT INTO links (user_id, section_id, title, url, description, is_pinned, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {LINK_COLUMNS}"
        ))
        .bind(user_id.0)
        .bind(link.section_id.map(|id| id.0))
        .bind(&link.title)
        .bind(&link.url)
        .bind(link.description.as_deref())
        .bind(link.is_pinned)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        link_from_row(&row)
    }

    /// Applies a partial patch. Absent fields keep their value; `Some(None)`
    /// clears `description` or `section_id`.
    pub async fn update_link(
        &self,
        user_id: UserId,
        link_id: LinkId,
        patch: &UpdateLinkRequest,
    ) -> Result<Option<Link>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = ? AND user_id = ?"
        ))
        .bind(link_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let current = link_from_row(&row)?;

        let title = patch.title.clone().unwrap_or(current.title);
        let url = patch.url.clone().unwrap_or(current.url);
        let description = patch.description.clone().unwrap_or(current.description);
        let is_pinned = patch.is_pinned.unwrap_or(current.is_pinned);
        let section_id = patch.section_id.unwrap_or(current.section_id);

        let row = sqlx::query(&format!(
            "UPDATE links
             SET title = ?, url = ?, description = ?, is_pinned = ?, section_id = ?
             WHERE id = ? AND user_id = ?
             RETURNING {LINK_COLUMNS}"
        ))
        .bind(title)
        .bind(url)
        .bind(description)
        .bind(is_pinned)
        .bind(section_id.map(|id| id.0))
        .bind(link_id.0)
        .bind(user_id.0)
        .fetch_one(&mut *tx)
        .await?;
        let updated = link_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    pub async fn delete_link(&self, user_id: UserId, link_id: LinkId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM links WHERE id = ? AND user_id = ?")
            .bind(link_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// True when `err` comes from lock contention or pool exhaustion rather than
/// a broken statement, i.e. the write may succeed if issued again later.
pub fn is_contention(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| match cause.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::PoolTimedOut) => true,
            // SQLITE_BUSY, SQLITE_LOCKED and their extended codes.
            Some(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
            }
            _ => false,
        })
}

async fn default_section_id(conn: &mut SqliteConnection, user_id: UserId) -> Result<SectionId> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM sections WHERE user_id = ? AND is_default = 1")
            .bind(user_id.0)
            .fetch_optional(&mut *conn)
            .await?;
    match id {
        Some(id) => Ok(SectionId(id)),
        None => bail!("user {user_id} has no default section"),
    }
}

fn section_from_row(row: &SqliteRow) -> Result<Section> {
    Ok(Section {
        id: SectionId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        name: row.try_get("name")?,
        order: row.try_get("position")?,
        is_default: row.try_get("is_default")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<Link> {
    Ok(Link {
        id: LinkId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        section_id: row.try_get::<Option<i64>, _>("section_id")?.map(SectionId),
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        description: row.try_get("description")?,
        is_pinned: row.try_get("is_pinned")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
