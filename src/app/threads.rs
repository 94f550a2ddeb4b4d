use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::thread::Thread;
use crate::domain::user::AuthorSummary;
use crate::infra::db::Db;
use crate::infra::storage::Replaced;

const THREAD_SELECT: &str = "SELECT t.id, t.title, t.body, t.tags, t.cover_url, t.author_id, \
            t.category_id, t.created_at, \
            u.username AS author_username, u.email AS author_email, \
            u.avatar_url AS author_avatar_url, \
            (SELECT COUNT(*) FROM comments c WHERE c.thread_id = t.id) AS comment_count \
     FROM threads t \
     JOIN users u ON u.id = t.author_id";

#[derive(Debug, Clone)]
pub struct NewThread {
    pub title: String,
    pub body: String,
    pub tags: Option<String>,
    pub category_id: Option<Uuid>,
    pub author_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<String>,
    /// `Some(None)` detaches the thread from its category.
    pub category_id: Option<Option<Uuid>>,
}

/// Files left behind by a deleted thread.
#[derive(Debug, Clone, Default)]
pub struct DeletedThread {
    pub cover_url: Option<String>,
    pub comment_image_urls: Vec<String>,
}

#[derive(Clone)]
pub struct ThreadService {
    db: Db,
}

impl ThreadService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Newest first, optionally narrowed to one category. Returns the page
    /// together with the total number of matching threads.
    pub async fn list_threads(
        &self,
        category_id: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Thread>, i64)> {
        let rows = sqlx::query(&format!(
            "{} \
             WHERE ($1::uuid IS NULL OR t.category_id = $1) \
             ORDER BY t.created_at DESC, t.id DESC \
             LIMIT $2 OFFSET $3",
            THREAD_SELECT
        ))
        .bind(category_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM threads WHERE ($1::uuid IS NULL OR category_id = $1)",
        )
        .bind(category_id)
        .fetch_one(self.db.pool())
        .await?;

        let threads = rows.iter().map(thread_from_row).collect();
        Ok((threads, total))
    }

    pub async fn get_thread(&self, thread_id: Uuid) -> Result<Option<Thread>> {
        let row = sqlx::query(&format!("{} WHERE t.id = $1", THREAD_SELECT))
            .bind(thread_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|row| thread_from_row(&row)))
    }

    pub async fn create_thread(&self, thread: NewThread, cover_url: Option<String>) -> Result<Thread> {
        let thread_id: Uuid = sqlx::query_scalar(
            "INSERT INTO threads (title, body, tags, cover_url, author_id, category_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(thread.title)
        .bind(thread.body)
        .bind(thread.tags)
        .bind(cover_url)
        .bind(thread.author_id)
        .bind(thread.category_id)
        .fetch_one(self.db.pool())
        .await?;

        self.get_thread(thread_id)
            .await?
            .ok_or_else(|| anyhow!("thread {} vanished after insert", thread_id))
    }

    /// Applies `changes` and, when `cover_url` is set, swaps the cover.
    /// The superseded cover URL is returned for cleanup.
    pub async fn update_thread(
        &self,
        thread_id: Uuid,
        changes: ThreadChanges,
        cover_url: Option<String>,
    ) -> Result<Option<Replaced<Thread>>> {
        let mut tx = self.db.begin().await?;

        let previous: Option<Option<String>> =
            sqlx::query_scalar("SELECT cover_url FROM threads WHERE id = $1 FOR UPDATE")
                .bind(thread_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous_cover) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };

        let (set_category, category_id) = match changes.category_id {
            Some(category_id) => (true, category_id),
            None => (false, None),
        };

        sqlx::query(
            "UPDATE threads \
             SET title = COALESCE($2, title), \
                 body = COALESCE($3, body), \
                 tags = COALESCE($4, tags), \
                 cover_url = COALESCE($5, cover_url), \
                 category_id = CASE WHEN $6 THEN $7 ELSE category_id END \
             WHERE id = $1",
        )
        .bind(thread_id)
        .bind(changes.title)
        .bind(changes.body)
        .bind(changes.tags)
        .bind(&cover_url)
        .bind(set_category)
        .bind(category_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("{} WHERE t.id = $1", THREAD_SELECT))
            .bind(thread_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(Replaced {
            value: thread_from_row(&row),
            previous_url: cover_url.and(previous_cover),
        }))
    }

    /// Removes the thread and its comments in one transaction.
    pub async fn delete_thread(&self, thread_id: Uuid) -> Result<Option<DeletedThread>> {
        let mut tx = self.db.begin().await?;

        let cover: Option<Option<String>> =
            sqlx::query_scalar("SELECT cover_url FROM threads WHERE id = $1 FOR UPDATE")
                .bind(thread_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(cover_url) = cover else {
            tx.rollback().await?;
            return Ok(None);
        };

        let comment_images: Vec<Option<String>> =
            sqlx::query_scalar("DELETE FROM comments WHERE thread_id = $1 RETURNING image_url")
                .bind(thread_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM threads WHERE id = $1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(DeletedThread {
            cover_url,
            comment_image_urls: comment_images.into_iter().flatten().collect(),
        }))
    }

    pub async fn count_threads(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads")
            .fetch_one(self.db.pool())
            .await?;
        Ok(total)
    }
}

fn thread_from_row(row: &PgRow) -> Thread {
    Thread {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        tags: row.get("tags"),
        cover_url: row.get("cover_url"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        created_at: row.get("created_at"),
        author: AuthorSummary {
            id: row.get("author_id"),
            username: row.get("author_username"),
            email: row.get("author_email"),
            avatar_url: row.get("author_avatar_url"),
        },
        comment_count: row.get("comment_count"),
    }
}
