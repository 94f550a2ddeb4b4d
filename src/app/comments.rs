use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::comment::Comment;
use crate::domain::user::AuthorSummary;
use crate::infra::db::Db;
use crate::infra::storage::Replaced;

const COMMENT_SELECT: &str = "SELECT c.id, c.body, c.image_url, c.thread_id, c.author_id, c.created_at, \
            u.username AS author_username, u.email AS author_email, \
            u.avatar_url AS author_avatar_url \
     FROM comments c \
     JOIN users u ON u.id = c.author_id";

#[derive(Debug, Clone)]
pub struct DeletedComment {
    pub thread_id: Uuid,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Oldest first.
    pub async fn list_comments(
        &self,
        thread_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Comment>, i64)> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.thread_id = $1 \
             ORDER BY c.created_at ASC, c.id ASC \
             LIMIT $2 OFFSET $3",
            COMMENT_SELECT
        ))
        .bind(thread_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE thread_id = $1")
            .bind(thread_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok((rows.iter().map(comment_from_row).collect(), total))
    }

    pub async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(&format!("{} WHERE c.id = $1", COMMENT_SELECT))
            .bind(comment_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|row| comment_from_row(&row)))
    }

    pub async fn create_comment(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        body: String,
        image_url: Option<String>,
    ) -> Result<Comment> {
        let comment_id: Uuid = sqlx::query_scalar(
            "INSERT INTO comments (body, image_url, thread_id, author_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(body)
        .bind(image_url)
        .bind(thread_id)
        .bind(author_id)
        .fetch_one(self.db.pool())
        .await?;

        self.get_comment(comment_id)
            .await?
            .ok_or_else(|| anyhow!("comment {} vanished after insert", comment_id))
    }

    /// Rewrites the body and/or swaps the attached image. The superseded
    /// image URL is returned for cleanup.
    pub async fn update_comment(
        &self,
        comment_id: Uuid,
        body: Option<String>,
        image_url: Option<String>,
    ) -> Result<Option<Replaced<Comment>>> {
        let mut tx = self.db.begin().await?;

        let previous: Option<Option<String>> =
            sqlx::query_scalar("SELECT image_url FROM comments WHERE id = $1 FOR UPDATE")
                .bind(comment_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous_image) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE comments \
             SET body = COALESCE($2, body), \
                 image_url = COALESCE($3, image_url) \
             WHERE id = $1",
        )
        .bind(comment_id)
        .bind(body)
        .bind(&image_url)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("{} WHERE c.id = $1", COMMENT_SELECT))
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(Replaced {
            value: comment_from_row(&row),
            previous_url: image_url.and(previous_image),
        }))
    }

    pub async fn delete_comment(&self, comment_id: Uuid) -> Result<Option<DeletedComment>> {
        let row = sqlx::query("DELETE FROM comments WHERE id = $1 RETURNING thread_id, image_url")
            .bind(comment_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|row| DeletedComment {
            thread_id: row.get("thread_id"),
            image_url: row.get("image_url"),
        }))
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        body: row.get("body"),
        image_url: row.get("image_url"),
        thread_id: row.get("thread_id"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        author: AuthorSummary {
            id: row.get("author_id"),
            username: row.get("author_username"),
            email: row.get("author_email"),
            avatar_url: row.get("author_avatar_url"),
        },
    }
}
