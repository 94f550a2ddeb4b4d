use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::user::{Role, User};
use crate::infra::db::Db;
use crate::infra::storage::Replaced;

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, role, avatar_url, bio, social_link, created_at";

pub(crate) fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get("role");
    let role = Role::from_db(&role).ok_or_else(|| anyhow!("unknown user role: {}", role))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role,
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        social_link: row.get("social_link"),
        created_at: row.get("created_at"),
    })
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub social_link: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    /// Applies the given profile changes. When `avatar_url` is set the
    /// previous avatar URL is handed back so the caller can drop the file.
    /// Fails with a unique violation on `users_username_key` when the new
    /// username is taken.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
        avatar_url: Option<String>,
    ) -> Result<Option<Replaced<User>>> {
        let mut tx = self.db.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT avatar_url FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            "UPDATE users \
             SET username = COALESCE($2, username), \
                 bio = COALESCE($3, bio), \
                 social_link = COALESCE($4, social_link), \
                 avatar_url = COALESCE($5, avatar_url) \
             WHERE id = $1 \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(changes.username)
        .bind(changes.bio)
        .bind(changes.social_link)
        .bind(&avatar_url)
        .fetch_one(&mut *tx)
        .await?;
        let user = user_from_row(&row)?;

        tx.commit().await?;

        Ok(Some(Replaced {
            value: user,
            previous_url: avatar_url.map(|_| previous),
        }))
    }

    pub async fn update_role(&self, user_id: Uuid, role: Role) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(role.as_db())
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }
}
