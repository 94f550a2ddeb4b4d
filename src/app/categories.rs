use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::category::Category;
use crate::infra::db::{is_unique_violation, Db};

#[derive(Debug)]
pub enum CreateCategory {
    Created(Category),
    NameTaken,
}

#[derive(Clone)]
pub struct CategoryService {
    db: Db,
}

impl CategoryService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, description FROM categories ORDER BY name ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Category {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            })
            .collect())
    }

    pub async fn create_category(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<CreateCategory> {
        let result = sqlx::query(
            "INSERT INTO categories (name, description) VALUES ($1, $2) \
             RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(self.db.pool())
        .await;

        match result {
            Ok(row) => Ok(CreateCategory::Created(Category {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            })),
            Err(err) => {
                let err = anyhow::Error::from(err);
                if is_unique_violation(&err, "categories_name_key") {
                    Ok(CreateCategory::NameTaken)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub async fn category_exists(&self, category_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(category_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(exists)
    }

    /// Threads in the category stay; their `category_id` is cleared by the
    /// foreign key's `ON DELETE SET NULL`.
    pub async fn delete_category(&self, category_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
