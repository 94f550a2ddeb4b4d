use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infra::db::Db;

/// Schema-less collections kept apart from the relational tables. Documents
/// carry no foreign keys, so they outlive whatever rows they describe.
#[derive(Clone)]
pub struct DocumentStore {
    db: Db,
}

#[derive(Debug, Clone)]
pub struct Document<T> {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub body: T,
}

impl DocumentStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert<T>(
        &self,
        collection: &str,
        created_at: OffsetDateTime,
        body: &T,
    ) -> Result<Document<T>>
    where
        T: Serialize + Clone + Sync,
    {
        let value = serde_json::to_value(body)?;
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO documents (collection, body, created_at) \
             VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(collection)
        .bind(Json(value))
        .bind(created_at)
        .fetch_one(self.db.pool())
        .await?;

        Ok(Document {
            id,
            created_at,
            body: body.clone(),
        })
    }

    /// Writes a batch in one transaction; either every document lands or none.
    pub async fn insert_many<T: Serialize + Sync>(
        &self,
        collection: &str,
        batch: &[(OffsetDateTime, T)],
    ) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let rows = batch
            .iter()
            .map(|(created_at, body)| {
                Ok::<_, anyhow::Error>((*created_at, serde_json::to_value(body)?))
            })
            .collect::<Result<Vec<(OffsetDateTime, Value)>>>()?;

        let mut tx = self.db.begin().await?;
        for (created_at, body) in rows {
            sqlx::query(
                "INSERT INTO documents (collection, body, created_at) \
                 VALUES ($1, $2, $3)",
            )
            .bind(collection)
            .bind(Json(body))
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(batch.len())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<Document<T>>> {
        let row = sqlx::query(
            "SELECT id, body, created_at FROM documents \
             WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    /// Newest first. A `None` limit returns the whole collection.
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Document<T>>> {
        let rows = sqlx::query(
            "SELECT id, body, created_at FROM documents \
             WHERE collection = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(collection)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    pub async fn count(&self, collection: &str) -> Result<i64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1")
                .bind(collection)
                .fetch_one(self.db.pool())
                .await?;
        Ok(total)
    }

    /// Shallow-merges `patch` into the stored body and returns the result.
    pub async fn merge<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: Uuid,
        patch: Value,
    ) -> Result<Option<Document<T>>> {
        let row = sqlx::query(
            "UPDATE documents SET body = body || $3 \
             WHERE collection = $1 AND id = $2 \
             RETURNING id, body, created_at",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(patch))
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    pub async fn delete(&self, collection: &str, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn document_from_row<T: DeserializeOwned>(row: &PgRow) -> Result<Document<T>> {
    let body: Json<Value> = row.try_get("body")?;
    Ok(Document {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        body: serde_json::from_value(body.0)?,
    })
}
