//! # Postgres `DataStore`
//!
//! Documents are kept in a single JSONB table keyed by `(collection, id)`.
//! Reply sub-collections are just collections whose path contains the
//! parent listing id, so no extra tables are needed.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use domains::{DataStore, Document, RecordQuery, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection TEXT  NOT NULL,
    id         TEXT  NOT NULL,
    body       JSONB NOT NULL,
    PRIMARY KEY (collection, id)
)";

pub struct PgDataStore {
    pool: PgPool,
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl PgDataStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(unavailable)?;
        Ok(Self { pool })
    }

    /// Creates the documents table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        info!("documents table ready");
        Ok(())
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.map(|row| {
            let Json(fields) = row.get::<Json<Map<String, Value>>, _>("body");
            Document::new(id, fields)
        }))
    }

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<Document>, StoreError> {
        let mut sql: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, body FROM documents WHERE collection = ");
        sql.push_bind(query.collection.as_str());
        for (field, value) in &query.equals {
            if field.is_empty() {
                return Err(StoreError::Rejected("empty field name in predicate".into()));
            }
            sql.push(" AND body -> ")
                .push_bind(field.as_str())
                .push(" = ")
                .push_bind(Json(value.clone()));
        }

        let rows = sql
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut docs: Vec<Document> = rows
            .into_iter()
            .map(|row| {
                let Json(fields) = row.get::<Json<Map<String, Value>>, _>("body");
                Document::new(row.get::<String, _>("id"), fields)
            })
            .collect();
        // Ordering is applied here rather than in SQL so every adapter breaks
        // ties the same way.
        query.sort(&mut docs);
        Ok(docs)
    }

    async fn insert_record(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(fields))
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(id)
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE documents SET body = body || $3 WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .bind(Json(fields))
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        if result.rows_affected() == 0 {
            return Err(Self::not_found(collection, id));
        }
        Ok(())
    }

    async fn increment_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        // Single statement, so concurrent increments serialize on the row lock.
        let row = sqlx::query(
            "UPDATE documents
             SET body = jsonb_set(
                 body, ARRAY[$3], to_jsonb(COALESCE((body ->> $3)::bigint, 0) + $4)
             )
             WHERE collection = $1 AND id = $2
             RETURNING (body ->> $3)::bigint AS value",
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => Ok(row.get::<i64, _>("value")),
            None => Err(Self::not_found(collection, id)),
        }
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }
}
