use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow, PgPool};

use crate::error::{AppError, AppResult};

use super::document::{Direction, Document, DocumentStore, DocumentWrite, Query};

/// Builds a jsonb object mapping each name in `$n::text[]` to the current
/// UTC time, formatted the same way the in-memory store formats it.
fn stamps_sql(param: usize) -> String {
    format!(
        r#"COALESCE(
            (SELECT jsonb_object_agg(k, to_jsonb(to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS.US"Z"')))
             FROM unnest(${}::text[]) AS k),
            '{{}}'::jsonb
        )"#,
        param
    )
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    data: Json<Map<String, Value>>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            data: row.data.0,
        }
    }
}

/// Document store on a single PostgreSQL `documents` table.
#[derive(Clone)]
pub struct PgDocumentStore {
    db: PgPool,
}

impl PgDocumentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        Ok(row.map(Document::from))
    }

    async fn set(&self, collection: &str, id: &str, write: DocumentWrite) -> AppResult<()> {
        let on_conflict = if write.merge {
            "documents.data || EXCLUDED.data"
        } else {
            "EXCLUDED.data"
        };

        let sql = format!(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3 || {})
            ON CONFLICT (collection, id)
            DO UPDATE SET data = {}, updated_at = NOW()
            "#,
            stamps_sql(4),
            on_conflict
        );

        sqlx::query(&sql)
            .bind(collection)
            .bind(id)
            .bind(Json(&write.fields))
            .bind(&write.server_timestamps)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, write: DocumentWrite) -> AppResult<()> {
        let sql = format!(
            r#"
            UPDATE documents
            SET data = data || $3 || {}, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
            stamps_sql(4)
        );

        let result = sqlx::query(&sql)
            .bind(collection)
            .bind(id)
            .bind(Json(&write.fields))
            .bind(&write.server_timestamps)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::DocumentNotFound(format!("{}/{}", collection, id)));
        }

        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>> {
        let filters: Map<String, Value> = query.filters.iter().cloned().collect();

        let rows: Vec<DocumentRow> = match &query.order_by {
            Some((field, direction)) => {
                let direction = match direction {
                    Direction::Ascending => "ASC NULLS FIRST",
                    Direction::Descending => "DESC NULLS LAST",
                };
                let sql = format!(
                    "SELECT id, data FROM documents WHERE collection = $1 AND data @> $2 ORDER BY data -> $3 {}",
                    direction
                );
                sqlx::query_as(&sql)
                    .bind(collection)
                    .bind(Json(&filters))
                    .bind(field)
                    .fetch_all(&self.db)
                    .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, data FROM documents WHERE collection = $1 AND data @> $2 ORDER BY id",
                )
                .bind(collection)
                .bind(Json(&filters))
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(rows.into_iter().map(Document::from).collect())
    }
}
