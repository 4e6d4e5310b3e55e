//! SQLite-backed document store.
//!
//! All collections share the `documents` table (see `migrations/`). Bodies
//! are stored as JSON text and filtered in process, which keeps the matcher
//! identical to the in-memory store.

use kinship_common::error::{KinshipError, KinshipResult};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::document::{Document, DocumentStore, Filter, FindOptions};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Matching rows as `(seq, body)` in insertion order.
    async fn scan(&self, collection: &str, filter: &Filter) -> KinshipResult<Vec<(i64, Document)>> {
        let rows = sqlx::query("SELECT seq, body FROM documents WHERE collection = ? ORDER BY seq")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut matched = Vec::new();
        for row in rows {
            let seq: i64 = row.try_get("seq")?;
            let body: String = row.try_get("body")?;
            let doc = match serde_json::from_str::<Document>(&body) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(collection, seq, error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            if filter.matches(&doc) {
                matched.push((seq, doc));
            }
        }
        Ok(matched)
    }
}

fn encode(doc: &Document) -> KinshipResult<String> {
    serde_json::to_string(doc).map_err(KinshipError::from)
}

impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &str, doc: Document) -> KinshipResult<()> {
        sqlx::query("INSERT INTO documents (collection, body) VALUES (?, ?)")
            .bind(collection)
            .bind(encode(&doc)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_unique(&self, collection: &str, key: &str, doc: Document) -> KinshipResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, unique_key, body)
            VALUES (?, ?, ?)
            ON CONFLICT (collection, unique_key) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(encode(&doc)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> KinshipResult<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .scan(collection, filter)
            .await?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect();
        options.apply(&mut docs);
        Ok(docs)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> KinshipResult<bool> {
        let Some((seq, mut doc)) = self.scan(collection, filter).await?.into_iter().next() else {
            return Ok(false);
        };
        doc.extend(set);
        sqlx::query("UPDATE documents SET body = ? WHERE seq = ?")
            .bind(encode(&doc)?)
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> KinshipResult<bool> {
        let Some((seq, _)) = self.scan(collection, filter).await?.into_iter().next() else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM documents WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> KinshipResult<u64> {
        let mut deleted = 0;
        for (seq, _) in self.scan(collection, filter).await? {
            deleted += sqlx::query("DELETE FROM documents WHERE seq = ?")
                .bind(seq)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(deleted)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> KinshipResult<u64> {
        Ok(self.scan(collection, filter).await?.len() as u64)
    }
}
