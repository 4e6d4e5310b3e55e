//! In-process document store.
//!
//! Backs `database.url = "memory"` and the test suites. State is lost on
//! restart.

use std::collections::HashMap;
use std::sync::Arc;

use kinship_common::error::KinshipResult;
use tokio::sync::RwLock;

use crate::document::{Document, DocumentStore, Filter, FindOptions};

#[derive(Debug)]
struct Stored {
    key: Option<String>,
    body: Document,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Stored>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, doc: Document) -> KinshipResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(Stored {
                key: None,
                body: doc,
            });
        Ok(())
    }

    async fn insert_unique(&self, collection: &str, key: &str, doc: Document) -> KinshipResult<bool> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.key.as_deref() == Some(key)) {
            return Ok(false);
        }
        docs.push(Stored {
            key: Some(key.to_string()),
            body: doc,
        });
        Ok(true)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> KinshipResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut found: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filter.matches(&d.body))
                    .map(|d| d.body.clone())
                    .collect()
            })
            .unwrap_or_default();
        options.apply(&mut found);
        Ok(found)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> KinshipResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(stored) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| filter.matches(&d.body)))
        else {
            return Ok(false);
        };
        stored.body.extend(set);
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> KinshipResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match docs.iter().position(|d| filter.matches(&d.body)) {
            Some(pos) => {
                docs.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> KinshipResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(&d.body));
        Ok((before - docs.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> KinshipResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(&d.body)).count())
            .unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn unique_key_is_freed_by_delete() {
        let store = MemoryStore::new();
        assert!(store.insert_unique("c", "k", doc(json!({"n": 1}))).await.unwrap());
        assert!(!store.insert_unique("c", "k", doc(json!({"n": 2}))).await.unwrap());
        assert_eq!(store.count("c", &Filter::new()).await.unwrap(), 1);

        assert!(store.delete_one("c", &Filter::new().eq("n", 1)).await.unwrap());
        assert!(store.insert_unique("c", "k", doc(json!({"n": 3}))).await.unwrap());
    }

    #[tokio::test]
    async fn update_sets_only_named_fields() {
        let store = MemoryStore::new();
        store.insert("c", doc(json!({"id": "a", "x": 1, "y": 1}))).await.unwrap();
        let hit = store
            .update_one("c", &Filter::new().eq("id", "a"), doc(json!({"x": 2})))
            .await
            .unwrap();
        assert!(hit);
        let found = store.find_one("c", &Filter::new().eq("id", "a")).await.unwrap().unwrap();
        assert_eq!(found["x"], 2);
        assert_eq!(found["y"], 1);
        assert!(!store.update_one("c", &Filter::new().eq("id", "b"), Document::new()).await.unwrap());
    }
}
