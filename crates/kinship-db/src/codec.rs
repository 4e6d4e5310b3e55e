//! Typed records <-> stored documents.

use kinship_common::error::{KinshipError, KinshipResult};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::document::Document;

pub fn to_document<T: Serialize>(record: &T) -> KinshipResult<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(KinshipError::Internal(anyhow::anyhow!(
            "record serialized to {other}, expected an object"
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> KinshipResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Decode every document, skipping and logging the ones that no longer fit
/// the record shape rather than failing the whole listing.
pub fn decode_all<T: DeserializeOwned>(collection: &str, docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match from_document(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(collection, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

/// A single-field update document.
pub fn set<T: Serialize>(field: &str, value: &T) -> KinshipResult<Document> {
    let mut doc = Document::new();
    doc.insert(field.to_string(), serde_json::to_value(value)?);
    Ok(doc)
}
