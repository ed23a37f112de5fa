//! Caller-supplied galleries of known identities.

use crate::types::Embedding;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("invalid gallery JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported gallery shape: expected a list of entries or known_encodings/user_ids arrays")]
    UnsupportedShape,
}

/// A known identity and its reference embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    #[serde(deserialize_with = "deserialize_identity")]
    pub identity: String,
    pub embedding: Embedding,
}

/// Ordered, append-only list of gallery entries. Position breaks similarity ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, identity: impl Into<String>, embedding: Embedding) {
        self.entries.push(GalleryEntry {
            identity: identity.into(),
            embedding,
        });
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_json_str(json: &str) -> Result<Self, GalleryError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json(&value)
    }

    /// Build a gallery from either accepted JSON shape:
    ///
    /// ```json
    /// [{"identity": "42", "embedding": [0.1, ...]}, ...]
    /// {"known_encodings": [[0.1, ...], ...], "user_ids": [42, ...]}
    /// ```
    ///
    /// Entries that do not parse into a valid embedding or lack an identity
    /// are skipped with a warning.
    pub fn from_json(value: &Value) -> Result<Self, GalleryError> {
        match value {
            Value::Array(items) => Ok(Self::from_entry_list(items)),
            Value::Object(map) => {
                let encodings = map.get("known_encodings").and_then(Value::as_array);
                let ids = map.get("user_ids").and_then(Value::as_array);
                match (encodings, ids) {
                    (Some(encodings), Some(ids)) => Ok(Self::from_parallel(encodings, ids)),
                    (None, None) => match map.get("entries").and_then(Value::as_array) {
                        Some(items) => Ok(Self::from_entry_list(items)),
                        None => Err(GalleryError::UnsupportedShape),
                    },
                    _ => Err(GalleryError::UnsupportedShape),
                }
            }
            _ => Err(GalleryError::UnsupportedShape),
        }
    }

    fn from_entry_list(items: &[Value]) -> Self {
        let mut gallery = Self::default();
        for (position, item) in items.iter().enumerate() {
            match GalleryEntry::deserialize(item) {
                Ok(entry) => gallery.entries.push(entry),
                Err(err) => {
                    tracing::warn!(position, error = %err, "skipping malformed gallery entry");
                }
            }
        }
        gallery
    }

    fn from_parallel(encodings: &[Value], ids: &[Value]) -> Self {
        if encodings.len() != ids.len() {
            tracing::warn!(
                encodings = encodings.len(),
                user_ids = ids.len(),
                "gallery encodings and user ids differ in length"
            );
        }

        let mut gallery = Self::default();
        for (position, encoding) in encodings.iter().enumerate() {
            let Some(identity) = ids.get(position).and_then(identity_string) else {
                tracing::warn!(position, "skipping gallery encoding without a user id");
                continue;
            };
            match Embedding::deserialize(encoding) {
                Ok(embedding) => gallery.entries.push(GalleryEntry {
                    identity,
                    embedding,
                }),
                Err(err) => {
                    tracing::warn!(position, error = %err, "skipping malformed gallery encoding");
                }
            }
        }
        gallery
    }
}

fn identity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// User ids may be JSON strings or numbers in every gallery shape.
fn deserialize_identity<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    identity_string(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("identity must be a string or number, got {value}"))
    })
}
