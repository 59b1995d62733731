use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A piece of text plus arbitrary metadata. Read-only once added to a store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Document {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A search hit. Produced only by the search path, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    /// Similarity in `[0,1]`, higher is more relevant.
    pub score: f32,
}

/// One document and its embedding, submitted together in a single upsert.
#[derive(Debug, Clone)]
pub struct IndexItem {
    pub id: String,
    pub document: Document,
    pub vector: Vec<f32>,
}

/// Raw result row returned by an index client.
pub type QueryMatch = ScoredDocument;
