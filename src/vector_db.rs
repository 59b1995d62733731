use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ndarray::ArrayView1;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::document::{Document, IndexItem, QueryMatch};

/// A namespaced similarity-ranked store, usually remote.
///
/// `query` returns at most `top_k` matches in descending score order, with
/// scores already converted to similarity in `[0,1]`.
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    async fn query(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>>;

    async fn upsert(&self, namespace: &str, items: Vec<IndexItem>) -> Result<()>;
}

/// How a backend reports closeness, and how that maps onto `[0,1]` similarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoreMetric {
    #[default]
    Cosine,
    DotProduct,
    /// Raw value is a distance, lower is closer.
    Euclidean,
}

impl ScoreMetric {
    pub fn to_similarity(self, raw: f32) -> f32 {
        match self {
            ScoreMetric::Cosine | ScoreMetric::DotProduct => raw.clamp(0.0, 1.0),
            ScoreMetric::Euclidean => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

impl std::str::FromStr for ScoreMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(ScoreMetric::Cosine),
            "dotproduct" | "dot_product" => Ok(ScoreMetric::DotProduct),
            "euclidean" => Ok(ScoreMetric::Euclidean),
            other => Err(anyhow!("unknown score metric: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredVector {
    id: String,
    document: Document,
    vector: Vec<f32>,
}

/// Exact cosine search over namespace-partitioned vectors held in memory.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<HashMap<String, Vec<StoredVector>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors stored under `namespace`.
    pub fn count(&self, namespace: &str) -> Result<usize> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        Ok(namespaces.get(namespace).map_or(0, Vec::len))
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let a = ArrayView1::from(a);
        let b = ArrayView1::from(b);
        let dot_product = a.dot(&b);
        let norm_a = a.dot(&a).sqrt();
        let norm_b = b.dot(&b).sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot_product / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorIndexClient for InMemoryIndex {
    async fn query(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let Some(stored) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut similarities = Vec::with_capacity(stored.len());
        for item in stored {
            if item.vector.len() != vector.len() {
                return Err(anyhow!(
                    "dimension mismatch: expected {}, got {}",
                    item.vector.len(),
                    vector.len()
                ));
            }
            let cosine = Self::cosine_similarity(&item.vector, vector);
            let score = ScoreMetric::Cosine.to_similarity(cosine);
            similarities.push((score, item));
        }

        // stable, so ties keep insertion order
        similarities.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(similarities
            .into_iter()
            .take(top_k)
            .map(|(score, item)| QueryMatch {
                document: item.document.clone(),
                score,
            })
            .collect())
    }

    async fn upsert(&self, namespace: &str, items: Vec<IndexItem>) -> Result<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let stored = namespaces.entry(namespace.to_string()).or_default();

        for item in items {
            let entry = StoredVector {
                id: item.id,
                document: item.document,
                vector: item.vector,
            };
            match stored.iter_mut().find(|s| s.id == entry.id) {
                Some(existing) => *existing = entry,
                None => stored.push(entry),
            }
        }
        tracing::debug!(namespace, total = stored.len(), "in-memory upsert");
        Ok(())
    }
}
