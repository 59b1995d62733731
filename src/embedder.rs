use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::{FxHashSet, FxHasher};
use serde_json::{Value, json};
use std::hash::{Hash, Hasher};
use unicode_normalization::UnicodeNormalization;

/// Turns text into a fixed-length vector.
///
/// Must be deterministic for identical input within a session.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

lazy_static! {
    static ref STOP_WORDS: FxHashSet<&'static str> = {
        let words = vec![
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from",
            "has", "he", "in", "is", "it", "its", "of", "on", "that", "the",
            "to", "was", "were", "will", "with"
        ];
        words.into_iter().collect()
    };
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").expect("static regex");
}

pub const DEFAULT_HASHING_DIMENSIONS: usize = 512;

/// Bag-of-words feature hashing. Works offline with no model download.
///
/// Term counts are hashed into `dimensions` buckets and L2-normalized. All
/// components are non-negative so cosine similarity stays in `[0,1]`.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(anyhow!("embedding dimensions must be greater than zero"));
        }
        Ok(HashingEmbedder { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn tokenize(text: &str) -> Vec<String> {
        let text = text.nfc().collect::<String>().to_lowercase();
        let text = NON_WORD.replace_all(&text, " ");

        text.split_whitespace()
            .filter(|&token| !STOP_WORDS.contains(token))
            .map(|token| token.to_string())
            .collect()
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = FxHasher::default();
        token.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in Self::tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        HashingEmbedder {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

pub const HF_INFERENCE_API: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_HF_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Hugging Face inference API, feature-extraction pipeline.
#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    base_url: String,
    token: String,
    model: String,
}

impl HuggingFaceEmbedder {
    pub fn new(token: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(HF_INFERENCE_API, token, model)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        HuggingFaceEmbedder {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            model: model.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/pipeline/feature-extraction/{}", self.base_url, self.model)
    }

    /// Accepts a sentence vector or token vectors, which are mean-pooled.
    fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
        let rows = value
            .as_array()
            .ok_or_else(|| anyhow!("expected array for embedding vector"))?;

        match rows.first() {
            None => Err(anyhow!("embedder returned an empty vector")),
            Some(Value::Array(_)) if rows.len() == 1 => Self::parse_embedding(&rows[0]),
            Some(Value::Array(_)) => {
                let vectors = rows
                    .iter()
                    .map(Self::parse_embedding)
                    .collect::<Result<Vec<_>>>()?;
                let dims = vectors[0].len();
                if vectors.iter().any(|v| v.len() != dims) {
                    return Err(anyhow!("token embeddings have inconsistent dimensions"));
                }
                let mut pooled = vec![0.0f32; dims];
                for vector in &vectors {
                    for (acc, v) in pooled.iter_mut().zip(vector) {
                        *acc += v;
                    }
                }
                let count = vectors.len() as f32;
                Ok(pooled.into_iter().map(|v| v / count).collect())
            }
            Some(_) => rows
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| anyhow!("embedding array contains non-numeric value"))
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.token)
            .json(&json!({ "inputs": text }))
            .send()
            .await
            .context("embedding request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(anyhow!("embedder returned {status}: {body}"));
        }

        let value: Value = resp
            .json()
            .await
            .context("failed to parse embedding response")?;
        Self::parse_embedding(&value)
    }
}
