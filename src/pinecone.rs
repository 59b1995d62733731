use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Document, IndexItem, QueryMatch};
use crate::vector_db::{ScoreMetric, VectorIndexClient};

pub const DEFAULT_TEXT_KEY: &str = "text";

#[derive(Debug, Clone, Default)]
pub struct PineconeConfig {
    pub api_key: String,
    pub environment: String,
    pub index_name: String,
    pub project_name: String,
    /// Overrides the host derived from index, project and environment.
    pub host: Option<String>,
    pub text_key: Option<String>,
    pub metric: ScoreMetric,
}

impl PineconeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(anyhow!("pinecone requires an api key"));
        }
        if self.host.is_none() {
            let mut missing = Vec::new();
            if self.environment.is_empty() {
                missing.push("environment");
            }
            if self.index_name.is_empty() {
                missing.push("index name");
            }
            if self.project_name.is_empty() {
                missing.push("project name");
            }
            if !missing.is_empty() {
                return Err(anyhow!("pinecone requires {}", missing.join(", ")));
            }
        }
        Ok(())
    }

    pub fn host(&self) -> String {
        match &self.host {
            Some(host) => host.trim_end_matches('/').to_owned(),
            None => format!(
                "https://{}-{}.svc.{}.pinecone.io",
                self.index_name, self.project_name, self.environment
            ),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    top_k: usize,
    vector: &'a [f32],
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    score: f32,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertVector {
    id: String,
    values: Vec<f32>,
    metadata: Map<String, Value>,
}

/// REST client for a Pinecone index.
///
/// Page content travels in vector metadata under `text_key`; every other
/// metadata key round-trips untouched.
#[derive(Debug, Clone)]
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    text_key: String,
    metric: ScoreMetric,
}

impl PineconeIndex {
    pub fn new(config: &PineconeConfig) -> Result<Self> {
        config.validate()?;
        Ok(PineconeIndex {
            client: reqwest::Client::new(),
            host: config.host(),
            api_key: config.api_key.clone(),
            text_key: config
                .text_key
                .clone()
                .unwrap_or_else(|| DEFAULT_TEXT_KEY.to_string()),
            metric: config.metric,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("pinecone request to {path} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(anyhow!("pinecone returned {status}: {body}"));
        }
        Ok(resp)
    }

    fn to_match(&self, raw: RawMatch) -> Result<QueryMatch> {
        let mut metadata = raw.metadata;
        let content = match metadata.remove(&self.text_key) {
            Some(Value::String(text)) => text,
            Some(_) => return Err(anyhow!("metadata field {:?} is not a string", self.text_key)),
            None => return Err(anyhow!("match is missing metadata field {:?}", self.text_key)),
        };
        Ok(QueryMatch {
            document: Document {
                content,
                metadata: metadata.into_iter().collect(),
            },
            score: self.metric.to_similarity(raw.score),
        })
    }
}

#[async_trait]
impl VectorIndexClient for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>> {
        let request = QueryRequest {
            namespace,
            top_k,
            vector,
            include_metadata: true,
            include_values: false,
        };
        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .context("failed to parse pinecone query response")?;

        response
            .matches
            .into_iter()
            .map(|raw| self.to_match(raw))
            .collect()
    }

    async fn upsert(&self, namespace: &str, items: Vec<IndexItem>) -> Result<()> {
        let vectors = items
            .into_iter()
            .map(|item| {
                let mut metadata: Map<String, Value> = item.document.metadata.into_iter().collect();
                metadata.insert(self.text_key.clone(), Value::String(item.document.content));
                UpsertVector {
                    id: item.id,
                    values: item.vector,
                    metadata,
                }
            })
            .collect::<Vec<_>>();
        let count = vectors.len();

        self.post("/vectors/upsert", &UpsertRequest { vectors, namespace })
            .await?;
        tracing::debug!(namespace, count, "pinecone upsert");
        Ok(())
    }
}
