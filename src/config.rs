use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;
use std::str::FromStr;

use crate::embedder::{DEFAULT_HASHING_DIMENSIONS, DEFAULT_HF_EMBEDDING_MODEL};
use crate::llm::DEFAULT_HF_LLM_MODEL;
use crate::options::{SearchOptions, validate_threshold};
use crate::pinecone::PineconeConfig;
use crate::vector_db::ScoreMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderBackend {
    Local,
    HuggingFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    Memory,
    Pinecone,
}

impl FromStr for EmbedderBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(EmbedderBackend::Local),
            "huggingface" | "hf" => Ok(EmbedderBackend::HuggingFace),
            other => Err(anyhow!("unknown embedder backend: {other}")),
        }
    }
}

impl FromStr for IndexBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(IndexBackend::Memory),
            "pinecone" => Ok(IndexBackend::Pinecone),
            other => Err(anyhow!("unknown index backend: {other}")),
        }
    }
}

/// Runtime settings for the binary, read from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub embedder: EmbedderBackend,
    pub index: IndexBackend,
    pub hashing_dimensions: usize,
    pub hf_token: Option<String>,
    pub hf_embedding_model: String,
    pub hf_llm_model: String,
    pub pinecone: PineconeConfig,
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub namespace: String,
    pub chunk_size: usize,
    pub docs_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderBackend::Local,
            index: IndexBackend::Memory,
            hashing_dimensions: DEFAULT_HASHING_DIMENSIONS,
            hf_token: None,
            hf_embedding_model: DEFAULT_HF_EMBEDDING_MODEL.to_string(),
            hf_llm_model: DEFAULT_HF_LLM_MODEL.to_string(),
            pinecone: PineconeConfig::default(),
            top_k: 3,
            score_threshold: None,
            namespace: String::new(),
            chunk_size: 500,
            docs_dir: PathBuf::from("docs"),
        }
    }
}

fn parse<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("invalid value for {key}: {e}"))
        })
        .transpose()
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, then validates it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(backend) = parse("RAG_EMBEDDER", get("RAG_EMBEDDER"))? {
            config.embedder = backend;
        }
        if let Some(backend) = parse("RAG_INDEX", get("RAG_INDEX"))? {
            config.index = backend;
        }
        if let Some(dims) = parse("RAG_HASHING_DIMENSIONS", get("RAG_HASHING_DIMENSIONS"))? {
            config.hashing_dimensions = dims;
        }
        config.hf_token = get("HUGGINGFACEHUB_API_TOKEN");
        if let Some(model) = get("HF_EMBEDDING_MODEL") {
            config.hf_embedding_model = model;
        }
        if let Some(model) = get("HF_LLM_MODEL") {
            config.hf_llm_model = model;
        }

        config.pinecone = PineconeConfig {
            api_key: get("PINECONE_API_KEY").unwrap_or_default(),
            environment: get("PINECONE_ENVIRONMENT").unwrap_or_default(),
            index_name: get("PINECONE_INDEX").unwrap_or_default(),
            project_name: get("PINECONE_PROJECT").unwrap_or_default(),
            host: get("PINECONE_HOST"),
            text_key: get("PINECONE_TEXT_KEY"),
            metric: parse::<ScoreMetric>("PINECONE_METRIC", get("PINECONE_METRIC"))?
                .unwrap_or_default(),
        };

        if let Some(top_k) = parse("RAG_TOP_K", get("RAG_TOP_K"))? {
            config.top_k = top_k;
        }
        config.score_threshold = parse("RAG_SCORE_THRESHOLD", get("RAG_SCORE_THRESHOLD"))?;
        if let Some(namespace) = lookup("RAG_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(size) = parse("RAG_CHUNK_SIZE", get("RAG_CHUNK_SIZE"))? {
            config.chunk_size = size;
        }
        if let Some(dir) = get("RAG_DOCS_DIR") {
            config.docs_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("RAG_TOP_K must be greater than zero");
        }
        if let Some(threshold) = self.score_threshold {
            validate_threshold(threshold).context("RAG_SCORE_THRESHOLD")?;
        }
        if self.chunk_size == 0 {
            bail!("RAG_CHUNK_SIZE must be greater than zero");
        }
        if self.hashing_dimensions == 0 {
            bail!("RAG_HASHING_DIMENSIONS must be greater than zero");
        }
        let needs_hf = self.embedder == EmbedderBackend::HuggingFace;
        if needs_hf && self.hf_token.is_none() {
            bail!("HUGGINGFACEHUB_API_TOKEN is required for the huggingface embedder");
        }
        if self.index == IndexBackend::Pinecone {
            self.pinecone.validate()?;
        }
        Ok(())
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            top_k: self.top_k,
            score_threshold: self.score_threshold,
            namespace: Some(self.namespace.clone()),
        }
    }
}
