pub mod config;
pub mod document;
pub mod embedder;
pub mod error;
pub mod llm;
pub mod options;
pub mod pinecone;
pub mod retriever;
pub mod search;
pub mod utils;
pub mod vector_db;

pub use document::{Document, IndexItem, QueryMatch, ScoredDocument};
pub use embedder::{Embedder, HashingEmbedder, HuggingFaceEmbedder};
pub use error::{Operation, RetrievalError};
pub use llm::{HuggingFaceLlm, LLMConfig, LanguageModel, RetrievalQa};
pub use options::SearchOptions;
pub use pinecone::{PineconeConfig, PineconeIndex};
pub use retriever::{Retriever, SearchRetriever};
pub use search::SimilaritySearchEngine;
pub use vector_db::{InMemoryIndex, ScoreMetric, VectorIndexClient};
