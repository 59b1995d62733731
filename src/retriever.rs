use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::document::Document;
use crate::error::Result;
use crate::options::SearchOptions;
use crate::search::SimilaritySearchEngine;

/// Maps a query to ranked documents. All a generation chain needs to know.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn get_relevant_documents(
        &self,
        ctx: &CancellationToken,
        query: &str,
    ) -> Result<Vec<Document>>;
}

/// Fixes count, namespace and threshold at build time and hides the scores.
#[derive(Clone)]
pub struct SearchRetriever {
    engine: SimilaritySearchEngine,
    options: SearchOptions,
}

impl SearchRetriever {
    /// Fails with `InvalidArgument` if `options` could never produce a valid search.
    pub fn new(engine: SimilaritySearchEngine, options: SearchOptions) -> Result<Self> {
        options.validate()?;
        Ok(SearchRetriever { engine, options })
    }

    pub fn with_top_k(engine: SimilaritySearchEngine, top_k: usize) -> Result<Self> {
        Self::new(engine, SearchOptions::new(top_k))
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }
}

#[async_trait]
impl Retriever for SearchRetriever {
    async fn get_relevant_documents(
        &self,
        ctx: &CancellationToken,
        query: &str,
    ) -> Result<Vec<Document>> {
        let scored = self.engine.search(ctx, query, &self.options).await?;
        Ok(scored.into_iter().map(|s| s.document).collect())
    }
}
