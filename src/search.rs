use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::document::{Document, IndexItem, ScoredDocument};
use crate::embedder::Embedder;
use crate::error::{Operation, Result, RetrievalError};
use crate::options::SearchOptions;
use crate::vector_db::VectorIndexClient;

/// Similarity search over an injected embedder and vector index.
///
/// Holds no mutable state, so one instance can be shared across tasks. Never
/// retries or caches; failures carry the operation and namespace.
#[derive(Clone)]
pub struct SimilaritySearchEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndexClient>,
    default_namespace: String,
}

impl SimilaritySearchEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndexClient>) -> Self {
        SimilaritySearchEngine {
            embedder,
            index,
            default_namespace: String::new(),
        }
    }

    /// Namespace used when a call does not name one.
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Returns at most `opts.top_k` documents in index order, each scoring at
    /// least the threshold when one is set.
    pub async fn search(
        &self,
        ctx: &CancellationToken,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredDocument>> {
        if query.trim().is_empty() {
            return Err(RetrievalError::invalid("query must not be empty"));
        }
        opts.validate()?;
        let namespace = opts.resolve_namespace(&self.default_namespace);

        let vector = run(ctx, Operation::Embed, namespace, self.embedder.embed(query)).await?;
        let matches = run(
            ctx,
            Operation::Query,
            namespace,
            self.index.query(&vector, namespace, opts.top_k),
        )
        .await?;

        let returned = matches.len();
        let results: Vec<ScoredDocument> = matches
            .into_iter()
            .filter(|m| opts.passes(m.score))
            .take(opts.top_k)
            .collect();

        tracing::debug!(
            namespace,
            top_k = opts.top_k,
            threshold = ?opts.score_threshold,
            returned,
            kept = results.len(),
            "similarity search"
        );
        Ok(results)
    }

    /// Embeds every document, then submits them all in one upsert.
    ///
    /// Returns the assigned IDs in input order. Nothing is written if any
    /// embedding fails.
    pub async fn add_documents(
        &self,
        ctx: &CancellationToken,
        documents: Vec<Document>,
        namespace: Option<&str>,
    ) -> Result<Vec<String>> {
        let namespace = namespace.unwrap_or(&self.default_namespace);
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            let vector = run(
                ctx,
                Operation::Embed,
                namespace,
                self.embedder.embed(&document.content),
            )
            .await?;
            items.push(IndexItem {
                id: Uuid::new_v4().to_string(),
                document,
                vector,
            });
        }

        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        run(ctx, Operation::Upsert, namespace, self.index.upsert(namespace, items)).await?;

        tracing::info!(namespace, count = ids.len(), "added documents");
        Ok(ids)
    }
}

/// Races an outbound call against cancellation. The losing future is dropped.
async fn run<T, F>(
    ctx: &CancellationToken,
    operation: Operation,
    namespace: &str,
    call: F,
) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    if ctx.is_cancelled() {
        return Err(RetrievalError::Cancelled { operation });
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => {
            tracing::debug!(%operation, namespace, "outbound call cancelled");
            Err(RetrievalError::Cancelled { operation })
        }
        result = call => result.map_err(|source| RetrievalError::Upstream {
            operation,
            namespace: namespace.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::QueryMatch;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Err(anyhow!("model unavailable"))
        }
    }

    /// Returns canned matches and records every call.
    #[derive(Default)]
    struct ScriptedIndex {
        matches: Vec<(String, f32)>,
        queries: AtomicUsize,
        upserts: Mutex<Vec<(String, usize)>>,
        last_namespace: Mutex<Option<String>>,
    }

    impl ScriptedIndex {
        fn with_scores(scores: &[(&str, f32)]) -> Self {
            ScriptedIndex {
                matches: scores.iter().map(|(c, s)| (c.to_string(), *s)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl VectorIndexClient for ScriptedIndex {
        async fn query(
            &self,
            _vector: &[f32],
            namespace: &str,
            top_k: usize,
        ) -> anyhow::Result<Vec<QueryMatch>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            *self.last_namespace.lock().unwrap() = Some(namespace.to_string());
            Ok(self
                .matches
                .iter()
                .take(top_k)
                .map(|(c, s)| QueryMatch { document: Document::new(c.as_str()), score: *s })
                .collect())
        }

        async fn upsert(&self, namespace: &str, items: Vec<IndexItem>) -> anyhow::Result<()> {
            self.upserts.lock().unwrap().push((namespace.to_string(), items.len()));
            Ok(())
        }
    }

    fn engine(index: Arc<ScriptedIndex>) -> SimilaritySearchEngine {
        SimilaritySearchEngine::new(Arc::new(ConstEmbedder), index)
    }

    #[tokio::test]
    async fn test_threshold_filters_and_keeps_order() {
        let index = Arc::new(ScriptedIndex::with_scores(&[
            ("a", 0.95),
            ("b", 0.81),
            ("c", 0.80),
            ("d", 0.42),
        ]));
        let ctx = CancellationToken::new();
        let opts = SearchOptions::new(4).with_score_threshold(0.8);
        let docs = engine(index).search(&ctx, "q", &opts).await.unwrap();
        let contents: Vec<_> = docs.iter().map(|d| d.document.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_all_filtered_is_empty_not_error() {
        let index = Arc::new(ScriptedIndex::with_scores(&[("a", 0.3)]));
        let ctx = CancellationToken::new();
        let opts = SearchOptions::new(1).with_score_threshold(1.0);
        assert!(engine(index).search(&ctx, "q", &opts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_options_make_no_outbound_call() {
        let index = Arc::new(ScriptedIndex::with_scores(&[("a", 0.9)]));
        let engine = engine(index.clone());
        let ctx = CancellationToken::new();

        for opts in [
            SearchOptions::new(0),
            SearchOptions::new(3).with_score_threshold(-0.8),
            SearchOptions::new(3).with_score_threshold(1.8),
        ] {
            let err = engine.search(&ctx, "q", &opts).await.unwrap_err();
            assert!(err.is_invalid_argument(), "{opts:?}");
        }
        let err = engine.search(&ctx, "  ", &SearchOptions::new(1)).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_options_win_over_cancellation() {
        let index = Arc::new(ScriptedIndex::default());
        let ctx = CancellationToken::new();
        ctx.cancel();
        let opts = SearchOptions::new(1).with_score_threshold(2.0);
        let err = engine(index).search(&ctx, "q", &opts).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_embed_failure_is_upstream_with_context() {
        let index = Arc::new(ScriptedIndex::default());
        let engine = SimilaritySearchEngine::new(Arc::new(FailingEmbedder), index.clone())
            .with_default_namespace("team");
        let ctx = CancellationToken::new();
        let err = engine.search(&ctx, "q", &SearchOptions::new(1)).await.unwrap_err();
        match err {
            RetrievalError::Upstream { operation, namespace, source } => {
                assert_eq!(operation, Operation::Embed);
                assert_eq!(namespace, "team");
                assert_eq!(source.to_string(), "model unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_namespace_override_and_default() {
        let index = Arc::new(ScriptedIndex::with_scores(&[("a", 0.5)]));
        let engine = engine(index.clone()).with_default_namespace("base");
        let ctx = CancellationToken::new();

        engine.search(&ctx, "q", &SearchOptions::new(1)).await.unwrap();
        assert_eq!(index.last_namespace.lock().unwrap().as_deref(), Some("base"));

        let opts = SearchOptions::new(1).with_namespace("other");
        engine.search(&ctx, "q", &opts).await.unwrap();
        assert_eq!(index.last_namespace.lock().unwrap().as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_add_documents_single_upsert() {
        let index = Arc::new(ScriptedIndex::default());
        let ctx = CancellationToken::new();
        let ids = engine(index.clone())
            .add_documents(&ctx, vec![Document::new("yes"), Document::new("no")], Some("ns"))
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(*index.upserts.lock().unwrap(), vec![("ns".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_add_documents_embed_failure_writes_nothing() {
        let index = Arc::new(ScriptedIndex::default());
        let engine = SimilaritySearchEngine::new(Arc::new(FailingEmbedder), index.clone());
        let ctx = CancellationToken::new();
        let err = engine
            .add_documents(&ctx, vec![Document::new("x")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Upstream { operation: Operation::Embed, .. }));
        assert!(index.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_no_documents_is_noop() {
        let index = Arc::new(ScriptedIndex::default());
        let ctx = CancellationToken::new();
        let ids = engine(index.clone()).add_documents(&ctx, Vec::new(), None).await.unwrap();
        assert!(ids.is_empty());
        assert!(index.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token() {
        let index = Arc::new(ScriptedIndex::with_scores(&[("a", 0.9)]));
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = engine(index.clone())
            .search(&ctx, "q", &SearchOptions::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Cancelled { operation: Operation::Embed }));
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
    }
}
