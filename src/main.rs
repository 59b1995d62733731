use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use tapssp_retrieval::config::{EmbedderBackend, IndexBackend, PipelineConfig};
use tapssp_retrieval::utils::load_documents;
use tapssp_retrieval::{
    Embedder, HashingEmbedder, HuggingFaceEmbedder, HuggingFaceLlm, InMemoryIndex, LLMConfig,
    PineconeIndex, RetrievalQa, SearchRetriever, SimilaritySearchEngine, VectorIndexClient,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn build_engine(config: &PipelineConfig) -> Result<SimilaritySearchEngine> {
    let embedder: Arc<dyn Embedder> = match config.embedder {
        EmbedderBackend::Local => Arc::new(HashingEmbedder::new(config.hashing_dimensions)?),
        EmbedderBackend::HuggingFace => Arc::new(HuggingFaceEmbedder::new(
            config.hf_token.clone().unwrap_or_default(),
            config.hf_embedding_model.clone(),
        )),
    };
    let index: Arc<dyn VectorIndexClient> = match config.index {
        IndexBackend::Memory => Arc::new(InMemoryIndex::new()),
        IndexBackend::Pinecone => Arc::new(PineconeIndex::new(&config.pinecone)?),
    };
    let engine = SimilaritySearchEngine::new(embedder, index);
    Ok(engine.with_default_namespace(config.namespace.clone()))
}

/// Routes Ctrl+C to the request in flight. With nothing in flight the
/// process exits with the conventional SIGINT status.
#[derive(Clone, Default)]
struct Interrupts {
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    fn listen() -> Self {
        let interrupts = Self::default();
        let slot = interrupts.in_flight.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                let current = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
                match current {
                    Some(token) => token.cancel(),
                    None => std::process::exit(130),
                }
            }
        });
        interrupts
    }

    /// Registers a fresh token for one request. Dropping the guard
    /// unregisters it.
    fn begin(&self) -> InFlight<'_> {
        let token = CancellationToken::new();
        *self.lock() = Some(token.clone());
        InFlight {
            interrupts: self,
            token,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct InFlight<'a> {
    interrupts: &'a Interrupts,
    token: CancellationToken,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.interrupts.lock().take();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = PipelineConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = std::env::args().nth(1) {
        config.docs_dir = dir.into();
    }

    let Some(token) = config.hf_token.clone() else {
        anyhow::bail!("HUGGINGFACEHUB_API_TOKEN is required to generate answers");
    };
    let engine = build_engine(&config)?;
    let interrupts = Interrupts::listen();

    println!("Loading documents from '{}'...", config.docs_dir.display());
    match load_documents(&config.docs_dir, config.chunk_size) {
        Ok(documents) => {
            let request = interrupts.begin();
            if let Err(e) = engine.add_documents(&request.token, documents, None).await {
                let e = anyhow::Error::from(e);
                tracing::warn!(error = format!("{e:#}"), "failed to index documents");
            }
        }
        Err(e) => tracing::warn!(error = format!("{e:#}"), "failed to load documents"),
    }

    let retriever = SearchRetriever::new(engine, config.search_options())?;
    let llm = HuggingFaceLlm::new(token, config.hf_llm_model.clone(), LLMConfig::default());
    let chain = RetrievalQa::new(retriever, llm);

    println!(
        "RAG System initialized! Enter your questions \
         (Ctrl+C cancels an answer, Ctrl+D or Ctrl+C at the prompt exits)"
    );

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        print!("\nThinking...");
        std::io::stdout().flush()?;
        let request = interrupts.begin();
        match chain.run(&request.token, query).await {
            Ok(response) => println!("\r{}\n", response),
            Err(e) => eprintln!("\rError: {:#}\n", e),
        }
    }

    Ok(())
}
