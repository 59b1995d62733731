use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::document::Document;
use crate::embedder::HF_INFERENCE_API;
use crate::retriever::Retriever;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub const DEFAULT_HF_LLM_MODEL: &str = "gpt2";

#[derive(Debug, Clone, Serialize)]
pub struct LLMConfig {
    #[serde(rename = "max_new_tokens")]
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(rename = "repetition_penalty")]
    pub repeat_penalty: f32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            temperature: 0.7,
            top_p: 0.9,
            repeat_penalty: 1.1,
        }
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters<'a>,
}

#[derive(Debug, Serialize)]
struct InferenceParameters<'a> {
    #[serde(flatten)]
    config: &'a LLMConfig,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    generated_text: String,
}

/// Text generation through the Hugging Face inference API.
#[derive(Debug, Clone)]
pub struct HuggingFaceLlm {
    client: reqwest::Client,
    base_url: String,
    token: String,
    model: String,
    config: LLMConfig,
}

impl HuggingFaceLlm {
    pub fn new(token: impl Into<String>, model: impl Into<String>, config: LLMConfig) -> Self {
        Self::with_base_url(HF_INFERENCE_API, token, model, config)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        model: impl Into<String>,
        config: LLMConfig,
    ) -> Self {
        let base_url: String = base_url.into();
        HuggingFaceLlm {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            model: model.into(),
            config,
        }
    }
}

#[async_trait]
impl LanguageModel for HuggingFaceLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = InferenceRequest {
            inputs: prompt,
            parameters: InferenceParameters {
                config: &self.config,
                return_full_text: false,
            },
        };
        let resp = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .context("inference request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(anyhow!("inference API returned {status}: {body}"));
        }

        let outputs: Vec<InferenceResponse> = resp
            .json()
            .await
            .context("failed to parse inference response")?;
        outputs
            .into_iter()
            .next()
            .map(|o| o.generated_text)
            .ok_or_else(|| anyhow!("empty response from inference API"))
    }
}

/// Answers a question from documents fetched by a retriever.
pub struct RetrievalQa<R, M> {
    retriever: R,
    llm: M,
}

impl<R: Retriever, M: LanguageModel> RetrievalQa<R, M> {
    pub fn new(retriever: R, llm: M) -> Self {
        RetrievalQa { retriever, llm }
    }

    pub async fn run(&self, ctx: &CancellationToken, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(anyhow!("Query cannot be empty"));
        }

        let documents = self.retriever.get_relevant_documents(ctx, question).await?;
        tracing::debug!(documents = documents.len(), "retrieved context");

        let prompt = construct_prompt(question, &documents);
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(anyhow!("generation cancelled")),
            answer = self.llm.generate(&prompt) => Ok(answer?.trim().to_string()),
        }
    }
}

fn construct_prompt(question: &str, documents: &[Document]) -> String {
    let context_str = if documents.is_empty() {
        String::new()
    } else {
        let context: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        format!(
            "Using the following context to answer the question:\n\n{}\n\n",
            context.join("\n\n")
        )
    };

    format!("{context_str}Question: {question}\nAnswer:")
}
