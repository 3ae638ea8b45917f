//! Retrieval-augmented answering over the paper collection.
//!
//! The chain is fixed: embed the question, fetch the `k` nearest passages,
//! render them as numbered context, fill the answer prompt and ask the
//! model. Any failure along the way yields [`NOTHING_FOUND`].

mod chroma;

pub use chroma::ChromaVectorStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::{ChatMessage, CompletionOptions, Embedder, LlmClient, LlmError};
use crate::tools::NOTHING_FOUND;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("vector store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed vector store response: {0}")]
    InvalidResponse(String),
}

/// A retrieved passage.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    pub metadata: Option<Map<String, Value>>,
}

/// Similarity search over pre-computed embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Passage>, VectorStoreError>;
}

#[derive(Debug, Error)]
enum ChainError {
    #[error("embedding failed: {0}")]
    Embed(#[source] LlmError),

    #[error(transparent)]
    Search(#[from] VectorStoreError),

    #[error("completion failed: {0}")]
    Complete(#[source] LlmError),

    #[error("no passages matched")]
    NoPassages,

    #[error("model returned an empty answer")]
    EmptyAnswer,
}

/// The fixed embed → search → format → prompt → complete pipeline.
pub struct RetrievalChain {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    model: String,
    top_k: usize,
    answer_language: String,
}

impl RetrievalChain {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            model: model.into(),
            top_k: 5,
            answer_language: "Russian".to_string(),
        }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k.max(1);
        self
    }

    pub fn with_answer_language(mut self, language: impl Into<String>) -> Self {
        self.answer_language = language.into();
        self
    }

    /// Answer `question` from retrieved passages, or return the sentinel.
    pub async fn answer(&self, question: &str) -> String {
        match self.run(question).await {
            Ok(answer) => answer,
            Err(ChainError::NoPassages) => {
                tracing::debug!(question, "retrieval found no passages");
                NOTHING_FOUND.to_string()
            }
            Err(e) => {
                tracing::warn!(question, "retrieval chain failed: {}", e);
                NOTHING_FOUND.to_string()
            }
        }
    }

    async fn run(&self, question: &str) -> Result<String, ChainError> {
        let embedding = self
            .embedder
            .embed_query(question)
            .await
            .map_err(ChainError::Embed)?;

        let passages = self.store.similarity_search(&embedding, self.top_k).await?;
        if passages.is_empty() {
            return Err(ChainError::NoPassages);
        }
        tracing::debug!(passages = passages.len(), "retrieved context");

        let prompt = build_answer_prompt(
            &format_passages(&passages),
            question,
            &self.answer_language,
        );
        let response = self
            .llm
            .chat_completion(
                &self.model,
                &[ChatMessage::user(prompt)],
                &CompletionOptions::default(),
            )
            .await
            .map_err(ChainError::Complete)?;

        response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ChainError::EmptyAnswer)
    }
}

/// Render passages as numbered context blocks.
pub fn format_passages(passages: &[Passage]) -> String {
    let mut parts = Vec::with_capacity(passages.len() * 4);
    for (i, passage) in passages.iter().enumerate() {
        parts.push(format!("[Document {}]", i + 1));
        parts.push(passage.text.clone());
        if let Some(metadata) = passage.metadata.as_ref().filter(|m| !m.is_empty()) {
            parts.push(format!("Metadata: {}", Value::Object(metadata.clone())));
        }
        parts.push(String::new());
    }
    parts.join("\n")
}

fn build_answer_prompt(context: &str, question: &str, language: &str) -> String {
    format!(
        r#"You are a research assistant specialising in the analysis of scientific papers.
Answer the user's question using ONLY the context from ArXiv papers below.

Rules:
1. Use only information from the context below
2. If the context does not contain the answer, say so honestly
3. Name the papers the information comes from when metadata is available
4. Answer in {language}, clearly and in a structured way
5. Be precise about technical details

Context from scientific papers:
{context}

User question: {question}

Answer:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedEmbedder(Result<Vec<f32>, ()>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            self.0
                .clone()
                .map_err(|_| LlmError::InvalidResponse("embedder down".to_string()))
        }
    }

    struct FixedStore(Vec<Passage>);

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn similarity_search(
            &self,
            _embedding: &[f32],
            k: usize,
        ) -> Result<Vec<Passage>, VectorStoreError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct RecordingLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ChatResponse, LlmError> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            match &self.reply {
                Some(r) => Ok(ChatResponse {
                    content: Some(r.clone()),
                    usage: None,
                }),
                None => Err(LlmError::Status {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    fn passage(text: &str, metadata: Option<Value>) -> Passage {
        Passage {
            text: text.to_string(),
            metadata: metadata.and_then(|m| m.as_object().cloned()),
        }
    }

    fn chain(
        embed: Result<Vec<f32>, ()>,
        passages: Vec<Passage>,
        llm: Arc<RecordingLlm>,
    ) -> RetrievalChain {
        RetrievalChain::new(
            Arc::new(FixedEmbedder(embed)),
            Arc::new(FixedStore(passages)),
            llm,
            "test-model",
        )
        .with_top_k(2)
    }

    fn llm(reply: Option<&str>) -> Arc<RecordingLlm> {
        Arc::new(RecordingLlm {
            reply: reply.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn formats_numbered_passages_with_metadata() {
        let out = format_passages(&[
            passage("Attention is all you need.", Some(json!({"title": "Transformers"}))),
            passage("CNNs for images.", None),
        ]);
        assert_eq!(
            out,
            "[Document 1]\nAttention is all you need.\nMetadata: {\"title\":\"Transformers\"}\n\n[Document 2]\nCNNs for images.\n"
        );
    }

    #[test]
    fn empty_metadata_is_not_rendered() {
        let out = format_passages(&[passage("text", Some(json!({})))]);
        assert_eq!(out, "[Document 1]\ntext\n");
    }

    #[tokio::test]
    async fn empty_search_returns_exact_sentinel() {
        let model = llm(Some("fabricated"));
        let out = chain(Ok(vec![0.1]), vec![], model.clone()).answer("q").await;
        assert_eq!(out, NOTHING_FOUND);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_returns_sentinel() {
        let out = chain(Err(()), vec![passage("p", None)], llm(Some("x")))
            .answer("q")
            .await;
        assert_eq!(out, NOTHING_FOUND);
    }

    #[tokio::test]
    async fn completion_failure_returns_sentinel() {
        let out = chain(Ok(vec![0.1]), vec![passage("p", None)], llm(None))
            .answer("q")
            .await;
        assert_eq!(out, NOTHING_FOUND);
    }

    #[tokio::test]
    async fn blank_completion_returns_sentinel() {
        let out = chain(Ok(vec![0.1]), vec![passage("p", None)], llm(Some("  \n")))
            .answer("q")
            .await;
        assert_eq!(out, NOTHING_FOUND);
    }

    #[tokio::test]
    async fn answers_from_top_k_context() {
        let model = llm(Some(" Transformers use attention. "));
        let out = chain(
            Ok(vec![0.1, 0.2]),
            vec![passage("one", None), passage("two", None), passage("three", None)],
            model.clone(),
        )
        .with_answer_language("English")
        .answer("What do transformers use?")
        .await;

        assert_eq!(out, "Transformers use attention.");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("[Document 2]\ntwo"));
        assert!(!prompts[0].contains("three"));
        assert!(prompts[0].contains("User question: What do transformers use?"));
        assert!(prompts[0].contains("Answer in English"));
    }
}
