//! Core ReAct loop.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AgentSettings, Config};
use crate::llm::{
    ChatMessage, CompletionOptions, LlmClient, LlmError, OpenAiCompatibleClient, TokenUsage,
};
use crate::retrieval::{ChromaVectorStore, RetrievalChain};
use crate::tools::{
    AppendToFile, ExaSearchProvider, RagQuery, ToolKind, ToolRegistry, WebSearch,
};

use super::parser::{parse_output, ParsedOutput, ToolRequest};
use super::prompt::{build_system_prompt, build_user_prompt, STOP_SEQUENCE};
use super::transcript::Transcript;

/// Returned when the iteration budget ran out with nothing better to offer.
pub const STOPPED_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

/// Returned when the model kept breaking the output format.
pub const UNPARSEABLE_MESSAGE: &str =
    "Agent stopped because the model repeatedly produced output in an invalid format.";

/// Why an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a `Final Answer`.
    FinalAnswer,
    /// `max_iterations` model calls were used up.
    IterationLimit,
    /// Too many outputs failed to parse.
    ParseErrorsExhausted,
}

/// Errors that end an invocation without any answer.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("the question is empty")]
    EmptyQuery,

    #[error("language model call failed: {0}")]
    Llm(#[from] LlmError),
}

/// Result of one `run`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub answer: String,
    pub stop_reason: StopReason,
    /// Model calls made
    pub iterations: usize,
    /// Tokens reported by the provider across all agent turns
    pub usage: TokenUsage,
    pub transcript: Transcript,
    /// Soft-policy deviations worth logging (tool precedence)
    pub policy_notes: Vec<String>,
}

/// Everything one agent needs, passed in explicitly.
pub struct AgentContext {
    pub llm: Arc<dyn LlmClient>,
    pub tools: ToolRegistry,
    pub model: String,
    pub settings: AgentSettings,
}

enum LoopState {
    AwaitingModelOutput,
    Parsing(String),
    DispatchingTool { thought: String, request: ToolRequest },
    Terminated { reason: StopReason, answer: String },
}

/// The ReAct agent.
pub struct Agent {
    ctx: AgentContext,
    system_prompt: String,
}

impl Agent {
    pub fn new(ctx: AgentContext) -> Self {
        let system_prompt = build_system_prompt(&ctx.tools, &ctx.settings.answer_language);
        Self { ctx, system_prompt }
    }

    /// Wire the hosted clients and all three tools from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let timeout = config.llm.timeout;
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::for_chat(&config.llm)?);

        let embedder = Arc::new(OpenAiCompatibleClient::for_embeddings(
            &config.retrieval,
            timeout,
        )?);
        let store = Arc::new(ChromaVectorStore::new(
            &config.retrieval.chroma_url,
            &config.retrieval.collection,
            timeout,
        )?);
        let chain = RetrievalChain::new(embedder, store, llm.clone(), &config.llm.model)
            .with_top_k(config.retrieval.top_k)
            .with_answer_language(&config.agent.answer_language);

        let search = ExaSearchProvider::new(config.exa_api_key.clone(), timeout)?;
        if config.exa_api_key.is_none() {
            tracing::warn!("EXA_API_KEY not set; web search will report nothing found");
        }

        let tools = ToolRegistry::new()
            .with(RagQuery::new(Arc::new(chain)))
            .with(WebSearch::new(Arc::new(search)))
            .with(AppendToFile::new(&config.data_dir));

        Ok(Self::new(AgentContext {
            llm,
            tools,
            model: config.llm.model.clone(),
            settings: config.agent.clone(),
        }))
    }

    /// Answer a question. Never fails: errors come back as text.
    pub async fn ask(&self, query: &str) -> String {
        match self.run(query).await {
            Ok(outcome) => outcome.answer,
            Err(e) => {
                tracing::error!("agent invocation failed: {}", e);
                format!("Execution error: {}", e)
            }
        }
    }

    /// Run the loop and return the answer together with the transcript.
    pub async fn run(&self, query: &str) -> Result<AgentOutcome, AgentError> {
        let span = tracing::info_span!("ask", invocation_id = %Uuid::new_v4());
        self.run_loop(query).instrument(span).await
    }

    async fn run_loop(&self, query: &str) -> Result<AgentOutcome, AgentError> {
        if query.trim().is_empty() {
            return Err(AgentError::EmptyQuery);
        }
        tracing::info!(query, "agent invocation started");

        let settings = &self.ctx.settings;
        let options = CompletionOptions {
            stop: vec![STOP_SEQUENCE.to_string()],
            temperature: settings.temperature,
        };

        let mut transcript = Transcript::new();
        let mut iterations = 0usize;
        let mut parse_failures = 0usize;
        let mut usage = TokenUsage::default();
        let mut policy_notes = Vec::new();
        let mut state = LoopState::AwaitingModelOutput;

        loop {
            state = match state {
                LoopState::AwaitingModelOutput => {
                    if iterations >= settings.max_iterations {
                        tracing::warn!(iterations, "iteration limit reached");
                        LoopState::Terminated {
                            reason: StopReason::IterationLimit,
                            answer: best_available_answer(&transcript, STOPPED_MESSAGE),
                        }
                    } else {
                        iterations += 1;
                        tracing::debug!("Agent iteration {}", iterations);

                        let messages = [
                            ChatMessage::system(self.system_prompt.as_str()),
                            ChatMessage::user(build_user_prompt(query, &transcript)),
                        ];
                        let response = self
                            .ctx
                            .llm
                            .chat_completion(&self.ctx.model, &messages, &options)
                            .await?;
                        if let Some(turn_usage) = response.usage {
                            tracing::debug!(
                                prompt_tokens = turn_usage.prompt_tokens,
                                completion_tokens = turn_usage.completion_tokens,
                                "model usage"
                            );
                            usage.prompt_tokens += turn_usage.prompt_tokens;
                            usage.completion_tokens += turn_usage.completion_tokens;
                        }
                        LoopState::Parsing(response.content.unwrap_or_default())
                    }
                }

                LoopState::Parsing(output) => match parse_output(&output, &self.ctx.tools) {
                    Ok(ParsedOutput::FinalAnswer { thought, answer }) => {
                        transcript.push_final(thought, answer.clone());
                        LoopState::Terminated {
                            reason: StopReason::FinalAnswer,
                            answer,
                        }
                    }
                    Ok(ParsedOutput::Action { thought, request }) => {
                        LoopState::DispatchingTool { thought, request }
                    }
                    Err(e) => {
                        parse_failures += 1;
                        tracing::warn!(parse_failures, "unparseable model output: {}", e);
                        transcript.push_rejected(&output, e.to_string());
                        if parse_failures > settings.max_parse_recoveries {
                            LoopState::Terminated {
                                reason: StopReason::ParseErrorsExhausted,
                                answer: best_available_answer(&transcript, UNPARSEABLE_MESSAGE),
                            }
                        } else {
                            LoopState::AwaitingModelOutput
                        }
                    }
                },

                LoopState::DispatchingTool { thought, request } => {
                    if let Some(note) = precedence_note(&self.ctx.tools, &transcript, &request) {
                        tracing::warn!("{}", note);
                        policy_notes.push(note);
                    }

                    tracing::info!(tool = %request.tool, input = %request.input, "calling tool");
                    let (observation, ok) =
                        match self.ctx.tools.execute(request.tool, &request.input).await {
                            Ok(text) => (text, true),
                            Err(e) => {
                                tracing::warn!(tool = %request.tool, "tool failed: {}", e);
                                (format!("Tool error: {}", e), false)
                            }
                        };
                    tracing::debug!(tool = %request.tool, result = %truncate_for_log(&observation, 500), "tool result");

                    transcript.push_step(thought, request.tool, request.input, observation, ok);
                    LoopState::AwaitingModelOutput
                }

                LoopState::Terminated { reason, answer } => {
                    tracing::info!(
                        ?reason,
                        iterations,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "agent invocation finished"
                    );
                    return Ok(AgentOutcome {
                        answer,
                        stop_reason: reason,
                        iterations,
                        usage,
                        transcript,
                        policy_notes,
                    });
                }
            };
        }
    }
}

/// Web search before any retrieval attempt goes against the prompt's advice.
fn precedence_note(
    tools: &ToolRegistry,
    transcript: &Transcript,
    request: &ToolRequest,
) -> Option<String> {
    let rag_available = tools.get(ToolKind::RagQuery).is_some();
    (request.tool == ToolKind::WebSearch
        && rag_available
        && !transcript.has_called(ToolKind::RagQuery))
    .then(|| {
        format!(
            "{} called before {}",
            ToolKind::WebSearch,
            ToolKind::RagQuery
        )
    })
}

/// What a forced stop hands back instead of a final answer.
fn best_available_answer(transcript: &Transcript, fallback: &str) -> String {
    match transcript.last_useful_observation() {
        Some(observation) => format!(
            "No final answer was reached; most recent tool result:\n{}",
            observation
        ),
        None => fallback.to_string(),
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}... [truncated]", head)
    }
}
