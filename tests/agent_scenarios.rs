//! End-to-end agent runs with scripted model output and fake backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bookshelf_agent::agent::{Agent, AgentContext, StopReason, Turn, UNPARSEABLE_MESSAGE};
use bookshelf_agent::config::AgentSettings;
use bookshelf_agent::llm::{
    ChatMessage, ChatResponse, CompletionOptions, Embedder, LlmClient, LlmError, Role,
};
use bookshelf_agent::retrieval::{Passage, RetrievalChain, VectorStore, VectorStoreError};
use bookshelf_agent::tools::{
    AppendToFile, RagQuery, SearchHit, SearchProvider, ToolError, ToolKind, ToolRegistry,
    WebSearch, NOTHING_FOUND,
};

/// Agent turns come from `agent_replies`; retrieval-chain calls (no system
/// message) always get `rag_reply`.
struct ScriptedModel {
    agent_replies: Vec<String>,
    rag_reply: String,
    agent_calls: Mutex<usize>,
    rag_prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(agent_replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            agent_replies: agent_replies.iter().map(|s| s.to_string()).collect(),
            rag_reply: "Graph neural networks pass messages along edges.".to_string(),
            agent_calls: Mutex::new(0),
            rag_prompts: Mutex::new(Vec::new()),
        })
    }

    fn agent_calls(&self) -> usize {
        *self.agent_calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    async fn chat_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<ChatResponse, LlmError> {
        let content = if messages.iter().any(|m| m.role == Role::System) {
            let mut calls = self.agent_calls.lock().unwrap();
            let idx = (*calls).min(self.agent_replies.len() - 1);
            *calls += 1;
            self.agent_replies[idx].clone()
        } else {
            self.rag_prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            self.rag_reply.clone()
        };
        Ok(ChatResponse {
            content: Some(content),
            usage: None,
        })
    }
}

#[async_trait]
impl Embedder for ScriptedModel {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.1, 0.2, 0.3])
    }
}

#[derive(Default)]
struct FakeSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, _num_results: u64) -> Result<Vec<SearchHit>, ToolError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.hits.clone())
    }
}

struct FakeStore(Vec<Passage>);

#[async_trait]
impl VectorStore for FakeStore {
    async fn similarity_search(
        &self,
        _embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Passage>, VectorStoreError> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

struct Harness {
    agent: Agent,
    model: Arc<ScriptedModel>,
    search: Arc<FakeSearch>,
    data_dir: tempfile::TempDir,
}

fn harness(model: Arc<ScriptedModel>, passages: Vec<Passage>) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let search = Arc::new(FakeSearch {
        hits: vec![SearchHit {
            title: "AI weekly".to_string(),
            text: Some("New open models were released this week.".to_string()),
            url: "https://news.example/ai".to_string(),
        }],
        ..Default::default()
    });
    let chain = RetrievalChain::new(
        model.clone(),
        Arc::new(FakeStore(passages)),
        model.clone(),
        "test-model",
    );
    let tools = ToolRegistry::new()
        .with(RagQuery::new(Arc::new(chain)))
        .with(WebSearch::new(search.clone()))
        .with(AppendToFile::new(data_dir.path()));

    let agent = Agent::new(AgentContext {
        llm: model.clone(),
        tools,
        model: "test-model".to_string(),
        settings: AgentSettings::default(),
    });
    Harness {
        agent,
        model,
        search,
        data_dir,
    }
}

fn observations(turns: &[Turn]) -> Vec<&str> {
    turns
        .iter()
        .filter_map(|t| match t {
            Turn::Observation { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn news_question_uses_web_search_then_answers() {
    let model = ScriptedModel::new(&[
        "The user wants current news about AI. I need to search the web.\nAction: search_web_tool\nAction Input: {\"query\": \"last AI news\"}",
        "Thought: I now know the final answer\nFinal Answer: This week new open models were released (https://news.example/ai).",
    ]);
    let h = harness(model, vec![]);

    let outcome = h.agent.run("last AI news").await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::FinalAnswer);
    assert_eq!(
        outcome.answer,
        "This week new open models were released (https://news.example/ai)."
    );
    assert_eq!(*h.search.queries.lock().unwrap(), vec!["last AI news".to_string()]);
    assert_eq!(
        observations(outcome.transcript.turns()),
        vec!["AI weekly: New open models were released this week. — https://news.example/ai"]
    );
    assert_eq!(outcome.policy_notes.len(), 1);
}

#[tokio::test]
async fn saving_a_note_confirms_the_file() {
    let model = ScriptedModel::new(&[
        "I should write this down.\nAction: append_to_file_tool\nAction Input: {\"filepath\": \"notes.txt\", \"content\": \"Read chapter 3 of SICP\"}",
        "Final Answer: Saved to notes.txt",
    ]);
    let h = harness(model, vec![]);

    let answer = h.agent.ask("Remember that I should read chapter 3 of SICP").await;

    assert!(answer.contains("notes.txt"));
    let written = std::fs::read_to_string(h.data_dir.path().join("notes.txt")).unwrap();
    assert!(written.ends_with("Read chapter 3 of SICP\n"));
    assert!(written.starts_with('['));
}

#[tokio::test]
async fn traversal_in_filepath_stays_in_data_dir() {
    let model = ScriptedModel::new(&[
        "Action: append_to_file_tool\nAction Input: {\"filepath\": \"../../etc/passwd\", \"content\": \"x\"}",
        "Final Answer: done",
    ]);
    let h = harness(model, vec![]);

    let outcome = h.agent.run("write x").await.unwrap();

    assert_eq!(observations(outcome.transcript.turns()), vec!["Appended to passwd"]);
    assert!(h.data_dir.path().join("passwd").exists());
}

#[tokio::test]
async fn paper_question_is_answered_from_retrieval() {
    let model = ScriptedModel::new(&[
        "Thought: check the paper collection first\nAction: rag_query_tool\nAction Input: {\"query\": \"graph neural networks\"}",
        "Final Answer: They pass messages along edges.",
    ]);
    let passages = vec![Passage {
        text: "GNNs aggregate neighbour features.".to_string(),
        metadata: None,
    }];
    let h = harness(model, passages);

    let outcome = h.agent.run("How do GNNs work?").await.unwrap();

    assert_eq!(outcome.answer, "They pass messages along edges.");
    assert!(outcome.policy_notes.is_empty());
    assert_eq!(
        observations(outcome.transcript.turns()),
        vec!["Graph neural networks pass messages along edges."]
    );
    let rag_prompts = h.model.rag_prompts.lock().unwrap();
    assert_eq!(rag_prompts.len(), 1);
    assert!(rag_prompts[0].contains("GNNs aggregate neighbour features."));
}

#[tokio::test]
async fn empty_retrieval_yields_sentinel_observation() {
    let model = ScriptedModel::new(&[
        "Action: rag_query_tool\nAction Input: {\"query\": \"quantum basket weaving\"}",
        "Nothing in the papers.\nAction: search_web_tool\nAction Input: {\"query\": \"quantum basket weaving\"}",
        "Final Answer: Only a news article mentions it.",
    ]);
    let h = harness(model, vec![]);

    let outcome = h.agent.run("quantum basket weaving?").await.unwrap();

    let obs = observations(outcome.transcript.turns());
    assert_eq!(obs[0], NOTHING_FOUND);
    assert!(h.model.rag_prompts.lock().unwrap().is_empty());
    assert!(outcome.policy_notes.is_empty());
    assert!(outcome.transcript.has_called(ToolKind::WebSearch));
}

#[tokio::test]
async fn budget_exhaustion_still_answers() {
    let model = ScriptedModel::new(&[
        "Let me search again.\nAction: search_web_tool\nAction Input: {\"query\": \"more\"}",
    ]);
    let h = harness(model, vec![]);

    let outcome = h.agent.run("never ending").await.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::IterationLimit);
    assert_eq!(h.model.agent_calls(), 7);
    assert!(!outcome.answer.trim().is_empty());
    assert!(outcome.answer.contains("https://news.example/ai"));
}

#[tokio::test]
async fn garbage_output_always_terminates() {
    let model = ScriptedModel::new(&["I refuse to use the format."]);
    let h = harness(model, vec![]);

    let answer = h.agent.ask("anything").await;

    assert_eq!(answer, UNPARSEABLE_MESSAGE);
    assert!(h.model.agent_calls() <= 7);
}

#[tokio::test]
async fn unknown_tool_is_corrected_by_model() {
    let model = ScriptedModel::new(&[
        "Action: google\nAction Input: {\"query\": \"rust\"}",
        "Action: search_web_tool\nAction Input: {\"query\": \"rust\"}",
        "Final Answer: Found it.",
    ]);
    let h = harness(model, vec![]);

    let outcome = h.agent.run("rust news").await.unwrap();

    assert_eq!(outcome.answer, "Found it.");
    assert!(matches!(
        &outcome.transcript.turns()[0],
        Turn::Rejected { error, .. } if error.starts_with("google is not a valid tool")
    ));
}
