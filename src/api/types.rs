//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::agent::{StopReason, Turn};

/// Request to ask the agent a question.
///
/// The chat widget of the reading tracker sends `{"message": ...}`, so that
/// name is accepted as well.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    /// The user's question
    #[serde(alias = "message")]
    pub query: String,
}

/// Reply on `POST /ask`, the chat widget's endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
}

/// Outcome of an `/api/ask` call.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    /// Final answer, best-available answer, or error text
    pub answer: String,

    pub status: AskStatus,

    /// Why the loop stopped; absent when the invocation failed
    pub stop_reason: Option<StopReason>,

    /// Number of model calls made
    pub iterations: usize,

    /// Detailed execution log
    pub log: Vec<TaskLogEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AskStatus {
    /// The loop ran to a stop state
    Completed,
    /// The invocation failed before producing an answer
    Failed,
}

/// A single entry in the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct TaskLogEntry {
    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Entry type
    pub entry_type: LogEntryType,

    /// Content of the entry
    pub content: String,
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Agent is thinking / planning
    Thinking,
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Agent produced final response
    Response,
    /// An error occurred
    Error,
}

impl TaskLogEntry {
    fn new(timestamp: &str, entry_type: LogEntryType, content: String) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            entry_type,
            content,
        }
    }

    /// Flatten transcript turns into log entries stamped with `timestamp`.
    pub fn from_turns(turns: &[Turn], timestamp: &str) -> Vec<Self> {
        turns
            .iter()
            .map(|turn| match turn {
                Turn::Thought { text } => Self::new(timestamp, LogEntryType::Thinking, text.clone()),
                Turn::Action { tool, input } => Self::new(
                    timestamp,
                    LogEntryType::ToolCall,
                    format!("{}: {}", tool, input),
                ),
                Turn::Observation { text, ok: true } => {
                    Self::new(timestamp, LogEntryType::ToolResult, text.clone())
                }
                Turn::Observation { text, ok: false } => {
                    Self::new(timestamp, LogEntryType::Error, text.clone())
                }
                Turn::Rejected { error, .. } => {
                    Self::new(timestamp, LogEntryType::Error, error.clone())
                }
                Turn::FinalAnswer { text } => {
                    Self::new(timestamp, LogEntryType::Response, text.clone())
                }
            })
            .collect()
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
