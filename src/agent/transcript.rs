//! Per-invocation turn history.

use serde::Serialize;

use crate::tools::{ToolKind, NOTHING_FOUND};

/// One turn of the ReAct transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    Thought { text: String },
    Action { tool: ToolKind, input: String },
    Observation { text: String, ok: bool },
    /// Model output that did not parse, with the feedback sent back.
    Rejected { output: String, error: String },
    FinalAnswer { text: String },
}

/// Append-only turn history owned by a single `ask` call.
///
/// Observations are only recorded together with the action that produced
/// them, so an `Observation` always directly follows an `Action`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Record a dispatched action and what it returned.
    pub fn push_step(
        &mut self,
        thought: String,
        tool: ToolKind,
        input: String,
        observation: String,
        ok: bool,
    ) {
        if !thought.is_empty() {
            self.turns.push(Turn::Thought { text: thought });
        }
        self.turns.push(Turn::Action { tool, input });
        self.turns.push(Turn::Observation {
            text: observation,
            ok,
        });
    }

    /// Record output that failed to parse. Anything from an observation
    /// the model wrote itself onwards is dropped, since no tool produced it.
    pub fn push_rejected(&mut self, output: &str, error: String) {
        self.turns.push(Turn::Rejected {
            output: without_invented_observation(output).to_string(),
            error,
        });
    }

    pub fn push_final(&mut self, thought: String, answer: String) {
        if !thought.is_empty() {
            self.turns.push(Turn::Thought { text: thought });
        }
        self.turns.push(Turn::FinalAnswer { text: answer });
    }

    /// Whether `kind` has been dispatched earlier in this invocation.
    pub fn has_called(&self, kind: ToolKind) -> bool {
        self.turns
            .iter()
            .any(|t| matches!(t, Turn::Action { tool, .. } if *tool == kind))
    }

    /// Most recent successful observation that carries actual content.
    pub fn last_useful_observation(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::Observation { text, ok: true } if text.trim() != NOTHING_FOUND => {
                Some(text.as_str())
            }
            _ => None,
        })
    }

    /// Render the scratchpad that follows `Thought: ` in the user prompt.
    pub fn render_scratchpad(&self) -> String {
        let mut out = String::new();
        let mut pending_thought: Option<&str> = None;

        for turn in &self.turns {
            match turn {
                Turn::Thought { text } => pending_thought = Some(text),
                Turn::Action { tool, input } => {
                    if let Some(thought) = pending_thought.take() {
                        out.push_str(thought);
                        out.push('\n');
                    }
                    out.push_str(&format!("Action: {}\nAction Input: {}\n", tool, input));
                }
                Turn::Observation { text, .. } => {
                    out.push_str(&format!("Observation: {}\nThought: ", text));
                }
                Turn::Rejected { output, error } => {
                    out.push_str(&format!("{}\nObservation: {}\nThought: ", output.trim(), error));
                }
                Turn::FinalAnswer { .. } => {}
            }
        }
        out
    }
}

fn without_invented_observation(output: &str) -> &str {
    let head = match output.find("\nObservation:") {
        Some(idx) => &output[..idx],
        None => output,
    };
    if head.trim_start().starts_with("Observation:") {
        ""
    } else {
        head
    }
}
