//! Parser for the `Thought / Action / Action Input / Final Answer` grammar.

use thiserror::Error;

use crate::tools::{ToolKind, ToolRegistry};

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";
const THOUGHT: &str = "Thought:";

/// Model output that does not fit the grammar. Always recoverable: the
/// message is sent back to the model as an observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid Format: the response was empty")]
    EmptyOutput,

    #[error("Invalid Format: Missing 'Action:' after 'Thought:'")]
    MissingAction,

    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,

    #[error("Invalid Format: the response contains both a final answer and an action; give only one of them")]
    FinalAnswerWithAction,

    #[error("{name} is not a valid tool, try one of [{}].", .known.join(", "))]
    UnknownTool { name: String, known: Vec<String> },
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub tool: ToolKind,
    pub input: String,
}

/// One parsed model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    Action { thought: String, request: ToolRequest },
    FinalAnswer { thought: String, answer: String },
}

/// Parse one completion against the tools in `registry`.
pub fn parse_output(raw: &str, registry: &ToolRegistry) -> Result<ParsedOutput, ParseError> {
    let text = cut_invented_observation(raw).trim();
    if text.is_empty() {
        return Err(ParseError::EmptyOutput);
    }

    let action_at = find_action_label(text);
    let final_at = text.find(FINAL_ANSWER);

    match (action_at, final_at) {
        (Some(a), Some(_)) if text[a..].contains(ACTION_INPUT) => {
            Err(ParseError::FinalAnswerWithAction)
        }
        (_, Some(f)) => Ok(ParsedOutput::FinalAnswer {
            thought: clean_thought(&text[..f]),
            answer: text[f + FINAL_ANSWER.len()..].trim().to_string(),
        }),
        (None, None) => Err(ParseError::MissingAction),
        (Some(a), None) => {
            let thought = clean_thought(&text[..a]);
            let after_action = &text[a + ACTION.len()..];
            let input_at = after_action
                .find(ACTION_INPUT)
                .ok_or(ParseError::MissingActionInput)?;

            let name = clean_tool_name(&after_action[..input_at]);
            let input = clean_input(&after_action[input_at + ACTION_INPUT.len()..]);

            let tool = registry.lookup(&name).ok_or_else(|| ParseError::UnknownTool {
                name: name.clone(),
                known: registry.names().into_iter().map(str::to_string).collect(),
            })?;

            Ok(ParsedOutput::Action {
                thought,
                request: ToolRequest { tool, input },
            })
        }
    }
}

/// An observation written after `Action Input:` is the model imagining the
/// tool result; the action itself is still valid. Elsewhere (e.g. inside a
/// final answer) the text is left alone.
fn cut_invented_observation(raw: &str) -> &str {
    let Some(input_at) = raw.find(ACTION_INPUT) else {
        return raw;
    };
    match raw[input_at..].find(&format!("\n{}", OBSERVATION)) {
        Some(rel) => &raw[..input_at + rel],
        None => raw,
    }
}

/// Position of an `Action:` label that is not part of `Action Input:`.
fn find_action_label(text: &str) -> Option<usize> {
    text.match_indices(ACTION)
        .map(|(i, _)| i)
        .find(|&i| !text[..i].ends_with(char::is_alphanumeric))
}

fn clean_thought(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix(THOUGHT)
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Models like to decorate tool names with markdown or quotes.
fn clean_tool_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '*' | '`' | '"' | '\'' | '[' | ']'))
        .trim()
        .to_string()
}

fn clean_input(raw: &str) -> String {
    let mut input = raw.trim();

    if let Some(rest) = input.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        input = rest.strip_suffix("```").unwrap_or(rest).trim();
    }

    if input.len() >= 2 && input.starts_with('"') && input.ends_with('"') {
        let inner = &input[1..input.len() - 1];
        if !inner.contains('"') {
            input = inner;
        }
    }

    input.to_string()
}
