//! System and user prompt templates for the ReAct agent.

use crate::tools::{ToolKind, ToolRegistry};

use super::transcript::Transcript;

/// Stop sequence so the model leaves observations to the tools.
pub const STOP_SEQUENCE: &str = "\nObservation:";

/// Build the system prompt with tool definitions and the output grammar.
pub fn build_system_prompt(tools: &ToolRegistry, answer_language: &str) -> String {
    let tool_infos = tools.list_tools();
    let tool_names = tools.names().join(", ");

    let tool_descriptions = tool_infos
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "{}. {}: {} Input: {}",
                i + 1,
                t.name,
                t.description,
                t.input_example
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut rules = vec![
        "Use ONLY English for the labels Thought, Action, Action Input, Observation, Final Answer".to_string(),
        "Action Input must be a valid JSON string".to_string(),
        "After receiving an Observation, always continue with Thought".to_string(),
        "When you have the answer, finish with a line starting with \"Final Answer:\"".to_string(),
        format!("The content of Final Answer must be written in {}", answer_language),
        "Never write an Observation yourself; wait for the real tool result".to_string(),
        "Do not ask the user to clarify; extract as much as you can from the question".to_string(),
    ];
    if tools.lookup(ToolKind::RagQuery.name()).is_some()
        && tools.lookup(ToolKind::WebSearch.name()).is_some()
    {
        rules.push(format!(
            "First use {} to look for information; only if it finds nothing, use {}",
            ToolKind::RagQuery,
            ToolKind::WebSearch
        ));
    }
    let rules = rules
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n");

    let mut examples = Vec::new();
    if tools.lookup(ToolKind::WebSearch.name()).is_some() {
        examples.push(
            r#"Thought: The user wants current news about AI. I need to search the web.
Action: search_web_tool
Action Input: {"query": "latest artificial intelligence news"}
Observation: [search results...]
Thought: Now I can answer based on the search results.
Final Answer: Here are the latest news about artificial intelligence..."#,
        );
    }
    if tools.lookup(ToolKind::AppendToFile.name()).is_some() {
        examples.push(
            r#"Thought: The user wants to save information to a file. I should use the file tool.
Action: append_to_file_tool
Action Input: {"filepath": "data.txt", "content": "Important information"}
Observation: Appended to data.txt
Thought: The file has been saved.
Final Answer: The information was saved to data.txt"#,
        );
    }
    let examples = examples
        .iter()
        .enumerate()
        .map(|(i, e)| format!("Example {}:\n{}", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an intelligent assistant of a reading tracker, working with the ReAct (Reasoning + Acting) framework.

You MUST always follow this format exactly:

Thought: [your reasoning about what to do next]
Action: [the exact tool name, one of: [{tool_names}]]
Action Input: [the tool input as a JSON string]
Observation: [the tool result]
... (this Thought/Action/Action Input/Observation pattern repeats until you have the answer)
Thought: I now know the final answer
Final Answer: [your final answer to the user]

IMPORTANT RULES:
{rules}

Available tools:
{tool_descriptions}

{examples}

Begin!"#
    )
}

/// Build the user turn: the question followed by the scratchpad so far.
pub fn build_user_prompt(question: &str, transcript: &Transcript) -> String {
    format!(
        "Question: {}\nThought: {}",
        question.trim(),
        transcript.render_scratchpad()
    )
}
