//! Agent module - the ReAct question-answering loop.
//!
//! The agent alternates model calls and tool calls:
//! 1. Send the system prompt and the question with the scratchpad so far
//! 2. Parse the completion into an action or a final answer
//! 3. Run the requested tool and append its observation
//! 4. Repeat until a final answer or the iteration budget runs out

mod agent_loop;
mod parser;
mod prompt;
mod transcript;

pub use agent_loop::{
    Agent, AgentContext, AgentError, AgentOutcome, StopReason, STOPPED_MESSAGE, UNPARSEABLE_MESSAGE,
};
pub use parser::{parse_output, ParseError, ParsedOutput, ToolRequest};
pub use prompt::{build_system_prompt, build_user_prompt, STOP_SEQUENCE};
pub use transcript::{Transcript, Turn};
