//! # Bookshelf Agent
//!
//! Question-answering assistant for a reading tracker.
//!
//! This library provides:
//! - A ReAct agent loop over an OpenAI-compatible chat endpoint
//! - Tools for paper retrieval, web search and note files
//! - An HTTP API for asking questions
//!
//! ## Architecture
//!
//! The agent follows the ReAct pattern:
//! 1. Receive a question via the API or [`agent::Agent::ask`]
//! 2. Prompt the model with the tool list and the output grammar
//! 3. Parse `Action` / `Action Input`, run the tool, append the `Observation`
//! 4. Repeat until the model writes a `Final Answer` or the budget runs out
//!
//! ## Example
//!
//! ```rust,ignore
//! use bookshelf_agent::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Agent::from_config(&config)?;
//! let answer = agent.ask("What is new in graph neural networks?").await;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod retrieval;
pub mod tools;

pub use config::Config;
