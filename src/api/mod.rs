//! HTTP API for the agent.
//!
//! ## Endpoints
//!
//! - `POST /api/ask` - Ask a question and wait for the answer
//! - `POST /ask` - Chat widget endpoint, `{"message"}` in, `{"response"}` out
//! - `GET /api/health` - Health check

mod routes;
pub mod types;

pub use routes::{routes, serve, AppState};
