//! Retrieval tool over the indexed paper collection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{parse_query_args, Tool, ToolError, ToolKind};
use crate::retrieval::RetrievalChain;

/// Answer a question from the vector store.
pub struct RagQuery {
    chain: Arc<RetrievalChain>,
}

impl RagQuery {
    pub fn new(chain: Arc<RetrievalChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Tool for RagQuery {
    fn kind(&self) -> ToolKind {
        ToolKind::RagQuery
    }

    fn description(&self) -> &str {
        "Look up the answer in the indexed collection of scientific papers. Try this first for any information-seeking question."
    }

    fn input_example(&self) -> Value {
        json!({ "query": "search query" })
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let args = parse_query_args(input)?;
        Ok(self.chain.answer(&args.query).await)
    }
}
