//! External AI services
//!
//! Implementations:
//! - `DeepSeekClient`: chat completions used for analysis and error detection
//! - `CozeClient`: streaming workflow runs over uploaded documents

mod coze;
mod deepseek;
mod prompt;

pub use coze::{parse_workflow_stream, CozeClient, WorkflowOutput};
pub use deepseek::DeepSeekClient;
pub use prompt::{PromptBuilder, ANALYSIS_CONTENT_LIMIT, DETECTION_CONTENT_LIMIT};

use async_trait::async_trait;

use crate::error::Result;

/// A service that answers a single prompt with text
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send `prompt` and return the model's answer
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model being used
    fn model(&self) -> &str;
}
