//! Coze streaming workflow client
//!
//! `stream_run` answers with a server-sent event body:
//!
//! ```text
//! id: 0
//! event: Message
//! data: {"content": "...", "node_title": "End", ...}
//!
//! event: Error
//! data: {"error_code": 4200, "error_message": "..."}
//! ```

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::config::CozeConfig;
use crate::error::{Error, Result};

/// Collected `Message` events of one workflow run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    /// `content` of the last message
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    pub messages: Vec<Value>,
}

/// Parse a workflow SSE body
pub fn parse_workflow_stream(body: &str) -> Result<WorkflowOutput> {
    let mut event = String::new();
    let mut messages = Vec::new();

    for line in body.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim().to_string();
            continue;
        }
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            continue;
        };
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping unparsable workflow event data ({}): {}", e, data);
                continue;
            }
        };

        match event.as_str() {
            "Message" => messages.push(value),
            "Error" => {
                let code = value.get("error_code").cloned().unwrap_or(Value::Null);
                let message = value
                    .get("error_message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown workflow error");
                return Err(Error::external(format!(
                    "Coze workflow error {}: {}",
                    code, message
                )));
            }
            _ => {}
        }
    }

    let last = messages
        .last()
        .cloned()
        .ok_or_else(|| Error::external("Coze workflow returned no Message event"))?;

    Ok(WorkflowOutput {
        content: last
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        node_title: last.get("node_title").and_then(Value::as_str).map(str::to_string),
        usage: last.get("usage").cloned(),
        messages,
    })
}

/// Coze workflow API client
pub struct CozeClient {
    client: Client,
    config: CozeConfig,
    token: String,
}

impl CozeClient {
    /// Create a client; fails without a token or workflow id
    pub fn new(config: &CozeConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("Coze token is not configured".to_string()))?;
        if config.workflow_id.trim().is_empty() {
            return Err(Error::Config("Coze workflow id is not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            token,
        })
    }

    /// Run the configured workflow with `parameters`
    pub async fn run_workflow(&self, parameters: Value) -> Result<WorkflowOutput> {
        let started = Instant::now();
        tracing::info!("Running Coze workflow {}", self.config.workflow_id);

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.token)
            .json(&json!({
                "workflow_id": self.config.workflow_id,
                "parameters": parameters,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Coze workflow timed out: {}", e))
                } else {
                    Error::external(format!("Coze request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::external(format!(
                "Coze API error: HTTP {} - {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::external(format!("Failed to read Coze stream: {}", e)))?;
        let result = parse_workflow_stream(&body);

        match &result {
            Ok(output) => tracing::info!(
                "Coze workflow finished in {:?} ({} messages)",
                started.elapsed(),
                output.messages.len()
            ),
            Err(e) => tracing::warn!("Coze workflow failed after {:?}: {}", started.elapsed(), e),
        }
        result
    }

    /// Run the document workflow on one file URL
    pub async fn analyze_document(&self, file_url: &str, table_summary: &str) -> Result<WorkflowOutput> {
        self.run_workflow(json!({
            "bit1": 0,
            "docx": file_url,
            "table_summary": table_summary,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    #[test]
    fn test_last_message_wins() {
        let body = "id: 0\nevent: Message\ndata: {\"content\": \"part\", \"node_title\": \"A\"}\n\n\
                    id: 1\nevent: Message\ndata: {\"content\": \"final\", \"node_title\": \"End\", \"usage\": {\"token_count\": 9}}\n\n\
                    id: 2\nevent: Done\ndata: {}\n";
        let output = parse_workflow_stream(body).unwrap();
        assert_eq!(output.content, "final");
        assert_eq!(output.node_title.as_deref(), Some("End"));
        assert_eq!(output.usage.unwrap()["token_count"], 9);
        assert_eq!(output.messages.len(), 2);
    }

    #[test]
    fn test_error_event() {
        let body = "event: Error\ndata: {\"error_code\": 4200, \"error_message\": \"workflow not published\"}\n";
        let err = parse_workflow_stream(body).unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
        assert!(err.to_string().contains("4200"));
        assert!(err.to_string().contains("workflow not published"));
    }

    #[test]
    fn test_no_message() {
        assert!(parse_workflow_stream("event: Done\ndata: [DONE]\n").is_err());
        assert!(parse_workflow_stream("").is_err());
    }

    #[test]
    fn test_requires_token_and_workflow() {
        assert!(matches!(CozeClient::new(&CozeConfig::default()), Err(Error::Config(_))));
        let config = CozeConfig {
            token: Some("pat".into()),
            ..CozeConfig::default()
        };
        assert!(matches!(CozeClient::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_run_workflow() {
        let router = Router::new().route(
            "/v1/workflow/stream_run",
            post(|Json(body): Json<Value>| async move {
                format!(
                    "event: Message\ndata: {}\n\n",
                    json!({"content": format!("{} {}", body["workflow_id"].as_str().unwrap_or(""), body["parameters"]["docx"].as_str().unwrap_or(""))})
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = CozeClient::new(&CozeConfig {
            api_url: format!("http://{}/v1/workflow/stream_run", addr),
            token: Some("pat".into()),
            workflow_id: "wf1".into(),
            timeout_secs: 5,
        })
        .unwrap();
        let output = client
            .analyze_document("http://files/a.docx", "summary")
            .await
            .unwrap();
        assert_eq!(output.content, "wf1 http://files/a.docx");
    }
}
