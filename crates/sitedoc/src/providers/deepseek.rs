//! DeepSeek chat-completion client with optional retry

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::ChatProvider;
use crate::config::DeepSeekConfig;
use crate::error::{Error, Result};

/// DeepSeek API client
pub struct DeepSeekClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: DeepSeekConfig,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl DeepSeekClient {
    /// Create a client; fails without an API key
    pub fn new(config: &DeepSeekConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("DeepSeek API key is not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "DeepSeek request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.config.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::external("DeepSeek request failed")))
    }

    async fn send(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("DeepSeek request timed out: {}", e))
                } else {
                    Error::external(format!("DeepSeek request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::external(format!(
                "DeepSeek API error: HTTP {} - {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::external(format!("Failed to parse DeepSeek response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::external("No response from DeepSeek API"))
    }
}

#[async_trait]
impl ChatProvider for DeepSeekClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let started = std::time::Instant::now();
        tracing::info!(
            "Calling {} ({} prompt chars)",
            self.config.model,
            prompt.chars().count()
        );

        let result = self.retry_request(|| self.send(prompt)).await;
        match &result {
            Ok(answer) => tracing::info!(
                "DeepSeek answered in {:?} ({} chars)",
                started.elapsed(),
                answer.chars().count()
            ),
            Err(e) => tracing::warn!("DeepSeek call failed after {:?}: {}", started.elapsed(), e),
        }
        result
    }

    fn name(&self) -> &str {
        "deepseek"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn config(api_url: String) -> DeepSeekConfig {
        DeepSeekConfig {
            api_url,
            api_key: Some("sk-test".to_string()),
            timeout_secs: 5,
            ..DeepSeekConfig::default()
        }
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = DeepSeekClient::new(&DeepSeekConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_complete() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "deepseek-chat");
                assert_eq!(body["messages"][0]["role"], "user");
                assert_eq!(body["max_tokens"], 2000);
                let prompt = body["messages"][0]["content"].as_str().unwrap_or("").to_string();
                Json(json!({"choices": [{"message": {"role": "assistant", "content": format!("echo: {}", prompt)}}]}))
            }),
        );
        let client = DeepSeekClient::new(&config(serve(router).await)).unwrap();

        assert_eq!(client.complete("hello").await.unwrap(), "echo: hello");
        assert_eq!(client.name(), "deepseek");
    }

    #[tokio::test]
    async fn test_empty_choices_and_http_errors() {
        let router = Router::new()
            .route("/v1/chat/completions", post(|| async { Json(json!({"choices": []})) }))
            .route(
                "/v1/fail",
                post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
            );
        let url = serve(router).await;

        let client = DeepSeekClient::new(&config(url.clone())).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(err.to_string().contains("No response"));

        let client = DeepSeekClient::new(&config(url.replace("chat/completions", "fail"))).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
        assert!(err.to_string().contains("401"));
    }
}
