//! OpenAI-compatible chat completions client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use docket_ai::{AiError, ChatMessage, TextGenerator};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for the chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API root, without the `/chat/completions` suffix
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl core::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Request body for chat completions (OpenAI format).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// Response: choices[0].message.content.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`TextGenerator`] backed by an OpenAI-compatible HTTP API.
///
/// One instance is shared by all workers; `reqwest::Client` pools connections
/// internally.
#[derive(Debug, Clone)]
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiTextGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::request(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenAiTextGenerator {
    #[instrument(skip(self, messages), fields(model = %self.config.model), err)]
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };

        let res = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::request(e.to_string()))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| AiError::request(e.to_string()))?;
        if !status.is_success() {
            return Err(AiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = parse_completion(&text)?;
        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }
}

/// Extract `choices[0].message.content`, trimmed.
fn parse_completion(body: &str) -> Result<String, AiError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| AiError::decode(format!("{e}; body: {body}")))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"  - A\n- B \n"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "- A\n- B");
    }

    #[test]
    fn missing_or_blank_content_is_empty_response() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
            r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#,
        ] {
            assert_eq!(parse_completion(body).unwrap_err(), AiError::EmptyResponse);
        }
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(parse_completion("<html>"), Err(AiError::Decode(_))));
    }

    #[test]
    fn request_uses_openai_role_tags() {
        let messages = [ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-4",
            messages: &messages,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn completions_url_tolerates_trailing_slash() {
        let config = OpenAiConfig::new("k").with_base_url("http://localhost:9000/v1/");
        assert_eq!(config.completions_url(), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let config = OpenAiConfig::new("sk-secret");
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_request_error() {
        let generator = OpenAiTextGenerator::new(
            OpenAiConfig::new("k")
                .with_base_url("http://127.0.0.1:9")
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = generator.generate(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, AiError::Request(_)), "{err:?}");
    }
}
