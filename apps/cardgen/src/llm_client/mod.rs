/// LLM Client: the single point of entry for chat-completion calls.
///
/// Talks to any OpenAI-compatible `/chat/completions` endpoint. Retrying is
/// not done here: the generation orchestrator owns the retry loop because it
/// also retries on unusable content, not only on transport failures.
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::CardError;

pub mod prompts;

pub const DEFAULT_MAX_TOKENS: u32 = 2000;

// ────────────────────────────────────────────────────────────────────────────
// Provider seam
// ────────────────────────────────────────────────────────────────────────────

/// One chat-completion request: a system prompt, a user prompt and an output budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Anything that can turn a prompt into the model's raw text reply.
///
/// Errors must already be classified: transport trouble as `NetworkOrTimeout`,
/// refusals as `Provider`, malformed envelopes as `Unparseable`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CardError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            frequency_penalty: 0.5,
            presence_penalty: 0.5,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if the provider sent any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Error envelopes differ between providers; accept the common shapes.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderErrorDetail>,
    msg: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

impl ProviderErrorBody {
    fn into_message(self) -> Option<String> {
        self.error.map(|e| e.message).or(self.msg).or(self.message)
    }
}

fn provider_message(body: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(ProviderErrorBody::into_message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "unknown error".to_string()
            } else {
                body.to_string()
            }
        })
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    sampling: Sampling,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            sampling: Sampling::default(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.llm_base_url,
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_timeout(),
        )
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.sampling.temperature,
            max_tokens: request.max_tokens,
            top_p: self.sampling.top_p,
            frequency_penalty: self.sampling.frequency_penalty,
            presence_penalty: self.sampling.presence_penalty,
        }
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CardError> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = provider_message(&text);
            warn!(status = status.as_u16(), %message, "chat completion request failed");

            if status.as_u16() == 429 || status.is_server_error() {
                return Err(CardError::NetworkOrTimeout(format!(
                    "provider returned {status}: {message}"
                )));
            }
            return Err(CardError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;
        if let Some(usage) = &chat.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion succeeded"
            );
        }

        chat.text()
            .map(str::to_string)
            .ok_or_else(|| CardError::unparseable("response has no choices[0].message.content"))
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub(crate) fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LlmClient {
        LlmClient::new(
            "https://llm.example.com/v1/",
            "sk-test".to_string(),
            "test-model".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"title\": \"t\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"title\": \"t\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"title\": \"t\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"title\": \"t\"}");
    }

    #[test]
    fn test_strip_json_fences_unterminated_fence() {
        let input = "```json\n{\"title\": \"t\"";
        assert_eq!(strip_json_fences(input), "{\"title\": \"t\"");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"title\": \"t\"}  ";
        assert_eq!(strip_json_fences(input), "{\"title\": \"t\"}");
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(client().endpoint(), "https://llm.example.com/v1/chat/completions");
    }

    #[test]
    fn test_request_body_carries_sampling_and_budget() {
        let client = client();
        let request = CompletionRequest {
            system: "sys".to_string(),
            user: "usr".to_string(),
            max_tokens: 2500,
        };
        let value = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(value["model"], "test-model");
        assert_eq!(value["max_tokens"], 2500);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
        assert!((value["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!((value["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!((value["presence_penalty"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_response_text_from_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],
                       "usage":{"prompt_tokens":10,"completion_tokens":3}}"#;
        let chat: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(chat.text(), Some("hello"));
    }

    #[test]
    fn test_response_without_content_has_no_text() {
        let chat: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(chat.text(), None);
        let chat: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert_eq!(chat.text(), None);
    }

    #[test]
    fn test_provider_message_shapes() {
        assert_eq!(provider_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(provider_message(r#"{"msg":"quota"}"#), "quota");
        assert_eq!(provider_message("plain failure"), "plain failure");
        assert_eq!(provider_message(""), "unknown error");
    }
}
