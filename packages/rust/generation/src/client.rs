//! Chat request model and the OpenAI-compatible HTTP client.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use orgenrich_shared::{EnrichError, Result};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("orgenrich/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to keep in the error message.
const ERROR_BODY_LIMIT: usize = 300;

// ---------------------------------------------------------------------------
// Request model
// ---------------------------------------------------------------------------

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The message exchange sent for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Instruction message (omitted when blank) followed by the rendered request.
    pub fn new(instruction: &str, request: impl Into<String>) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !instruction.trim().is_empty() {
            messages.push(ChatMessage {
                role: Role::System,
                content: instruction.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: Role::User,
            content: request.into(),
        });
        Self { messages }
    }
}

/// A single attempt against the generation service.
///
/// Implementations do not retry; see [`crate::generate_with_retry`].
pub trait Generator {
    /// Send `request` and return the raw message content.
    fn complete(&self, request: &ChatRequest) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Settings for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    pub api_key: String,
    pub model: String,
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Chat-completions client constrained to JSON-object responses.
pub struct OpenAiClient {
    client: Client,
    options: OpenAiOptions,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(options: OpenAiOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/chat/completions",
            options.base_url.trim_end_matches('/')
        );

        Ok(Self {
            client,
            options,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }
}

impl Generator for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.options.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = CompletionBody {
            model: &self.options.model,
            messages: &request.messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.options.temperature,
        };

        debug!(endpoint = %self.endpoint, messages = request.messages.len(), "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.options.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EnrichError::Generation(format!(
                "HTTP {status}: {}",
                truncate(&text, ERROR_BODY_LIMIT)
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Generation(format!("invalid completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EnrichError::Generation("completion had no message content".into()))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(base_url: String) -> OpenAiOptions {
        OpenAiOptions {
            api_key: "sk-test".into(),
            model: "gpt-4o".into(),
            base_url,
            temperature: 0.2,
            timeout: Duration::from_secs(5),
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn request_with_instruction_has_two_messages() {
        let req = ChatRequest::new("Classify.", "Acme at acme.com");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.messages[1].content, "Acme at acme.com");
    }

    #[test]
    fn blank_instruction_is_omitted() {
        let req = ChatRequest::new("  ", "only the request");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn body_serializes_json_object_format() {
        let req = ChatRequest::new("sys", "user");
        let body = CompletionBody {
            model: "gpt-4o",
            messages: &req.messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.2,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "user");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 100), "short");
    }

    #[tokio::test]
    async fn returns_message_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "response_format": {"type": "json_object"},
                "messages": [
                    {"role": "system", "content": "Classify."},
                    {"role": "user", "content": "Acme at acme.com"}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(r#"{"main_industry":"Software"}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(options(server.uri())).unwrap();
        let text = client
            .complete(&ChatRequest::new("Classify.", "Acme at acme.com"))
            .await
            .unwrap();
        assert_eq!(text, r#"{"main_industry":"Software"}"#);
    }

    #[tokio::test]
    async fn rate_limit_is_a_retryable_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(options(server.uri())).unwrap();
        let err = client
            .complete(&ChatRequest::new("", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(options(server.uri())).unwrap();
        let err = client
            .complete(&ChatRequest::new("", "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no message content"));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"afi_score":1}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(options(server.uri())).unwrap();
        let text = crate::generate_with_retry(
            &client,
            &crate::RetryPolicy::immediate(3),
            &ChatRequest::new("", "hi"),
            "Acme",
            &orgenrich_shared::RunLog::discard(),
        )
        .await
        .unwrap();
        assert_eq!(text, r#"{"afi_score":1}"#);
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(options(format!("{}/", server.uri()))).unwrap();
        assert_eq!(client.complete(&ChatRequest::new("", "hi")).await.unwrap(), "{}");
    }
}
