//! Reasoning-service providers.
//!
//! Each provider sends one prompt and unwraps its own response envelope into
//! plain text. No retries happen here: one call per `infer`.

use super::error::ServiceError;
use crate::util::truncate_str;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenRouter chat-completions endpoint
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Gemini API root; the model path is appended per request
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Sends a prompt to a reasoning service and returns its raw text output.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Provider name used in logs and error messages
    fn provider(&self) -> &str;

    async fn infer(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Fixed generation parameters sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Network-layer timeout for the whole HTTP exchange
    pub timeout_secs: u64,
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-success status into a `ServiceError`, preferring the provider's
/// own error message when the body carries one.
fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> ServiceError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| sanitize_api_response(&e.error.message))
        .unwrap_or_else(|_| sanitize_api_response(body));

    let message = match status.as_u16() {
        401 | 403 => format!("invalid API key ({})", detail),
        429 => format!("rate limited, try again in a few minutes ({})", detail),
        500..=599 => format!("server error, the service may be temporarily unavailable ({})", detail),
        _ => detail,
    };

    ServiceError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    }
}

fn transport_error(provider: &str, err: reqwest::Error) -> ServiceError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("could not connect ({})", err)
    } else {
        err.to_string()
    };
    ServiceError::Transport {
        provider: provider.to_string(),
        message,
    }
}

fn no_candidate(provider: &str, reason: impl Into<String>) -> ServiceError {
    ServiceError::NoCandidate {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Create a configured HTTP client
pub(crate) fn create_http_client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::Transport {
            provider: "http".to_string(),
            message: format!("failed to create HTTP client: {}", e),
        })
}

/// POST a JSON body and return the response text on success.
async fn post_json<T: Serialize>(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &T,
) -> Result<String, ServiceError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;

    if !status.is_success() {
        return Err(status_error(provider, status, &text));
    }
    Ok(text)
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPENROUTER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Null when the request was refused or filtered
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter chat-completions provider
pub struct OpenRouterClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    settings: GenerationSettings,
}

impl OpenRouterClient {
    pub fn new(api_key: String, settings: GenerationSettings) -> Result<Self, ServiceError> {
        Self::with_url(OPENROUTER_URL, api_key, settings)
    }

    pub fn with_url(
        url: impl Into<String>,
        api_key: String,
        settings: GenerationSettings,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: create_http_client(settings.timeout_secs)?,
            url: url.into(),
            api_key,
            settings,
        })
    }
}

#[async_trait]
impl InferenceClient for OpenRouterClient {
    fn provider(&self) -> &str {
        "openrouter"
    }

    async fn infer(&self, prompt: &str) -> Result<String, ServiceError> {
        let provider = self.provider();
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
            stream: false,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let request = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "tracelens");
        let text = post_json(provider, request, &body).await?;

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            no_candidate(
                provider,
                format!("unreadable envelope ({}): {}", e, sanitize_api_response(&text)),
            )
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| no_candidate(provider, "response contained no choices"))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(no_candidate(
                provider,
                format!("request was refused: {}", truncate_str(&refusal, 200)),
            ));
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(no_candidate(provider, "output blocked by content filter"));
        }

        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(no_candidate(provider, "empty response")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  GEMINI
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini `generateContent` provider
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    settings: GenerationSettings,
}

impl GeminiClient {
    pub fn new(api_key: String, settings: GenerationSettings) -> Result<Self, ServiceError> {
        Self::with_base(GEMINI_API_BASE, api_key, settings)
    }

    pub fn with_base(
        api_base: impl Into<String>,
        api_key: String,
        settings: GenerationSettings,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: create_http_client(settings.timeout_secs)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base, self.settings.model
        )
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn infer(&self, prompt: &str) -> Result<String, ServiceError> {
        let provider = self.provider();
        let body = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        let request = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key);
        let text = post_json(provider, request, &body).await?;

        let parsed: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            no_candidate(
                provider,
                format!("unreadable envelope ({}): {}", e, sanitize_api_response(&text)),
            )
        })?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(no_candidate(provider, format!("prompt blocked ({})", reason)));
        }

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| no_candidate(provider, "response contained no candidates"))?;

        if matches!(
            candidate.finish_reason.as_deref(),
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT")
        ) {
            return Err(no_candidate(
                provider,
                format!(
                    "output blocked ({})",
                    candidate.finish_reason.unwrap_or_default()
                ),
            ));
        }

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(no_candidate(provider, "empty response"));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> GenerationSettings {
        GenerationSettings {
            model: "test-model".to_string(),
            temperature: 0.2,
            max_output_tokens: 1024,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        assert_eq!(
            sanitize_api_response("invalid key sk-abc123"),
            "(response details redacted - may contain sensitive data)"
        );
        assert_eq!(sanitize_api_response("model overloaded"), "model overloaded");
    }

    #[test]
    fn test_status_error_prefers_envelope_message() {
        let err = status_error(
            "openrouter",
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"slow down"}}"#,
        );
        assert_eq!(
            err,
            ServiceError::Status {
                provider: "openrouter".to_string(),
                status: 429,
                message: "rate limited, try again in a few minutes (slow down)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_openrouter_unwraps_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("Authorization", "Bearer key"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"ok\":true}"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            OpenRouterClient::with_url(format!("{}/chat", server.uri()), "key".to_string(), settings())
                .unwrap();
        assert_eq!(client.infer("hello").await.unwrap(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_openrouter_content_filter_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::with_url(server.uri(), "key".to_string(), settings()).unwrap();
        let err = client.infer("hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::NoCandidate { .. }));
    }

    #[tokio::test]
    async fn test_openrouter_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::with_url(server.uri(), "key".to_string(), settings()).unwrap();
        match client.infer("hello").await {
            Err(ServiceError::Status { status, message, .. }) => {
                assert_eq!(status, 503);
                assert!(message.contains("upstream down"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gemini_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .and(header("x-goog-api-key", "key"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base(server.uri(), "key".to_string(), settings()).unwrap();
        assert_eq!(client.infer("hello").await.unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_gemini_safety_block_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [],
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base(server.uri(), "key".to_string(), settings()).unwrap();
        let err = client.infer("hello").await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::NoCandidate {
                provider: "gemini".to_string(),
                reason: "prompt blocked (SAFETY)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_openrouter_refusal_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": null, "refusal": "I can't help with that."},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::with_url(server.uri(), "key".to_string(), settings()).unwrap();
        let err = client.infer("hello").await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::NoCandidate {
                provider: "openrouter".to_string(),
                reason: "request was refused: I can't help with that.".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_gemini_safety_finish_reason_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"partial\":"}]},
                    "finishReason": "SAFETY"
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base(server.uri(), "key".to_string(), settings()).unwrap();
        let err = client.infer("hello").await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::NoCandidate {
                provider: "gemini".to_string(),
                reason: "output blocked (SAFETY)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let client =
            OpenRouterClient::with_url("http://127.0.0.1:9/chat", "key".to_string(), settings())
                .unwrap();
        let err = client.infer("hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport { .. }));
    }
}
