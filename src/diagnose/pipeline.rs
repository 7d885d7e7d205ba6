//! The analysis pipeline: context assembly, one inference call, validation,
//! and a severity override that always comes from the local classifier.

use super::client::{GeminiClient, GenerationSettings, InferenceClient, OpenRouterClient};
use super::error::{InvalidRequest, ServiceError};
use super::fallback::{self, FallbackReason};
use super::parse;
use super::prompts;
use super::relevance;
use super::severity;
use super::types::{AnalysisRequest, AnalysisResult, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reasoning-service providers the pipeline can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenRouter,
    Gemini,
}

impl Provider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openrouter" => Some(Provider::OpenRouter),
            "gemini" | "google" => Some(Provider::Gemini),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::Gemini => "gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "anthropic/claude-sonnet-4.5",
            Provider::Gemini => "gemini-2.0-flash",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn key_env_var(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable settings resolved once at process start.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub provider: Provider,
    /// `None` routes every request to the fallback path
    pub api_key: Option<String>,
    /// Overrides the provider's default endpoint
    pub api_base: Option<String>,
    pub generation: GenerationSettings,
}

/// Pipeline stages, in order. Used for tracing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    AssemblingContext,
    AwaitingInference,
    Validating,
    FallbackSynthesis,
    Done,
}

/// Runs requests through the pipeline. Stateless across calls; one analyzer
/// can serve concurrent requests.
pub struct Analyzer {
    client: Option<Arc<dyn InferenceClient>>,
}

impl Analyzer {
    /// Build an analyzer from settings. A missing key yields an analyzer that
    /// always falls back; so does an HTTP client that cannot be built, with
    /// the build error as the disclosed reason.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let Some(api_key) = settings.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            debug!("no API key configured; analyses will use the local fallback");
            return Self::unconfigured();
        };

        match build_client(settings, api_key) {
            Ok(client) => Self::with_client(client),
            Err(err) => {
                warn!(
                    provider = %settings.provider,
                    error = %err,
                    "could not build inference client; analyses will fall back"
                );
                Self::with_client(Arc::new(UnavailableClient {
                    provider: settings.provider,
                    error: err,
                }))
            }
        }
    }

    pub fn with_client(client: Arc<dyn InferenceClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn unconfigured() -> Self {
        Self { client: None }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Analyze one error.
    ///
    /// The only error returned is [`InvalidRequest`]; every failure from the
    /// inference step onwards produces a fallback result instead.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, InvalidRequest> {
        if request.error_text.trim().is_empty() {
            return Err(InvalidRequest::EmptyErrorText);
        }
        trace_stage(Stage::NotStarted, Stage::AssemblingContext);

        let classified = severity::classify(
            &request.error_text,
            request.stack_trace.as_deref(),
            request.code_context.as_deref(),
        );
        let candidates = relevance::filter_relevant(&request.file_tree, request.target_language);
        let prompt = prompts::build_prompt(request, &candidates);
        debug!(
            severity = %classified,
            candidates = candidates.len(),
            prompt_chars = prompt.len(),
            "context assembled"
        );

        let Some(client) = &self.client else {
            return Ok(fall_back(
                Stage::AssemblingContext,
                FallbackReason::NotConfigured,
                classified,
            ));
        };

        trace_stage(Stage::AssemblingContext, Stage::AwaitingInference);
        let raw = match client.infer(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(provider = client.provider(), error = %err, "inference failed");
                return Ok(fall_back(
                    Stage::AwaitingInference,
                    FallbackReason::ServiceFailed(err.to_string()),
                    classified,
                ));
            }
        };

        trace_stage(Stage::AwaitingInference, Stage::Validating);
        let mut result = match parse::normalize(&raw) {
            Ok(result) => result,
            Err(err) => {
                warn!(provider = client.provider(), error = %err, "response failed validation");
                return Ok(fall_back(
                    Stage::Validating,
                    FallbackReason::InvalidResponse,
                    classified,
                ));
            }
        };

        if result.severity != classified {
            debug!(
                proposed = %result.severity,
                classified = %classified,
                "overriding service severity"
            );
        }
        result.severity = classified;
        trace_stage(Stage::Validating, Stage::Done);
        Ok(result)
    }
}

fn build_client(
    settings: &PipelineSettings,
    api_key: String,
) -> Result<Arc<dyn InferenceClient>, ServiceError> {
    let generation = settings.generation.clone();
    let client: Arc<dyn InferenceClient> = match (settings.provider, &settings.api_base) {
        (Provider::OpenRouter, Some(base)) => {
            Arc::new(OpenRouterClient::with_url(base.clone(), api_key, generation)?)
        }
        (Provider::OpenRouter, None) => Arc::new(OpenRouterClient::new(api_key, generation)?),
        (Provider::Gemini, Some(base)) => {
            Arc::new(GeminiClient::with_base(base.clone(), api_key, generation)?)
        }
        (Provider::Gemini, None) => Arc::new(GeminiClient::new(api_key, generation)?),
    };
    Ok(client)
}

/// Stands in for a provider whose client could not be constructed. Every
/// call reports the construction error so it reaches the fallback.
struct UnavailableClient {
    provider: Provider,
    error: ServiceError,
}

#[async_trait]
impl InferenceClient for UnavailableClient {
    fn provider(&self) -> &str {
        self.provider.name()
    }

    async fn infer(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(self.error.clone())
    }
}

fn fall_back(from: Stage, reason: FallbackReason, classified: Severity) -> AnalysisResult {
    trace_stage(from, Stage::FallbackSynthesis);
    let result = fallback::synthesize(&reason, classified);
    trace_stage(Stage::FallbackSynthesis, Stage::Done);
    result
}

fn trace_stage(from: Stage, to: Stage) {
    debug!(?from, ?to, "pipeline transition");
}
