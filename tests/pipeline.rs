//! End-to-end runs of the analyzer against mocked reasoning services.

use serde_json::json;
use tracelens::diagnose::{
    AnalysisRequest, Analyzer, GenerationSettings, Language, PipelineSettings, Provider, Severity,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANALYSIS_JSON: &str = r#"{
  "severity": "critical",
  "errorType": "TypeError",
  "explanation": "items is undefined when the list renders before data loads.",
  "rootCause": "The fetch resolves after the first render.",
  "filesLikelyAffected": [
    {"path": "src/components/List.tsx", "confidence": "high", "reasoning": "calls items.map"}
  ],
  "solutions": [
    {"rank": "best", "title": "Default to an empty array", "description": "Initialise state with []",
     "code": "const [items, setItems] = useState<Item[]>([]);", "difficulty": "easy",
     "estimatedTime": "5 minutes"},
    {"rank": "robust", "title": "Guard the render", "description": "Render a loader until data arrives",
     "code": "if (!items) return <Spinner />;", "difficulty": "medium", "estimatedTime": "15 minutes"}
  ],
  "relatedResources": [
    {"title": "useState", "url": "https://react.dev/reference/react/useState", "type": "docs"}
  ]
}"#;

fn settings(provider: Provider, api_base: String) -> PipelineSettings {
    PipelineSettings {
        provider,
        api_key: Some("test-key".to_string()),
        api_base: Some(api_base),
        generation: GenerationSettings {
            model: provider.default_model().to_string(),
            temperature: 0.2,
            max_output_tokens: 2048,
            timeout_secs: 5,
        },
    }
}

fn openrouter_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    }))
}

fn gemini_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"parts": [{"text": content}]}, "finishReason": "STOP"}]
    }))
}

fn react_request() -> AnalysisRequest {
    AnalysisRequest::new(
        "TypeError: Cannot read property 'map' of undefined",
        Language::TypeScript,
    )
    .with_tech_stack(vec!["React".to_string(), "TypeScript".to_string()])
    .with_file_tree(
        ["README.md", "src/components/List.tsx", "src/api.ts", "scripts/seed.py"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

#[tokio::test]
async fn unconfigured_analyzer_returns_fallback() {
    let mut settings = settings(Provider::OpenRouter, "http://127.0.0.1:9/".to_string());
    settings.api_key = None;
    let analyzer = Analyzer::from_settings(&settings);

    let result = analyzer.analyze(&react_request()).await.unwrap();
    assert!(result.is_fallback());
    assert_eq!(result.severity, Severity::Critical);
    assert_eq!(result.solutions.len(), 1);
    assert!(result.explanation.contains("not configured"));
}

#[tokio::test]
async fn openrouter_analysis_keeps_local_severity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_string_contains("src/components/List.tsx"))
        .respond_with(openrouter_reply(ANALYSIS_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer = Analyzer::from_settings(&settings(
        Provider::OpenRouter,
        format!("{}/api/v1/chat/completions", server.uri()),
    ));

    let request = AnalysisRequest::new(
        "Warning: Each child in a list should have a unique \"key\" prop.",
        Language::TypeScript,
    )
    .with_file_tree(vec!["src/components/List.tsx".to_string()]);
    let result = analyzer.analyze(&request).await.unwrap();

    assert!(!result.is_fallback());
    assert_eq!(result.severity, Severity::Warning);
    assert_eq!(result.error_type, "TypeError");
    assert_eq!(result.solutions.len(), 2);
    assert_eq!(result.files_likely_affected[0].path, "src/components/List.tsx");
}

#[tokio::test]
async fn gemini_fenced_output_is_accepted() {
    let server = MockServer::start().await;
    let fenced = format!("Here is the analysis:\n```json\n{}\n```", ANALYSIS_JSON);
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(gemini_reply(&fenced))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer = Analyzer::from_settings(&settings(
        Provider::Gemini,
        format!("{}/v1beta", server.uri()),
    ));

    let result = analyzer.analyze(&react_request()).await.unwrap();
    assert!(!result.is_fallback());
    assert_eq!(result.severity, Severity::Critical);
    assert_eq!(result.related_resources.len(), 1);
}

#[tokio::test]
async fn malformed_output_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openrouter_reply(r#"{"severity":"warning","explanation":"no solutions"}"#))
        .mount(&server)
        .await;

    let analyzer = Analyzer::from_settings(&settings(Provider::OpenRouter, server.uri()));
    let result = analyzer.analyze(&react_request()).await.unwrap();

    assert!(result.is_fallback());
    assert!(result.explanation.contains("invalid response structure"));
    assert_eq!(result.severity, Severity::Critical);
}

#[tokio::test]
async fn server_error_falls_back_with_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let analyzer = Analyzer::from_settings(&settings(Provider::OpenRouter, server.uri()));
    let request = AnalysisRequest::new("requests failed: connection refused", Language::Python);
    let result = analyzer.analyze(&request).await.unwrap();

    assert!(result.is_fallback());
    assert!(result.explanation.contains("reason:"));
    assert!(result.explanation.contains("503"));
    assert_eq!(result.severity, Severity::Warning);
}
