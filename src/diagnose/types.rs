use super::relevance::Language;
use serde::{Deserialize, Serialize};

/// Severity tier of an error.
///
/// Older responses (and older history files) use a five-level vocabulary;
/// those names are accepted on input and folded into the three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "low", alias = "minor", alias = "notice")]
    Info,
    #[serde(alias = "medium", alias = "moderate", alias = "warn")]
    Warning,
    #[serde(alias = "high", alias = "error", alias = "fatal")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Parse a tier label, including legacy names. Returns `None` for
    /// anything outside the known vocabulary.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "critical" | "high" | "error" | "fatal" => Some(Severity::Critical),
            "warning" | "medium" | "moderate" | "warn" => Some(Severity::Warning),
            "info" | "low" | "minor" | "notice" => Some(Severity::Info),
            _ => None,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Critical => "!!",
            Severity::Warning => "! ",
            Severity::Info => "i ",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolutionRank {
    Best,
    Fastest,
    Robust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Docs,
    Forum,
    Repository,
}

/// A file the reasoning service believes may hold the root cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFile {
    pub path: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<SolutionRank>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreventionAdvice {
    pub advice: String,
    /// Lint rule text (ESLint, Clippy, Ruff, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eslint_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
    /// Regular expression that finds other occurrences of the same mistake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedResource {
    pub title: String,
    pub url: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: ResourceKind,
}

/// Canonical output of the pipeline, identical in shape for successful and
/// fallback analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub severity: Severity,
    pub error_type: String,
    pub explanation: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_analysis: Option<String>,
    #[serde(default)]
    pub files_likely_affected: Vec<CandidateFile>,
    pub solutions: Vec<Solution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevention: Option<PreventionAdvice>,
    #[serde(default)]
    pub related_resources: Vec<RelatedResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_in_stack: Option<String>,
}

impl AnalysisResult {
    /// Whether this result was synthesized locally instead of coming from the
    /// reasoning service.
    pub fn is_fallback(&self) -> bool {
        super::fallback::is_fallback_error_type(&self.error_type)
    }
}

/// One analysis request, built per user action.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub error_text: String,
    pub stack_trace: Option<String>,
    pub target_language: Language,
    pub tech_stack: Vec<String>,
    pub file_tree: Vec<String>,
    pub code_context: Option<String>,
}

impl AnalysisRequest {
    pub fn new(error_text: impl Into<String>, target_language: Language) -> Self {
        Self {
            error_text: error_text.into(),
            stack_trace: None,
            target_language,
            tech_stack: Vec::new(),
            file_tree: Vec::new(),
            code_context: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_tech_stack(mut self, tech_stack: Vec<String>) -> Self {
        self.tech_stack = tech_stack;
        self
    }

    pub fn with_file_tree(mut self, file_tree: Vec<String>) -> Self {
        self.file_tree = file_tree;
        self
    }

    pub fn with_code_context(mut self, code_context: impl Into<String>) -> Self {
        self.code_context = Some(code_context.into());
        self
    }
}
