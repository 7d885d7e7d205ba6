//! Locally synthesized analyses for when the reasoning service is unusable.

use super::types::{AnalysisResult, Difficulty, Severity, Solution};

// Reserved `errorType` labels. They mark locally synthesized results, so
// `parse::normalize` never lets a service reply carry one.
pub const NOT_CONFIGURED_ERROR_TYPE: &str = "Analysis Not Configured";
pub const SERVICE_FAILED_ERROR_TYPE: &str = "Analysis Service Error";
pub const INVALID_RESPONSE_ERROR_TYPE: &str = "Analysis Response Invalid";

/// Why the pipeline fell back instead of returning a service analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No credential for the reasoning service
    NotConfigured,
    /// The service call failed; carries the error message
    ServiceFailed(String),
    /// The service answered but the output had the wrong shape
    InvalidResponse,
}

impl FallbackReason {
    fn error_type(&self) -> &'static str {
        match self {
            FallbackReason::NotConfigured => NOT_CONFIGURED_ERROR_TYPE,
            FallbackReason::ServiceFailed(_) => SERVICE_FAILED_ERROR_TYPE,
            FallbackReason::InvalidResponse => INVALID_RESPONSE_ERROR_TYPE,
        }
    }

    fn explanation(&self) -> String {
        match self {
            FallbackReason::NotConfigured => "AI analysis is not configured: no API key was found \
                for the reasoning service. Set one with `tracelens config --set-key <KEY>` or \
                the provider's API key environment variable. The severity shown was computed \
                locally."
                .to_string(),
            FallbackReason::ServiceFailed(message) => format!(
                "AI analysis failed, reason: {}. The severity shown was computed locally.",
                message
            ),
            FallbackReason::InvalidResponse => "AI analysis failed, reason: invalid response \
                structure. The reasoning service answered, but its output could not be used. \
                The severity shown was computed locally."
                .to_string(),
        }
    }
}

pub(crate) fn is_fallback_error_type(error_type: &str) -> bool {
    matches!(
        error_type,
        NOT_CONFIGURED_ERROR_TYPE | SERVICE_FAILED_ERROR_TYPE | INVALID_RESPONSE_ERROR_TYPE
    )
}

fn manual_investigation() -> Solution {
    Solution {
        rank: None,
        title: "Investigate manually".to_string(),
        description: "Work through the error by hand: locate the failing frame, reproduce it, \
            and inspect the values involved."
            .to_string(),
        code: String::new(),
        reasoning: None,
        difficulty: Difficulty::Medium,
        estimated_time: "15-30 minutes".to_string(),
        steps: Some(vec![
            "Find the first stack frame that points into your own code".to_string(),
            "Reproduce the error with the smallest possible input".to_string(),
            "Log or inspect the values used on the failing line".to_string(),
            "Search the exact error message in the library's issue tracker".to_string(),
        ]),
    }
}

/// Build a well-formed placeholder analysis. Never fails.
pub fn synthesize(reason: &FallbackReason, severity: Severity) -> AnalysisResult {
    AnalysisResult {
        severity,
        error_type: reason.error_type().to_string(),
        explanation: reason.explanation(),
        root_cause: "Unknown: automated analysis was not available for this error.".to_string(),
        stack_analysis: None,
        files_likely_affected: Vec::new(),
        solutions: vec![manual_investigation()],
        prevention: None,
        related_resources: Vec::new(),
        common_in_stack: None,
    }
}
