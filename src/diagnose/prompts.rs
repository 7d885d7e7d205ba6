//! Prompt construction for error analysis.
//!
//! The schema below and `parse::normalize` must change together.

use super::types::AnalysisRequest;
use crate::util::truncate_str;

/// Character budget for the serialized file tree embedded in a prompt
pub const FILE_TREE_CHAR_BUDGET: usize = 2000;

pub const NO_CODE_CONTEXT: &str = "No code context provided.";

pub const ANALYZE_ERROR_SYSTEM: &str = r#"You are a senior software engineer who diagnoses runtime errors.
You are precise, you do not invent files that are not in the repository listing, and you
prefer fixes that address the root cause over fixes that hide the symptom."#;

const OUTPUT_SCHEMA: &str = r#"OUTPUT FORMAT (JSON):
{
  "severity": "critical" | "warning" | "info",
  "errorType": "short name of the error class",
  "explanation": "plain-language explanation of what went wrong",
  "rootCause": "the underlying cause, not the symptom",
  "stackAnalysis": "walk through the relevant stack frames (optional)",
  "filesLikelyAffected": [
    {
      "path": "repository-relative path",
      "confidence": "high" | "medium" | "low",
      "reasoning": "why this file is implicated"
    }
  ],
  "solutions": [
    {
      "rank": "best" | "fastest" | "robust",
      "title": "short title",
      "description": "what the fix does",
      "code": "code for the fix",
      "reasoning": "why this fix works",
      "difficulty": "easy" | "medium" | "hard",
      "estimatedTime": "e.g. 5 minutes",
      "steps": ["step 1", "step 2"]
    }
  ],
  "prevention": {
    "advice": "how to avoid this class of error",
    "eslintRule": "lint rule that would catch it (optional)",
    "typeAnnotation": "type annotation that would catch it (optional)",
    "scanPattern": "regular expression that finds similar code (optional)"
  },
  "relatedResources": [
    { "title": "resource title", "url": "https://...", "type": "docs" | "forum" | "repository" }
  ],
  "commonInStack": "why this error is common in the given tech stack (optional)"
}

RULES:
- Return ONLY the JSON object, with no prose before or after it
- Do NOT wrap the JSON in markdown code fences
- "severity", "explanation" and a non-empty "solutions" array are REQUIRED
- Provide up to three solutions, one per rank, best first
- Only list files from the repository listing in "filesLikelyAffected""#;

/// Serialize the file tree as JSON text, cut to `budget` characters.
pub fn file_tree_summary(file_tree: &[String], budget: usize) -> String {
    let serialized = serde_json::to_string(file_tree).unwrap_or_else(|_| "[]".to_string());
    truncate_str(&serialized, budget).to_string()
}

fn format_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        return "None identified.".to_string();
    }
    candidates
        .iter()
        .map(|path| format!("- {}", path))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_tech_stack(tech_stack: &[String]) -> String {
    let joined = tech_stack
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "Unknown".to_string()
    } else {
        joined
    }
}

/// Build the single instruction document sent to the reasoning service.
pub fn build_prompt(request: &AnalysisRequest, candidates: &[String]) -> String {
    let code_context = request
        .code_context
        .as_deref()
        .filter(|code| !code.trim().is_empty())
        .unwrap_or(NO_CODE_CONTEXT);

    let stack_section = request
        .stack_trace
        .as_deref()
        .filter(|trace| !trace.trim().is_empty())
        .map(|trace| format!("\n\nSTACK TRACE:\n{}", trace))
        .unwrap_or_default();

    format!(
        "{system}\n\n\
         TECH STACK: {stack}\n\
         TARGET LANGUAGE: {language}\n\n\
         REPOSITORY FILES (truncated listing):\n{tree}\n\n\
         CANDIDATE FILES:\n{candidates}\n\n\
         CODE CONTEXT:\n{code}\n\n\
         ERROR:\n{error}{stack_section}\n\n\
         {schema}",
        system = ANALYZE_ERROR_SYSTEM,
        stack = format_tech_stack(&request.tech_stack),
        language = request.target_language.name(),
        tree = file_tree_summary(&request.file_tree, FILE_TREE_CHAR_BUDGET),
        candidates = format_candidates(candidates),
        code = code_context,
        error = request.error_text,
        stack_section = stack_section,
        schema = OUTPUT_SCHEMA,
    )
}
