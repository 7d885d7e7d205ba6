use super::error::MalformedResponseError;
use super::fallback::is_fallback_error_type;
use super::types::{
    AnalysisResult, CandidateFile, Confidence, Difficulty, PreventionAdvice, RelatedResource,
    ResourceKind, Severity, Solution, SolutionRank,
};
use crate::util::truncate_str;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// Balanced top-level `{...}` fragments, in order of appearance.
/// Braces inside string literals do not count.
fn json_object_fragments(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start_idx = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            continue;
        }

        if in_string {
            continue;
        }

        if c == '{' {
            if depth == 0 {
                start_idx = Some(i);
            }
            depth += 1;
        } else if c == '}' && depth > 0 {
            depth -= 1;
            if depth == 0 {
                if let Some(start) = start_idx.take() {
                    fragments.push(&text[start..=i]);
                }
            }
        }
    }

    fragments
}

/// Span from the first `{` to the last `}`, for text whose stray quotes
/// throw off the balanced scan
fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Try to fix common JSON issues from LLM responses.
///
/// Works outside string literals only: drops trailing commas, turns smart
/// double quotes used as delimiters into `"` and strips stray control
/// characters. Inside strings, raw line breaks and tabs are escaped and
/// everything else is kept as written.
fn fix_json_issues(json: &str) -> String {
    let mut fixed = String::with_capacity(json.len());
    let mut chars = json.char_indices();
    // Closing quote of the string literal being copied
    let mut string_close: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        match string_close {
            Some(close) => match c {
                '\\' => {
                    fixed.push(c);
                    if let Some((_, escaped)) = chars.next() {
                        fixed.push(escaped);
                    }
                }
                '\n' => fixed.push_str("\\n"),
                '\r' => fixed.push_str("\\r"),
                '\t' => fixed.push_str("\\t"),
                c if c == close || (close == RIGHT_DOUBLE_QUOTE && c == '"') => {
                    fixed.push('"');
                    string_close = None;
                }
                c if c.is_control() => {}
                c => fixed.push(c),
            },
            None => match c {
                '"' => {
                    fixed.push('"');
                    string_close = Some('"');
                }
                LEFT_DOUBLE_QUOTE | RIGHT_DOUBLE_QUOTE => {
                    fixed.push('"');
                    string_close = Some(RIGHT_DOUBLE_QUOTE);
                }
                ',' if json[i + 1..].trim_start().starts_with([']', '}']) => {}
                c if c.is_control() && !matches!(c, '\n' | '\t' | '\r') => {}
                c => fixed.push(c),
            },
        }
    }

    fixed
}

const LEFT_DOUBLE_QUOTE: char = '\u{201C}';
const RIGHT_DOUBLE_QUOTE: char = '\u{201D}';

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    severity: Option<String>,
    error_type: Option<String>,
    explanation: Option<String>,
    root_cause: Option<String>,
    stack_analysis: Option<String>,
    #[serde(default)]
    files_likely_affected: Vec<RawCandidate>,
    solutions: Option<Vec<RawSolution>>,
    prevention: Option<RawPrevention>,
    #[serde(default)]
    related_resources: Vec<RawResource>,
    common_in_stack: Option<String>,
}

#[derive(Deserialize)]
struct RawCandidate {
    path: String,
    confidence: Option<String>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSolution {
    rank: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    code: String,
    reasoning: Option<String>,
    difficulty: Option<String>,
    #[serde(default)]
    estimated_time: String,
    steps: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrevention {
    #[serde(default)]
    advice: String,
    eslint_rule: Option<String>,
    type_annotation: Option<String>,
    scan_pattern: Option<String>,
}

#[derive(Deserialize)]
struct RawResource {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(alias = "kind")]
    r#type: Option<String>,
}

fn confidence_from(label: Option<&str>) -> Confidence {
    match label.map(|l| l.trim().to_lowercase()).as_deref() {
        Some("high") => Confidence::High,
        Some("low") => Confidence::Low,
        _ => Confidence::Medium,
    }
}

fn rank_from(label: Option<&str>) -> Option<SolutionRank> {
    match label?.trim().to_lowercase().as_str() {
        "best" => Some(SolutionRank::Best),
        "fastest" => Some(SolutionRank::Fastest),
        "robust" => Some(SolutionRank::Robust),
        _ => None,
    }
}

fn difficulty_from(label: Option<&str>) -> Difficulty {
    match label.map(|l| l.trim().to_lowercase()).as_deref() {
        Some("easy") => Difficulty::Easy,
        Some("hard") => Difficulty::Hard,
        _ => Difficulty::Medium,
    }
}

fn resource_kind_from(label: Option<&str>) -> ResourceKind {
    match label.map(|l| l.trim().to_lowercase()).as_deref() {
        Some("forum") => ResourceKind::Forum,
        Some("repository") | Some("repo") | Some("github") => ResourceKind::Repository,
        _ => ResourceKind::Docs,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Keys whose presence marks an object as the analysis rather than a stray
/// `{...}` from surrounding prose
const ANALYSIS_KEYS: &[&str] = &["severity", "explanation", "solutions", "errorType"];

fn parse_object(candidate: &str) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::from_str::<Map<String, Value>>(candidate) {
        Ok(object) => Ok(object),
        Err(err) => serde_json::from_str(&fix_json_issues(candidate)).map_err(|_| err),
    }
}

/// Find the analysis object in raw output: fenced or bare, with or without
/// prose around it.
fn parse_raw_analysis(raw: &str) -> Result<RawAnalysis, MalformedResponseError> {
    let clean = strip_markdown_fences(raw);
    let mut candidates = json_object_fragments(clean);
    candidates.extend(outer_object_span(clean));
    candidates.push(clean);

    let mut first_object = None;
    let mut first_error = None;
    for candidate in candidates {
        match parse_object(candidate) {
            Ok(object) if ANALYSIS_KEYS.iter().any(|key| object.contains_key(*key)) => {
                first_object = Some(object);
                break;
            }
            Ok(object) => {
                if first_object.is_none() {
                    first_object = Some(object);
                }
            }
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(format!(
                        "{} (preview: {})",
                        err,
                        truncate_str(candidate, 200)
                    ));
                }
            }
        }
    }

    let object = first_object.ok_or_else(|| {
        MalformedResponseError::Parse(first_error.unwrap_or_else(|| "empty response".to_string()))
    })?;
    serde_json::from_value(Value::Object(object))
        .map_err(|err| MalformedResponseError::Parse(err.to_string()))
}

/// Parse raw service output into an [`AnalysisResult`].
///
/// Fenced output parses exactly like the bare JSON it wraps. `severity`,
/// `explanation` and a non-empty `solutions` array are required; optional
/// sections are taken as-is.
pub fn normalize(raw: &str) -> Result<AnalysisResult, MalformedResponseError> {
    let parsed = parse_raw_analysis(raw)?;

    let severity_label =
        non_blank(parsed.severity).ok_or(MalformedResponseError::MissingField("severity"))?;
    let severity = Severity::from_label(&severity_label)
        .ok_or(MalformedResponseError::UnknownSeverity(severity_label))?;
    let explanation =
        non_blank(parsed.explanation).ok_or(MalformedResponseError::MissingField("explanation"))?;
    let raw_solutions = parsed
        .solutions
        .filter(|s| !s.is_empty())
        .ok_or(MalformedResponseError::MissingField("solutions"))?;

    let solutions = raw_solutions
        .into_iter()
        .map(|s| Solution {
            rank: rank_from(s.rank.as_deref()),
            title: s.title,
            description: s.description,
            code: s.code,
            reasoning: non_blank(s.reasoning),
            difficulty: difficulty_from(s.difficulty.as_deref()),
            estimated_time: s.estimated_time,
            steps: s.steps.filter(|steps| !steps.is_empty()),
        })
        .collect();

    let files_likely_affected = parsed
        .files_likely_affected
        .into_iter()
        .filter(|f| !f.path.trim().is_empty())
        .map(|f| CandidateFile {
            path: f.path.trim().to_string(),
            confidence: confidence_from(f.confidence.as_deref()),
            reasoning: f.reasoning,
        })
        .collect();

    let prevention = parsed.prevention.map(|p| PreventionAdvice {
        advice: p.advice,
        eslint_rule: non_blank(p.eslint_rule),
        type_annotation: non_blank(p.type_annotation),
        scan_pattern: non_blank(p.scan_pattern),
    });

    let related_resources = parsed
        .related_resources
        .into_iter()
        .map(|r| RelatedResource {
            title: r.title,
            url: r.url,
            kind: resource_kind_from(r.r#type.as_deref()),
        })
        .collect();

    Ok(AnalysisResult {
        severity,
        error_type: non_blank(parsed.error_type)
            .filter(|error_type| !is_fallback_error_type(error_type))
            .unwrap_or_else(|| "Unknown Error".to_string()),
        explanation,
        root_cause: parsed.root_cause.unwrap_or_default(),
        stack_analysis: non_blank(parsed.stack_analysis),
        files_likely_affected,
        solutions,
        prevention,
        related_resources,
        common_in_stack: non_blank(parsed.common_in_stack),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{
        "severity": "critical",
        "errorType": "TypeError",
        "explanation": "items is undefined when the list renders",
        "rootCause": "fetch has not resolved on first render",
        "filesLikelyAffected": [
            {"path": "src/List.tsx", "confidence": "high", "reasoning": "calls items.map"}
        ],
        "solutions": [
            {
                "rank": "best",
                "title": "Default to an empty array",
                "description": "Initialise state with []",
                "code": "const [items, setItems] = useState([]);",
                "difficulty": "easy",
                "estimatedTime": "2 minutes",
                "steps": ["Open List.tsx", "Change the initial state"]
            }
        ],
        "prevention": {"advice": "Type your state", "eslintRule": ""},
        "relatedResources": [
            {"title": "React docs", "url": "https://react.dev", "type": "docs"}
        ]
    }"#;

    #[test]
    fn test_normalize_well_formed() {
        let result = normalize(WELL_FORMED).unwrap();
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.error_type, "TypeError");
        assert_eq!(result.solutions.len(), 1);
        assert_eq!(result.solutions[0].rank, Some(SolutionRank::Best));
        assert_eq!(result.solutions[0].difficulty, Difficulty::Easy);
        assert_eq!(result.files_likely_affected[0].confidence, Confidence::High);
        let prevention = result.prevention.unwrap();
        assert!(prevention.eslint_rule.is_none());
        assert_eq!(result.related_resources[0].kind, ResourceKind::Docs);
    }

    #[test]
    fn test_fenced_output_matches_bare_output() {
        let fenced = format!("```json\n{}\n```", WELL_FORMED);
        assert_eq!(normalize(&fenced).unwrap(), normalize(WELL_FORMED).unwrap());

        let bare_fence = format!("```\n{}\n```", WELL_FORMED);
        assert_eq!(normalize(&bare_fence).unwrap(), normalize(WELL_FORMED).unwrap());
    }

    #[test]
    fn test_surrounding_prose_is_ignored() {
        let noisy = format!("Here is the analysis:\n{}\nHope this helps!", WELL_FORMED);
        assert!(normalize(&noisy).is_ok());
    }

    #[test]
    fn test_trailing_commas_are_repaired() {
        let raw = r#"{"severity":"info","explanation":"e","solutions":[{"title":"t","description":"d",},],}"#;
        let result = normalize(raw).unwrap();
        assert_eq!(result.severity, Severity::Info);
        assert_eq!(result.error_type, "Unknown Error");
    }

    #[test]
    fn test_missing_required_fields_fail() {
        let no_solutions = r#"{"severity":"info","explanation":"e"}"#;
        assert_eq!(
            normalize(no_solutions),
            Err(MalformedResponseError::MissingField("solutions"))
        );

        let empty_solutions = r#"{"severity":"info","explanation":"e","solutions":[]}"#;
        assert_eq!(
            normalize(empty_solutions),
            Err(MalformedResponseError::MissingField("solutions"))
        );

        let no_severity = r#"{"explanation":"e","solutions":[{"title":"t"}]}"#;
        assert_eq!(
            normalize(no_severity),
            Err(MalformedResponseError::MissingField("severity"))
        );

        let no_explanation = r#"{"severity":"warning","solutions":[{"title":"t"}]}"#;
        assert_eq!(
            normalize(no_explanation),
            Err(MalformedResponseError::MissingField("explanation"))
        );
    }

    #[test]
    fn test_unknown_severity_fails() {
        let raw = r#"{"severity":"apocalyptic","explanation":"e","solutions":[{"title":"t"}]}"#;
        assert!(matches!(
            normalize(raw),
            Err(MalformedResponseError::UnknownSeverity(_))
        ));
    }

    #[test]
    fn test_legacy_severity_and_loose_enums() {
        let raw = r#"{"severity":"high","explanation":"e","solutions":[{"title":"t","difficulty":"trivial","rank":"cheapest"}],
            "filesLikelyAffected":[{"path":"a.py","confidence":"very high"}]}"#;
        let result = normalize(raw).unwrap();
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.solutions[0].difficulty, Difficulty::Medium);
        assert!(result.solutions[0].rank.is_none());
        assert_eq!(result.files_likely_affected[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_garbage_fails_to_parse() {
        assert!(matches!(
            normalize("I could not analyze this error."),
            Err(MalformedResponseError::Parse(_))
        ));
    }

    #[test]
    fn test_trailing_commas_before_whitespace_are_repaired() {
        let raw = "{\n  \"severity\": \"info\",\n  \"explanation\": \"e\",\n  \"solutions\": [\n    {\"title\": \"t\", \"description\": \"d\"},\n  ],\n}";
        let result = normalize(raw).unwrap();
        assert_eq!(result.severity, Severity::Info);
        assert_eq!(result.solutions.len(), 1);
    }

    #[test]
    fn test_braces_in_leading_prose() {
        let noisy = format!("The error in {{render}} is analyzed below:\n{}", WELL_FORMED);
        assert_eq!(normalize(&noisy).unwrap(), normalize(WELL_FORMED).unwrap());
    }

    #[test]
    fn test_fenced_reply_followed_by_note() {
        let noisy = format!(
            "```json\n{}\n```\nNote: wrap the call in {{ try }}.",
            WELL_FORMED
        );
        assert_eq!(normalize(&noisy).unwrap(), normalize(WELL_FORMED).unwrap());
    }

    #[test]
    fn test_smart_quotes_inside_strings_survive_repair() {
        let raw = r#"{"severity":"warning","explanation":"missing “key” prop","solutions":[{"title":"t","description":"d"},]}"#;
        let result = normalize(raw).unwrap();
        assert_eq!(result.explanation, "missing “key” prop");
    }

    #[test]
    fn test_smart_quote_delimiters_are_repaired() {
        let raw = "{“severity”: “info”, “explanation”: “e”, “solutions”: [{“title”: “t”, “description”: “d”}]}";
        let result = normalize(raw).unwrap();
        assert_eq!(result.severity, Severity::Info);
        assert_eq!(result.solutions[0].title, "t");
    }

    #[test]
    fn test_raw_line_breaks_in_strings_are_escaped() {
        let raw = "{\"severity\":\"info\",\"explanation\":\"line one\nline two\",\"solutions\":[{\"title\":\"t\"}]}";
        let result = normalize(raw).unwrap();
        assert_eq!(result.explanation, "line one\nline two");
    }

    #[test]
    fn test_reserved_error_type_is_not_a_fallback() {
        let raw = r#"{"severity":"info","errorType":"Analysis Service Error","explanation":"e","solutions":[{"title":"t"}]}"#;
        let result = normalize(raw).unwrap();
        assert_eq!(result.error_type, "Unknown Error");
        assert!(!result.is_fallback());
    }
}
