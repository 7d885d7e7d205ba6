//! Deterministic severity classification.
//!
//! The tier computed here always wins over whatever the reasoning service
//! proposes, so the rules must stay pure: same text in, same tier out.

use super::types::Severity;
use regex::RegexSet;
use std::sync::OnceLock;

/// Errors that crash the process, corrupt state or dereference nothing.
const CRASH_PATTERNS: &[&str] = &[
    r"(?i)\bfatal\b",
    r"(?i)\bpanic(ked)?\b",
    r"(?i)segmentation fault|\bsig(segv|abrt|kill|bus)\b|core dumped",
    r"(?i)out of memory|heap out of memory|\bOOM\b|MemoryError|OutOfMemoryError",
    r"(?i)stack ?overflow|maximum call stack size exceeded|RecursionError",
    r"(?i)\bdeadlock",
    r"(?i)\buncaught\b|\bunhandled\b",
    r"(?i)cannot read propert(y|ies) of (undefined|null)",
    r"(?i)undefined is not (a function|an object)",
    r"NullPointerException|NullReferenceException|nil pointer dereference",
    r"\b(TypeError|ReferenceError|KeyError|IndexError|AttributeError|ZeroDivisionError)\b",
    r"(?i)data (loss|corruption)",
];

/// Advisory diagnostics: the program still runs.
const WARNING_PATTERNS: &[&str] = &[
    r"(?i)warn(ing)?\b",
    r"(?i)deprecat",
    r"(?i)\bunused\b",
    r"(?i)\blint\b|eslint|clippy",
    r"(?i)will be removed",
    r#"(?i)unique "?key"? prop"#,
];

/// Generic failure vocabulary without a crash marker.
const FAILURE_PATTERNS: &[&str] = &[
    r"(?i)\berror\b",
    r"(?i)exception",
    r"(?i)\bfail(ed|ure)?\b",
    r"(?i)\bcannot\b|\bcan't\b|\bunable to\b",
    r"(?i)refused|timed? ?out|not found",
];

/// Explicit raise sites in surrounding code.
const RAISE_PATTERNS: &[&str] = &[
    r"\bthrow\b",
    r"\braise\b",
    r"\bpanic!\(",
    r"\.unwrap\(\)",
    r"\bprocess\.exit\(",
];

struct Rules {
    crash: RegexSet,
    warning: RegexSet,
    failure: RegexSet,
    raise: RegexSet,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        crash: compile(CRASH_PATTERNS),
        warning: compile(WARNING_PATTERNS),
        failure: compile(FAILURE_PATTERNS),
        raise: compile(RAISE_PATTERNS),
    })
}

fn compile(patterns: &[&str]) -> RegexSet {
    // Patterns are constants covered by tests; an invalid one is a programming error.
    RegexSet::new(patterns).unwrap_or_else(|err| panic!("invalid severity pattern: {err}"))
}

/// Classify an error into a severity tier.
///
/// Total and deterministic. The headline error text is inspected first: a
/// warning-class headline is never escalated by frames in the stack trace.
pub fn classify(error_text: &str, stack_trace: Option<&str>, code_context: Option<&str>) -> Severity {
    let rules = rules();

    if rules.crash.is_match(error_text) {
        return Severity::Critical;
    }
    if rules.warning.is_match(error_text) {
        return Severity::Warning;
    }
    if stack_trace.is_some_and(|stack| rules.crash.is_match(stack)) {
        return Severity::Critical;
    }
    if rules.failure.is_match(error_text) {
        return Severity::Warning;
    }
    if code_context.is_some_and(|code| rules.raise.is_match(code)) {
        return Severity::Warning;
    }
    Severity::Info
}
