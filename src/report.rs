//! Plain-text rendering of analyses for the terminal

use crate::diagnose::{AnalysisResult, Confidence, Severity, SolutionRank};
use crate::history::HistoryEntry;
use crate::util::truncate;
use std::fmt::Write;
use unicode_width::UnicodeWidthStr;

const BOX_WIDTH: usize = 60;

fn boxed_line(out: &mut String, text: &str) {
    let inner = BOX_WIDTH - 4;
    let text = truncate(text, inner);
    let pad = inner.saturating_sub(UnicodeWidthStr::width(text.as_str()));
    let _ = writeln!(out, "│ {}{} │", text, " ".repeat(pad));
}

fn rank_label(rank: Option<SolutionRank>) -> &'static str {
    match rank {
        Some(SolutionRank::Best) => "best",
        Some(SolutionRank::Fastest) => "fastest",
        Some(SolutionRank::Robust) => "robust",
        None => "option",
    }
}

fn confidence_label(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "high",
        Confidence::Medium => "medium",
        Confidence::Low => "low",
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a full analysis
pub fn render_analysis(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let border = "─".repeat(BOX_WIDTH - 2);

    let _ = writeln!(out, "┌{}┐", border);
    boxed_line(
        &mut out,
        &format!("{} {}", result.severity.icon(), result.severity.as_str().to_uppercase()),
    );
    boxed_line(&mut out, &result.error_type);
    let _ = writeln!(out, "└{}┘", border);

    let _ = writeln!(out, "\n{}", result.explanation);
    if !result.root_cause.is_empty() {
        let _ = writeln!(out, "\nRoot cause:\n{}", indent(&result.root_cause, "  "));
    }
    if let Some(stack) = &result.stack_analysis {
        let _ = writeln!(out, "\nStack analysis:\n{}", indent(stack, "  "));
    }

    if !result.files_likely_affected.is_empty() {
        let _ = writeln!(out, "\nFiles likely affected:");
        for file in &result.files_likely_affected {
            let _ = writeln!(
                out,
                "  [{}] {} - {}",
                confidence_label(file.confidence),
                file.path,
                file.reasoning
            );
        }
    }

    let _ = writeln!(out, "\nSolutions:");
    for (i, solution) in result.solutions.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} ({}, {:?}, {})",
            i + 1,
            solution.title,
            rank_label(solution.rank),
            solution.difficulty,
            if solution.estimated_time.is_empty() {
                "time unknown"
            } else {
                &solution.estimated_time
            }
        );
        let _ = writeln!(out, "{}", indent(&solution.description, "     "));
        if let Some(steps) = &solution.steps {
            for (n, step) in steps.iter().enumerate() {
                let _ = writeln!(out, "     {}) {}", n + 1, step);
            }
        }
        if !solution.code.trim().is_empty() {
            let _ = writeln!(out, "{}", indent(&solution.code, "     | "));
        }
    }

    if let Some(prevention) = &result.prevention {
        let _ = writeln!(out, "\nPrevention:\n{}", indent(&prevention.advice, "  "));
        if let Some(rule) = &prevention.eslint_rule {
            let _ = writeln!(out, "  lint rule: {}", rule);
        }
        if let Some(annotation) = &prevention.type_annotation {
            let _ = writeln!(out, "  type annotation: {}", annotation);
        }
        if let Some(pattern) = &prevention.scan_pattern {
            let _ = writeln!(out, "  scan pattern: {}", pattern);
        }
    }

    if let Some(common) = &result.common_in_stack {
        let _ = writeln!(out, "\nCommon in this stack:\n{}", indent(common, "  "));
    }

    if !result.related_resources.is_empty() {
        let _ = writeln!(out, "\nRelated:");
        for resource in &result.related_resources {
            let _ = writeln!(out, "  - {} <{}>", resource.title, resource.url);
        }
    }

    out
}

/// One line per history entry
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No analyses recorded yet.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let marker = if entry.analysis.is_fallback() { "*" } else { " " };
        let _ = writeln!(
            out,
            "{} {:<8} {} {:<10} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.analysis.severity.as_str(),
            marker,
            entry.language.name(),
            truncate(&entry.error_message, 60)
        );
    }
    out
}

pub fn render_severity(severity: Severity) -> String {
    format!("{} {}", severity.icon(), severity.as_str())
}
