//! Narrow a repository listing down to files worth showing the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Upper bound on candidate files embedded in a prompt
pub const MAX_RELEVANT_FILES: usize = 20;

/// Languages an error can be analyzed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    Kotlin,
    Go,
    Rust,
    CSharp,
    Cpp,
    Php,
    Ruby,
    Swift,
    Unknown,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Python,
        Language::Java,
        Language::Kotlin,
        Language::Go,
        Language::Rust,
        Language::CSharp,
        Language::Cpp,
        Language::Php,
        Language::Ruby,
        Language::Swift,
    ];

    /// Parse a user-facing language name. Unrecognized names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "javascript" | "js" | "node" | "nodejs" | "node.js" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "python" | "py" | "python3" => Language::Python,
            "java" => Language::Java,
            "kotlin" | "kt" => Language::Kotlin,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            "c#" | "csharp" | "cs" | "dotnet" => Language::CSharp,
            "c++" | "cpp" | "cxx" => Language::Cpp,
            "php" => Language::Php,
            "ruby" | "rb" => Language::Ruby,
            "swift" => Language::Swift,
            _ => Language::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Python => "Python",
            Language::Java => "Java",
            Language::Kotlin => "Kotlin",
            Language::Go => "Go",
            Language::Rust => "Rust",
            Language::CSharp => "C#",
            Language::Cpp => "C++",
            Language::Php => "PHP",
            Language::Ruby => "Ruby",
            Language::Swift => "Swift",
            Language::Unknown => "Unknown",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Python => &["py", "pyi"],
            Language::Java => &["java"],
            Language::Kotlin => &["kt", "kts"],
            Language::Go => &["go"],
            Language::Rust => &["rs"],
            Language::CSharp => &["cs"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "h"],
            Language::Php => &["php"],
            Language::Ruby => &["rb"],
            Language::Swift => &["swift"],
            Language::Unknown => &[],
        }
    }

    /// Stack to assume when the caller knows nothing about the repository.
    pub fn default_stack(&self) -> Vec<String> {
        let stack: &[&str] = match self {
            Language::JavaScript => &["JavaScript", "Node.js"],
            Language::TypeScript => &["TypeScript", "Node.js"],
            Language::Python => &["Python"],
            Language::Java => &["Java", "JVM"],
            Language::Kotlin => &["Kotlin", "JVM"],
            Language::Go => &["Go"],
            Language::Rust => &["Rust", "Cargo"],
            Language::CSharp => &["C#", ".NET"],
            Language::Cpp => &["C++"],
            Language::Php => &["PHP"],
            Language::Ruby => &["Ruby"],
            Language::Swift => &["Swift"],
            Language::Unknown => &[],
        };
        stack.iter().map(|s| s.to_string()).collect()
    }

    fn matches_path(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions().contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Paths from `file_tree` whose extension belongs to `language`, in input
/// order, capped at [`MAX_RELEVANT_FILES`].
pub fn filter_relevant(file_tree: &[String], language: Language) -> Vec<String> {
    file_tree
        .iter()
        .filter(|path| language.matches_path(path))
        .take(MAX_RELEVANT_FILES)
        .cloned()
        .collect()
}

/// Flatten a file tree received as loose JSON.
///
/// Only a flat array of strings is accepted. Anything else (nested objects,
/// mixed arrays, a bare string) yields `None` so the caller can carry on with
/// no candidates instead of failing the request.
pub fn flat_file_tree(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// [`filter_relevant`] over a loosely-typed tree; structural mismatches
/// produce an empty list.
pub fn filter_relevant_value(file_tree: &Value, language: Language) -> Vec<String> {
    match flat_file_tree(file_tree) {
        Some(paths) => filter_relevant(&paths, language),
        None => {
            tracing::warn!("file tree is not a flat list of paths; skipping relevance filter");
            Vec::new()
        }
    }
}
