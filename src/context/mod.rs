//! Repository context for an analysis
//!
//! Builds the flat file listing and the tech stack the pipeline grounds its
//! prompt on, either by walking a local checkout or by reading a file tree
//! exported by another tool.

use crate::diagnose::relevance::flat_file_tree;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Stop walking after this many files; the prompt only embeds a prefix anyway
const MAX_SCANNED_FILES: usize = 5000;

const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    ".next",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "coverage",
];

/// Read-only repository context handed to the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoContext {
    /// Repository-relative paths with `/` separators
    pub file_tree: Vec<String>,
    pub tech_stack: Vec<String>,
}

impl RepoContext {
    /// Walk `root` and detect its stack from manifest files.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }
        let file_tree = scan_file_tree(root);
        let tech_stack = detect_tech_stack(root);
        debug!(
            files = file_tree.len(),
            stack = ?tech_stack,
            "scanned repository context"
        );
        Ok(Self {
            file_tree,
            tech_stack,
        })
    }
}

fn is_ignored(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// List files under `root` as sorted, repository-relative paths.
pub fn scan_file_tree(root: &Path) -> Vec<String> {
    let mut paths: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .take(MAX_SCANNED_FILES)
        .collect();
    paths.sort();
    paths
}

/// Load a file tree exported as JSON by a repository client.
///
/// The document must be a flat array of path strings. Any other shape is
/// logged and treated as an empty tree.
pub fn load_file_tree(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file tree {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("File tree {} is not valid JSON", path.display()))?;
    match flat_file_tree(&value) {
        Some(paths) => Ok(paths),
        None => {
            warn!(
                path = %path.display(),
                "file tree is not a flat list of paths; continuing without it"
            );
            Ok(Vec::new())
        }
    }
}

fn push_unique(stack: &mut Vec<String>, item: &str) {
    if !stack.iter().any(|s| s == item) {
        stack.push(item.to_string());
    }
}

/// Known dependency names and the stack label they imply
const NODE_MARKERS: &[(&str, &str)] = &[
    ("typescript", "TypeScript"),
    ("react", "React"),
    ("next", "Next.js"),
    ("vue", "Vue"),
    ("nuxt", "Nuxt"),
    ("svelte", "Svelte"),
    ("@angular/core", "Angular"),
    ("express", "Express"),
    ("@nestjs/core", "NestJS"),
    ("vite", "Vite"),
    ("prisma", "Prisma"),
    ("mongoose", "MongoDB"),
];

const CARGO_MARKERS: &[(&str, &str)] = &[
    ("tokio", "Tokio"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
    ("rocket", "Rocket"),
    ("serde", "Serde"),
    ("sqlx", "SQLx"),
    ("diesel", "Diesel"),
    ("bevy", "Bevy"),
];

const PYTHON_MARKERS: &[(&str, &str)] = &[
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("sqlalchemy", "SQLAlchemy"),
    ("pandas", "pandas"),
    ("numpy", "NumPy"),
    ("torch", "PyTorch"),
];

fn node_stack(root: &Path, stack: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(root.join("package.json")) else {
        return;
    };
    push_unique(stack, "Node.js");
    let Ok(manifest) = serde_json::from_str::<Value>(&content) else {
        warn!("package.json is not valid JSON; skipping dependency detection");
        return;
    };
    let has_dep = |name: &str| {
        ["dependencies", "devDependencies", "peerDependencies"]
            .iter()
            .any(|section| manifest.get(section).and_then(|d| d.get(name)).is_some())
    };
    for (dep, label) in NODE_MARKERS {
        if has_dep(dep) {
            push_unique(stack, label);
        }
    }
}

fn cargo_stack(root: &Path, stack: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(root.join("Cargo.toml")) else {
        return;
    };
    push_unique(stack, "Rust");
    let Ok(manifest) = content.parse::<toml::Table>() else {
        warn!("Cargo.toml could not be parsed; skipping dependency detection");
        return;
    };
    let mut deps = Vec::new();
    if let Some(table) = manifest.get("dependencies").and_then(|d| d.as_table()) {
        deps.push(table);
    }
    if let Some(table) = manifest
        .get("workspace")
        .and_then(|w| w.get("dependencies"))
        .and_then(|d| d.as_table())
    {
        deps.push(table);
    }
    for (dep, label) in CARGO_MARKERS {
        if deps.iter().any(|table| table.contains_key(*dep)) {
            push_unique(stack, label);
        }
    }
}

fn python_stack(root: &Path, stack: &mut Vec<String>) {
    let manifests: Vec<String> = ["requirements.txt", "pyproject.toml", "Pipfile"]
        .iter()
        .filter_map(|name| fs::read_to_string(root.join(name)).ok())
        .collect();
    if manifests.is_empty() {
        return;
    }
    push_unique(stack, "Python");
    let combined = manifests.join("\n").to_lowercase();
    for (dep, label) in PYTHON_MARKERS {
        if combined.contains(dep) {
            push_unique(stack, label);
        }
    }
}

/// Detect the stack from well-known manifests in the repository root.
pub fn detect_tech_stack(root: &Path) -> Vec<String> {
    let mut stack = Vec::new();
    node_stack(root, &mut stack);
    cargo_stack(root, &mut stack);
    python_stack(root, &mut stack);

    if root.join("go.mod").is_file() {
        push_unique(&mut stack, "Go");
    }
    if root.join("pom.xml").is_file() || root.join("build.gradle").is_file() {
        push_unique(&mut stack, "JVM");
        let gradle = fs::read_to_string(root.join("build.gradle")).unwrap_or_default();
        let pom = fs::read_to_string(root.join("pom.xml")).unwrap_or_default();
        if gradle.contains("org.springframework") || pom.contains("spring-boot") {
            push_unique(&mut stack, "Spring Boot");
        }
    }
    if root.join("Gemfile").is_file() {
        push_unique(&mut stack, "Ruby");
        if fs::read_to_string(root.join("Gemfile"))
            .map(|g| g.contains("rails"))
            .unwrap_or(false)
        {
            push_unique(&mut stack, "Rails");
        }
    }
    if root.join("composer.json").is_file() {
        push_unique(&mut stack, "PHP");
    }
    stack
}
