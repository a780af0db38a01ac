//! Project-level read resources: the directory tree and the overview
//! summary.
//!
//! Directory walks honour `.gitignore` and a `.claudeignore` file at the
//! project root (gitignore-like patterns, one per line, `#` comments).

use crate::error::{RetrievalError, RetrievalResult};
use crate::parsing::Language;
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CLAUDE_IGNORE_FILE: &str = ".claudeignore";

/// Directory tree rendered as indented text, depth-limited.
pub fn structure(
    root: &Path,
    max_depth: Option<usize>,
    exclude: &[String],
) -> RetrievalResult<String> {
    if !root.is_dir() {
        return Err(RetrievalError::io_path(root, "not a directory"));
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .follow_links(false)
        .add_custom_ignore_filename(CLAUDE_IGNORE_FILE);
    if let Some(depth) = max_depth {
        builder.max_depth(Some(depth));
    }

    let mut override_builder = ignore::overrides::OverrideBuilder::new(root);
    for pattern in exclude {
        if let Err(e) = override_builder.add(&format!("!{pattern}")) {
            tracing::warn!("Invalid exclude pattern '{pattern}': {e}");
        }
    }
    if let Ok(overrides) = override_builder.build() {
        builder.overrides(overrides);
    }

    let mut entries: Vec<(PathBuf, bool)> = builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.path() != root)
        .map(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            (entry.path().to_path_buf(), is_dir)
        })
        .collect();
    entries.sort();

    let mut out = format!(
        "{}/\n",
        root.file_name().and_then(|n| n.to_str()).unwrap_or(".")
    );
    for (path, is_dir) in entries {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let depth = relative.components().count();
        for _ in 0..depth {
            out.push_str("  ");
        }
        let name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?");
        out.push_str(name);
        if is_dir {
            out.push('/');
        }
        out.push('\n');
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub file_count: usize,
    /// Files per detected language, descending.
    pub languages: Vec<(String, usize)>,
    /// Build-system / framework guesses from marker files.
    pub frameworks: Vec<String>,
    pub readme_first_paragraph: Option<String>,
    pub git_branch: Option<String>,
}

pub fn summary(
    root: &Path,
    include_readme: bool,
    include_package_info: bool,
    include_git_info: bool,
) -> RetrievalResult<ProjectSummary> {
    if !root.is_dir() {
        return Err(RetrievalError::io_path(root, "not a directory"));
    }

    let mut file_count = 0usize;
    let mut languages: BTreeMap<&'static str, usize> = BTreeMap::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .add_custom_ignore_filename(CLAUDE_IGNORE_FILE)
        .build();
    for entry in walker.filter_map(Result::ok) {
        if entry.file_type().is_some_and(|t| t.is_file()) {
            file_count += 1;
            if let Some(language) = Language::from_path(entry.path()) {
                *languages.entry(language.name()).or_insert(0) += 1;
            }
        }
    }

    let mut languages: Vec<(String, usize)> = languages
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let frameworks = if include_package_info {
        detect_frameworks(root)
    } else {
        Vec::new()
    };

    let readme_first_paragraph = if include_readme {
        read_readme_paragraph(root)
    } else {
        None
    };

    let git_branch = if include_git_info {
        read_git_branch(root)
    } else {
        None
    };

    Ok(ProjectSummary {
        name: root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string(),
        file_count,
        languages,
        frameworks,
        readme_first_paragraph,
        git_branch,
    })
}

fn detect_frameworks(root: &Path) -> Vec<String> {
    const MARKERS: &[(&str, &str)] = &[
        ("Cargo.toml", "cargo"),
        ("package.json", "node"),
        ("tsconfig.json", "typescript"),
        ("pyproject.toml", "python"),
        ("requirements.txt", "python"),
        ("go.mod", "go"),
        ("pom.xml", "maven"),
        ("build.gradle", "gradle"),
        ("build.gradle.kts", "gradle"),
        ("Gemfile", "bundler"),
        ("composer.json", "composer"),
        ("CMakeLists.txt", "cmake"),
        ("Makefile", "make"),
    ];
    let mut found = Vec::new();
    for (marker, framework) in MARKERS {
        if root.join(marker).exists() && !found.contains(&framework.to_string()) {
            found.push(framework.to_string());
        }
    }
    found
}

fn read_readme_paragraph(root: &Path) -> Option<String> {
    let readme = ["README.md", "README", "readme.md"]
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())?;
    let content = std::fs::read_to_string(readme).ok()?;
    let paragraph: Vec<&str> = content
        .lines()
        .skip_while(|line| line.trim().is_empty() || line.trim_start().starts_with('#'))
        .take_while(|line| !line.trim().is_empty())
        .collect();
    if paragraph.is_empty() {
        None
    } else {
        Some(paragraph.join(" "))
    }
}

fn read_git_branch(root: &Path) -> Option<String> {
    let head = std::fs::read_to_string(root.join(".git").join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_string)
        .or_else(|| Some(head.trim().chars().take(12).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seed(root: &Path) {
        fs::create_dir_all(root.join("src/services")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("src/services/auth.rs"), "pub fn login() {}").unwrap();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        fs::write(root.join("README.md"), "# Demo\n\nA retrieval demo project.\nSecond line.\n\nMore.\n").unwrap();
    }

    #[test]
    fn structure_renders_tree() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let tree = structure(dir.path(), None, &[]).unwrap();
        assert!(tree.contains("src/"));
        assert!(tree.contains("auth.rs"));
        assert!(tree.contains("Cargo.toml"));
    }

    #[test]
    fn claudeignore_hides_entries() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        fs::write(
            dir.path().join(CLAUDE_IGNORE_FILE),
            "# generated\nsrc/services/\n",
        )
        .unwrap();
        let tree = structure(dir.path(), None, &[]).unwrap();
        assert!(!tree.contains("auth.rs"));
        assert!(tree.contains("main.rs"));
    }

    #[test]
    fn exclude_patterns_apply() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let tree = structure(dir.path(), None, &["*.rs".to_string()]).unwrap();
        assert!(!tree.contains("main.rs"));
        assert!(tree.contains("Cargo.toml"));
    }

    #[test]
    fn depth_limit() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let tree = structure(dir.path(), Some(1), &[]).unwrap();
        assert!(tree.contains("src/"));
        assert!(!tree.contains("main.rs"));
    }

    #[test]
    fn summary_guesses_language_and_reads_readme() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let summary = summary(dir.path(), true, true, false).unwrap();
        assert_eq!(summary.languages[0].0, "rust");
        assert!(summary.frameworks.contains(&"cargo".to_string()));
        assert_eq!(
            summary.readme_first_paragraph.as_deref(),
            Some("A retrieval demo project. Second line.")
        );
    }
}
