//! Language detection from file extensions and well-known basenames.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the extractor registry knows about.
///
/// `Binary` tags non-UTF-8 files; it is never parsed. Dart is detected
/// but has no grammar wired in (see DESIGN.md), so Dart files record an
/// empty parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Java,
    C,
    Cpp,
    Rust,
    Go,
    Ruby,
    Php,
    Kotlin,
    Dart,
    Bash,
    Html,
    Css,
    Json,
    Yaml,
    Toml,
    /// Text file with no detected language.
    Unknown,
    Binary,
}

impl Language {
    /// Detect from a lowercase file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        Some(match ext.as_str() {
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "py" | "pyi" => Self::Python,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "rb" | "rake" | "gemspec" => Self::Ruby,
            "php" | "php5" | "php7" | "php8" | "phtml" => Self::Php,
            "kt" | "kts" => Self::Kotlin,
            "dart" => Self::Dart,
            "sh" | "bash" | "zsh" => Self::Bash,
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            _ => return None,
        })
    }

    /// Detect from a path: basename first, then extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            match name {
                ".bashrc" | ".bash_profile" | ".zshrc" | ".profile" => return Some(Self::Bash),
                "Gemfile" | "Rakefile" => return Some(Self::Ruby),
                _ => {}
            }
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Kotlin => "kotlin",
            Self::Dart => "dart",
            Self::Bash => "bash",
            Self::Html => "html",
            Self::Css => "css",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Unknown => "unknown",
            Self::Binary => "binary",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        Some(match s {
            "typescript" => Self::TypeScript,
            "javascript" => Self::JavaScript,
            "python" => Self::Python,
            "java" => Self::Java,
            "c" => Self::C,
            "cpp" => Self::Cpp,
            "rust" => Self::Rust,
            "go" => Self::Go,
            "ruby" => Self::Ruby,
            "php" => Self::Php,
            "kotlin" => Self::Kotlin,
            "dart" => Self::Dart,
            "bash" => Self::Bash,
            "html" => Self::Html,
            "css" => Self::Css,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            "unknown" => Self::Unknown,
            "binary" => Self::Binary,
            _ => return None,
        })
    }

    /// True for languages where source code symbols make sense (used to
    /// decide whether a knowledge memory gets a keyword-index entry).
    pub fn is_code(&self) -> bool {
        !matches!(
            self,
            Self::Unknown | Self::Binary | Self::Json | Self::Yaml | Self::Toml | Self::Html | Self::Css
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection() {
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("jsx"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("h"), Some(Language::C));
        assert_eq!(Language::from_extension("yml"), Some(Language::Yaml));
        assert_eq!(Language::from_extension("exe"), None);
    }

    #[test]
    fn basename_detection_wins_over_extension() {
        assert_eq!(Language::from_path(Path::new("Gemfile")), Some(Language::Ruby));
        assert_eq!(Language::from_path(Path::new(".bashrc")), Some(Language::Bash));
        assert_eq!(
            Language::from_path(Path::new("src/services/AuthService.ts")),
            Some(Language::TypeScript)
        );
        assert_eq!(Language::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn name_round_trips() {
        for lang in [
            Language::TypeScript,
            Language::Rust,
            Language::Go,
            Language::Dart,
            Language::Toml,
            Language::Binary,
        ] {
            assert_eq!(Language::parse_name(lang.name()), Some(lang));
        }
    }
}
