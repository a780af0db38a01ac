//! Explicit extractor registry.
//!
//! Built once at startup so the supported language set is visible and
//! testable, instead of accumulating through side effects at import
//! time. The registry is the only way parse requests reach the engine.

use crate::parsing::engine;
use crate::parsing::parser::ParsedFile;
use crate::parsing::specs::{LanguageSpec, all_specs};
use crate::parsing::Language;
use std::collections::HashMap;
use std::path::Path;

pub struct ParserRegistry {
    specs: HashMap<Language, LanguageSpec>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let mut specs = HashMap::new();
        for spec in all_specs() {
            specs.insert(spec.language, spec);
        }
        Self { specs }
    }

    /// Languages with a registered extraction table, sorted by name.
    pub fn supported(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.specs.keys().copied().collect();
        languages.sort_by_key(|l| l.name());
        languages
    }

    pub fn spec(&self, language: Language) -> Option<&LanguageSpec> {
        self.specs.get(&language)
    }

    /// Parse source for a known language. Unregistered languages yield
    /// an empty parse with `parse_success = false` — not an error.
    pub fn parse(&self, language: Language, code: &str) -> ParsedFile {
        match self.specs.get(&language) {
            Some(spec) => engine::extract(spec, code),
            None => ParsedFile::empty(language, code.lines().count() as u32),
        }
    }

    /// Detect the language from the path, then parse.
    pub fn parse_path(&self, path: &Path, code: &str) -> ParsedFile {
        match Language::from_path(path) {
            Some(language) => self.parse(language, code),
            None => ParsedFile::empty(Language::Unknown, code.lines().count() as u32),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_language_set() {
        let registry = ParserRegistry::new();
        let supported = registry.supported();
        for language in [
            Language::TypeScript,
            Language::JavaScript,
            Language::Python,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::Rust,
            Language::Go,
            Language::Ruby,
            Language::Php,
            Language::Kotlin,
            Language::Dart,
            Language::Bash,
            Language::Html,
            Language::Css,
            Language::Json,
            Language::Yaml,
            Language::Toml,
        ] {
            assert!(supported.contains(&language), "{language} missing");
        }
    }

    #[test]
    fn unknown_extension_is_empty_parse_not_error() {
        let registry = ParserRegistry::new();
        let parsed = registry.parse_path(Path::new("notes.xyz"), "whatever\n");
        assert!(!parsed.parse_success);
        assert!(parsed.diagnostics.is_empty());
        assert!(parsed.symbols.is_empty());
    }

    #[test]
    fn parse_path_detects_language() {
        let registry = ParserRegistry::new();
        let parsed = registry.parse_path(Path::new("lib.rs"), "pub fn f() {}\n");
        assert_eq!(parsed.language, Language::Rust);
        assert!(parsed.parse_success);
        assert_eq!(parsed.symbols.len(), 1);
    }
}
