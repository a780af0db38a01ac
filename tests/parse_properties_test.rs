//! Parser properties across languages: reparse idempotence, resolved
//! positions, and robustness to syntax errors.

use lodestone::parsing::{Language, ParserRegistry};

fn samples() -> Vec<(Language, &'static str)> {
    vec![
        (
            Language::Rust,
            "use std::fs;\n\npub struct Store;\n\nimpl Store {\n    pub fn open() -> Self { Store }\n}\n\npub const LIMIT: usize = 8;\n",
        ),
        (
            Language::TypeScript,
            "import { api } from \"./api\";\n\nexport interface User { name: string }\n\nexport function load(): User {\n    return { name: \"x\" };\n}\n",
        ),
        (
            Language::Python,
            "import json\n\nVERSION = \"2.0\"\n\nclass Loader:\n    def read(self, path):\n        return json.loads(path)\n",
        ),
        (
            Language::Go,
            "package store\n\nimport \"errors\"\n\ntype Store struct{}\n\nfunc Open() (*Store, error) { return nil, errors.New(\"no\") }\n",
        ),
        (
            Language::Java,
            "import java.util.List;\n\npublic class Repo {\n    public List<String> all() { return null; }\n}\n",
        ),
        (
            Language::C,
            "#include <stdio.h>\n\nstruct point { int x; int y; };\n\nint add(int a, int b) { return a + b; }\n",
        ),
        (
            Language::Ruby,
            "require 'json'\n\nVERSION = '1.0'\n\nclass Parser\n  def parse(text)\n    JSON.parse(text)\n  end\nend\n",
        ),
        (
            Language::Bash,
            "source ./env.sh\n\nRETRIES=3\n\nbuild() {\n  echo building\n}\n",
        ),
        (
            Language::Json,
            "{\"name\": \"demo\", \"scripts\": {\"build\": \"make\"}}\n",
        ),
        (
            Language::Toml,
            "[package]\nname = \"demo\"\n\n[dependencies]\nserde = \"1\"\n",
        ),
    ]
}

#[test]
fn reparsing_yields_bit_identical_output() {
    let registry = ParserRegistry::new();
    for (language, code) in samples() {
        let first = registry.parse(language, code);
        let second = registry.parse(language, code);
        assert_eq!(first.symbols, second.symbols, "{language} symbols drifted");
        assert_eq!(first.imports, second.imports, "{language} imports drifted");
        assert_eq!(first.exports, second.exports, "{language} exports drifted");
        assert_eq!(
            first.diagnostics, second.diagnostics,
            "{language} diagnostics drifted"
        );
    }
}

#[test]
fn every_symbol_has_resolved_ordered_positions() {
    let registry = ParserRegistry::new();
    for (language, code) in samples() {
        let parsed = registry.parse(language, code);
        assert!(
            parsed.parse_success,
            "{language} sample should parse cleanly: {:?}",
            parsed.diagnostics
        );
        for symbol in &parsed.symbols {
            assert!(symbol.range.is_ordered(), "{language} {:?}", symbol.name);
            assert!(
                symbol.range.end_line <= parsed.line_count,
                "{language} symbol {} ends at {} beyond {} lines",
                symbol.name,
                symbol.range.end_line,
                parsed.line_count
            );
            assert!(!symbol.name.is_empty());
        }
    }
}

#[test]
fn each_sample_extracts_something() {
    let registry = ParserRegistry::new();
    for (language, code) in samples() {
        let parsed = registry.parse(language, code);
        assert!(
            !parsed.symbols.is_empty(),
            "{language} extracted no symbols"
        );
    }
}

#[test]
fn unterminated_string_still_yields_earlier_symbols() {
    let registry = ParserRegistry::new();
    let code = "export class Early {\n    run(): void {}\n}\n\nexport function later(): string {\n    return \"unterminated\n}\n";
    let parsed = registry.parse(Language::TypeScript, code);

    assert!(!parsed.parse_success);
    assert!(
        !parsed.diagnostics.is_empty(),
        "a parse failure must be recorded in diagnostics"
    );
    assert!(
        parsed.symbols.iter().any(|s| s.name.as_ref() == "Early"),
        "symbols before the error location must survive"
    );
    for symbol in &parsed.symbols {
        assert!(symbol.range.is_ordered());
        assert!(symbol.range.end_line <= parsed.line_count);
    }
}

#[test]
fn imports_survive_sibling_errors() {
    let registry = ParserRegistry::new();
    let code = "import os\n\ndef good():\n    pass\n\ndef broken(:\n    pass\n";
    let parsed = registry.parse(Language::Python, code);

    assert!(!parsed.parse_success);
    assert!(parsed.imports.iter().any(|i| i.specifier.as_ref() == "os"));
    assert!(parsed.symbols.iter().any(|s| s.name.as_ref() == "good"));
}
