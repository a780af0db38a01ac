//! Core identifier and position types shared across the retrieval engine.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(NonZeroU32);

impl FileId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

impl SymbolId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

/// Monotonic allocator for symbol ids within one parse pass.
#[derive(Debug)]
pub struct SymbolCounter(u32);

impl SymbolCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> SymbolId {
        self.0 += 1;
        SymbolId::new(self.0).expect("counter starts at 1")
    }
}

impl Default for SymbolCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Source position span. Lines and columns are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_column: u16,
    pub end_line: u32,
    pub end_column: u16,
}

impl Range {
    pub fn new(start_line: u32, start_column: u16, end_line: u32, end_column: u16) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Invariant check: start never follows end.
    pub fn is_ordered(&self) -> bool {
        (self.start_line, self.start_column) <= (self.end_line, self.end_column)
    }
}

/// Program entity kinds recognised by the extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Struct,
    Variable,
    Constant,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::TypeAlias => "type-alias",
            Self::Enum => "enum",
            Self::Struct => "struct",
            Self::Variable => "variable",
            Self::Constant => "constant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "type-alias" => Self::TypeAlias,
            "enum" => Self::Enum,
            "struct" => Self::Struct,
            "variable" => Self::Variable,
            "constant" => Self::Constant,
            _ => return None,
        })
    }

    /// True for the kinds that carry a definition boost in ranking.
    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Function | Self::Method | Self::Class)
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CompactString = Box<str>;

pub fn compact_string(s: &str) -> CompactString {
    s.into()
}

/// A named program entity located in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: CompactString,
    pub kind: SymbolKind,
    pub range: Range,
    pub exported: bool,
    /// Name of the enclosing symbol, if any (e.g. the class a method lives in).
    pub parent: Option<CompactString>,
    /// First declaration line, trimmed and length-capped. Present for
    /// functions and methods.
    pub signature: Option<Box<str>>,
}

impl Symbol {
    pub fn new(id: SymbolId, name: impl Into<CompactString>, kind: SymbolKind, range: Range) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            range,
            exported: false,
            parent: None,
            signature: None,
        }
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<CompactString>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<Box<str>>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// An import edge from a file to a module specifier, as written in source.
/// Resolution to a target file is a consumer concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub specifier: CompactString,
}

impl Import {
    pub fn new(specifier: impl Into<CompactString>) -> Self {
        Self {
            specifier: specifier.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_types_reject_zero() {
        assert!(FileId::new(0).is_none());
        assert!(SymbolId::new(0).is_none());
        assert_eq!(FileId::new(7).unwrap().value(), 7);
    }

    #[test]
    fn symbol_counter_is_monotonic() {
        let mut counter = SymbolCounter::new();
        let a = counter.next();
        let b = counter.next();
        assert!(b.value() > a.value());
    }

    #[test]
    fn range_ordering_invariant() {
        assert!(Range::new(1, 0, 1, 10).is_ordered());
        assert!(Range::new(1, 5, 3, 0).is_ordered());
        assert!(!Range::new(3, 0, 1, 0).is_ordered());
        // Same line, columns reversed
        assert!(!Range::new(2, 9, 2, 3).is_ordered());
    }

    #[test]
    fn symbol_kind_round_trips_through_str() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::TypeAlias,
            SymbolKind::Enum,
            SymbolKind::Struct,
            SymbolKind::Variable,
            SymbolKind::Constant,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("module"), None);
    }

    #[test]
    fn symbol_builder_chain() {
        let mut counter = SymbolCounter::new();
        let symbol = Symbol::new(
            counter.next(),
            "AuthService",
            SymbolKind::Class,
            Range::new(4, 0, 42, 1),
        )
        .exported(true)
        .with_signature("export class AuthService {");

        assert!(symbol.exported);
        assert_eq!(symbol.parent, None);
        assert_eq!(symbol.signature.as_deref(), Some("export class AuthService {"));
    }
}
