//! Symbols
//!
//! The full structural projection of a source file. Functions additionally
//! get a `FunctionEntity` row for retrieval ergonomics.

use serde::{Deserialize, Serialize};

// ============================================================================
// SYMBOL KIND
// ============================================================================

/// Kinds of symbols the extractor produces
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    /// `class X`
    Class,
    /// `interface X`
    Interface,
    /// `type X = ...`
    Type,
    /// `enum X`
    Enum,
    /// Free function
    Function,
    /// Class method
    Method,
    /// Class property
    Property,
    /// `get x()`
    Getter,
    /// `set x(v)`
    Setter,
    /// `const X = ...` at module scope
    Const,
    /// `let`/`var` at module scope
    Variable,
    /// `namespace X`
    Namespace,
    /// `export { X } from './m'`
    ReExport,
    /// `export * from './m'`
    BarrelExport,
    /// `export default ...`
    DefaultExport,
}

impl SymbolKind {
    /// Storage string form (kebab-case, matching serde)
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Getter => "getter",
            SymbolKind::Setter => "setter",
            SymbolKind::Const => "const",
            SymbolKind::Variable => "variable",
            SymbolKind::Namespace => "namespace",
            SymbolKind::ReExport => "re-export",
            SymbolKind::BarrelExport => "barrel-export",
            SymbolKind::DefaultExport => "default-export",
        }
    }

    /// Parse the storage string form
    pub fn parse_name(s: &str) -> Option<Self> {
        Some(match s {
            "class" => SymbolKind::Class,
            "interface" => SymbolKind::Interface,
            "type" => SymbolKind::Type,
            "enum" => SymbolKind::Enum,
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "property" => SymbolKind::Property,
            "getter" => SymbolKind::Getter,
            "setter" => SymbolKind::Setter,
            "const" => SymbolKind::Const,
            "variable" => SymbolKind::Variable,
            "namespace" => SymbolKind::Namespace,
            "re-export" => SymbolKind::ReExport,
            "barrel-export" => SymbolKind::BarrelExport,
            "default-export" => SymbolKind::DefaultExport,
            _ => return None,
        })
    }

    /// Whether this kind also yields a `FunctionEntity`
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Getter | SymbolKind::Setter
        )
    }

    /// Whether this kind re-exports from another module
    pub fn is_reexport(&self) -> bool {
        matches!(self, SymbolKind::ReExport | SymbolKind::BarrelExport)
    }
}

/// Declared visibility; absent modifiers default to public
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymbolVisibility {
    /// No modifier or `public`
    #[default]
    Public,
    /// `private` or `#field`
    Private,
    /// `protected`
    Protected,
}

// ============================================================================
// SYMBOL ENTRY
// ============================================================================

/// One extracted symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    /// Declared name (alias for re-exports: `Y` in `export { X as Y }`)
    pub name: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Workspace-relative file path
    pub file: String,
    /// 1-indexed declaration line
    pub line: u32,
    /// 1-indexed end line when spanning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    /// Containing symbol name (class for methods, namespace for members)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// `<path-without-extension>:<symbol-name>`
    pub qualified_name: String,
    /// Whether the symbol is exported
    pub exported: bool,
    /// Visibility, defaulting to public
    #[serde(default)]
    pub visibility: SymbolVisibility,
    /// `async` modifier
    #[serde(default)]
    pub is_async: bool,
    /// `static` modifier
    #[serde(default)]
    pub is_static: bool,
    /// Decorator names applied to the symbol
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    /// Enclosing namespace, when any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Signature text for callables
    #[serde(default)]
    pub signature: String,
    /// JSDoc description, capped at 200 chars
    #[serde(default)]
    pub doc: String,
    /// Original name for `export { X as Y }`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    /// Source module for re-exports (`'./m'`), always set for re-export kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_module: Option<String>,
}

impl SymbolEntry {
    /// Build a minimal symbol; callers fill the rest
    pub fn new(name: impl Into<String>, kind: SymbolKind, file: &str, line: u32) -> Self {
        let name = name.into();
        Self {
            qualified_name: qualified_name(file, &name),
            name,
            kind,
            file: file.to_string(),
            line,
            end_line: None,
            parent: None,
            exported: false,
            visibility: SymbolVisibility::Public,
            is_async: false,
            is_static: false,
            decorators: Vec::new(),
            namespace: None,
            signature: String::new(),
            doc: String::new(),
            original_name: None,
            from_module: None,
        }
    }
}

/// Qualified name: `<path-without-extension>:<symbol-name>`
pub fn qualified_name(file: &str, symbol: &str) -> String {
    let stem = match file.rfind('.') {
        // Keep directory dots intact: only strip a dot after the final slash
        Some(idx) if idx > file.rfind('/').map_or(0, |s| s + 1) => &file[..idx],
        _ => file,
    };
    format!("{stem}:{symbol}")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            SymbolKind::Class,
            SymbolKind::ReExport,
            SymbolKind::BarrelExport,
            SymbolKind::DefaultExport,
            SymbolKind::Getter,
        ] {
            assert_eq!(SymbolKind::parse_name(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse_name("re-export"), Some(SymbolKind::ReExport));
        assert!(SymbolKind::parse_name("widget").is_none());
    }

    #[test]
    fn test_qualified_name_strips_extension() {
        assert_eq!(qualified_name("src/auth/token.ts", "Foo.bar"), "src/auth/token:Foo.bar");
        assert_eq!(qualified_name("src/v1.2/mod.ts", "x"), "src/v1.2/mod:x");
        assert_eq!(qualified_name("Makefile", "all"), "Makefile:all");
    }

    #[test]
    fn test_callable_kinds() {
        assert!(SymbolKind::Method.is_callable());
        assert!(SymbolKind::Getter.is_callable());
        assert!(!SymbolKind::Class.is_callable());
        assert!(SymbolKind::BarrelExport.is_reexport());
    }
}
