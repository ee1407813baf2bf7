//! Symbol Extraction
//!
//! Language-aware AST walk over TypeScript/JavaScript sources producing
//! `SymbolEntry`s plus the import specifiers and call references the graph
//! builder needs. Parsing uses tree-sitter; a parse failure degrades to an
//! empty structure rather than an error.

use serde_json::json;
use tree_sitter::{Node, Parser};

use crate::model::{
    content_hash, qualified_name, IngestionItem, ItemMetadata, SymbolEntry, SymbolKind,
    SymbolVisibility, TaxonomyTag,
};

use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// CONSTANTS
// ============================================================================

/// JSDoc descriptions are capped at this many characters
pub const MAX_DOC_LENGTH: usize = 200;

/// Signature text cap
const MAX_SIGNATURE_LENGTH: usize = 160;

/// Extensions the extractor understands
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mts", "cts"];

// ============================================================================
// FILE STRUCTURE
// ============================================================================

/// A call reference from one function to a named callee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRef {
    /// Qualified name of the calling function
    pub caller: String,
    /// Bare name of the callee
    pub callee: String,
}

/// Everything extracted from one source file
#[derive(Debug, Clone, Default)]
pub struct FileStructure {
    /// Workspace-relative path
    pub path: String,
    /// Content hash of the source text
    pub checksum: String,
    /// Extracted symbols in declaration order
    pub symbols: Vec<SymbolEntry>,
    /// Import specifiers as written (`./m`, `lodash`)
    pub imports: Vec<String>,
    /// Call references found in function bodies
    pub calls: Vec<CallRef>,
}

impl FileStructure {
    /// Names of exported symbols, in declaration order
    pub fn export_names(&self) -> Vec<String> {
        self.symbols
            .iter()
            .filter(|s| s.exported)
            .map(|s| s.name.clone())
            .collect()
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// TypeScript/JavaScript symbol extractor
#[derive(Debug, Default)]
pub struct SymbolExtractor;

impl SymbolExtractor {
    /// Create an extractor
    pub fn new() -> Self {
        Self
    }

    /// Whether a path looks like a source file this extractor handles
    pub fn handles(path: &str) -> bool {
        path.rsplit('.')
            .next()
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
    }

    /// Parse one file into its structure.
    ///
    /// An unparseable file yields an empty structure with the checksum set,
    /// so re-ingestion can still detect content changes.
    pub fn extract(&self, path: &str, source: &str) -> FileStructure {
        let mut structure = FileStructure {
            path: path.to_string(),
            checksum: content_hash(source),
            ..Default::default()
        };

        let mut parser = Parser::new();
        let language = if path.ends_with(".tsx") || path.ends_with(".jsx") {
            tree_sitter_typescript::language_tsx()
        } else {
            tree_sitter_typescript::language_typescript()
        };
        if parser.set_language(&language).is_err() {
            return structure;
        }
        let Some(tree) = parser.parse(source, None) else {
            return structure;
        };

        let mut walker = Walker {
            path,
            source,
            structure: &mut structure,
        };
        walker.walk_container(tree.root_node(), None, false);
        structure
    }
}

struct Walker<'a> {
    path: &'a str,
    source: &'a str,
    structure: &'a mut FileStructure,
}

impl<'a> Walker<'a> {
    /// Walk a program or namespace body, dispatching statements
    fn walk_container(&mut self, container: Node<'_>, namespace: Option<&str>, all_exported: bool) {
        let mut cursor = container.walk();
        let children: Vec<Node<'_>> = container.named_children(&mut cursor).collect();
        for node in children {
            match node.kind() {
                "import_statement" => self.collect_import(node),
                "export_statement" => self.handle_export(node, namespace),
                "expression_statement" | "comment" => {}
                _ => self.extract_declaration(node, namespace, all_exported, &[]),
            }
        }
    }

    fn collect_import(&mut self, node: Node<'_>) {
        if let Some(source_node) = node.child_by_field_name("source") {
            self.structure.imports.push(string_content(source_node, self.source));
        }
    }

    /// `export ...` statements: wrapped declarations, re-exports, barrels,
    /// defaults
    fn handle_export(&mut self, node: Node<'_>, namespace: Option<&str>) {
        let decorators = preceding_decorators(node, self.source);
        // JSDoc sits before the export statement, not the wrapped
        // declaration
        let doc = preceding_doc(node, self.source);
        let from_module = node
            .child_by_field_name("source")
            .map(|n| string_content(n, self.source));
        let line = node.start_position().row as u32 + 1;

        // export class X / export function f / export const c ...
        if let Some(declaration) = node.child_by_field_name("declaration") {
            let is_default = has_token(node, "default");
            if is_default {
                let name = declaration
                    .child_by_field_name("name")
                    .map(|n| node_text(n, self.source))
                    .unwrap_or_else(|| "default".to_string());
                self.push_symbol(make_symbol(
                    self.path,
                    &name,
                    SymbolKind::DefaultExport,
                    line,
                    namespace,
                ));
            }
            self.extract_declaration_with_doc(declaration, namespace, true, &decorators, doc);
            return;
        }

        // export * from './m'  (barrel)
        if from_module.is_some() && (has_token(node, "*") || child_of_kind(node, "namespace_export").is_some()) {
            let name = child_of_kind(node, "namespace_export")
                .and_then(|n| n.named_child(0))
                .map(|n| node_text(n, self.source))
                .unwrap_or_else(|| "*".to_string());
            let mut symbol = make_symbol(self.path, &name, SymbolKind::BarrelExport, line, namespace);
            symbol.exported = true;
            symbol.from_module = from_module;
            self.push_symbol(symbol);
            return;
        }

        // export { X, Y as Z } [from './m']
        if let Some(clause) = child_of_kind(node, "export_clause") {
            let mut cursor = clause.walk();
            for specifier in clause.named_children(&mut cursor) {
                if specifier.kind() != "export_specifier" {
                    continue;
                }
                let original = specifier
                    .child_by_field_name("name")
                    .map(|n| node_text(n, self.source))
                    .unwrap_or_default();
                let alias = specifier
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, self.source));
                let name = alias.clone().unwrap_or_else(|| original.clone());

                if let Some(from) = &from_module {
                    let mut symbol = make_symbol(
                        self.path,
                        &name,
                        SymbolKind::ReExport,
                        specifier.start_position().row as u32 + 1,
                        namespace,
                    );
                    symbol.exported = true;
                    symbol.original_name = Some(original);
                    symbol.from_module = Some(from.clone());
                    self.push_symbol(symbol);
                } else {
                    // Plain `export { X }` marks the earlier declaration
                    for symbol in self.structure.symbols.iter_mut() {
                        if symbol.name == original {
                            symbol.exported = true;
                        }
                    }
                }
            }
            return;
        }

        // export default <expression>
        if has_token(node, "default") {
            self.push_symbol({
                let mut symbol =
                    make_symbol(self.path, "default", SymbolKind::DefaultExport, line, namespace);
                symbol.exported = true;
                symbol
            });
        }
    }

    /// One declaration node, possibly inside a namespace or export
    fn extract_declaration(
        &mut self,
        node: Node<'_>,
        namespace: Option<&str>,
        exported: bool,
        extra_decorators: &[String],
    ) {
        let doc = preceding_doc(node, self.source);
        self.extract_declaration_with_doc(node, namespace, exported, extra_decorators, doc);
    }

    fn extract_declaration_with_doc(
        &mut self,
        node: Node<'_>,
        namespace: Option<&str>,
        exported: bool,
        extra_decorators: &[String],
        inherited_doc: String,
    ) {
        let line = node.start_position().row as u32 + 1;
        let own_doc = preceding_doc(node, self.source);
        let doc = if own_doc.is_empty() { inherited_doc } else { own_doc };

        match node.kind() {
            "class_declaration" | "abstract_class_declaration" => {
                let Some(name) = named_text(node, self.source) else { return };
                let mut symbol = make_symbol(self.path, &name, SymbolKind::Class, line, namespace);
                symbol.end_line = Some(node.end_position().row as u32 + 1);
                symbol.exported = exported;
                symbol.doc = doc;
                symbol.decorators = {
                    let mut decorators = extra_decorators.to_vec();
                    decorators.extend(preceding_decorators(node, self.source));
                    decorators
                };
                self.push_symbol(symbol);

                if let Some(body) = node.child_by_field_name("body") {
                    self.walk_class_body(body, &name, namespace);
                }
            }
            "interface_declaration" => {
                self.push_named(node, SymbolKind::Interface, namespace, exported, doc);
            }
            "type_alias_declaration" => {
                self.push_named(node, SymbolKind::Type, namespace, exported, doc);
            }
            "enum_declaration" => {
                self.push_named(node, SymbolKind::Enum, namespace, exported, doc);
            }
            "function_declaration" | "generator_function_declaration" => {
                let Some(name) = named_text(node, self.source) else { return };
                let mut symbol = make_symbol(self.path, &name, SymbolKind::Function, line, namespace);
                symbol.end_line = Some(node.end_position().row as u32 + 1);
                symbol.exported = exported;
                symbol.is_async = has_token(node, "async");
                symbol.signature = signature_text(node, self.source);
                symbol.doc = doc;
                let caller = qualified_name(self.path, &symbol.name);
                self.push_symbol(symbol);
                self.collect_calls(node, &caller);
            }
            "lexical_declaration" | "variable_declaration" => {
                let kind = if has_token(node, "const") {
                    SymbolKind::Const
                } else {
                    SymbolKind::Variable
                };
                let mut cursor = node.walk();
                for declarator in node.named_children(&mut cursor) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let Some(name_node) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    let name = node_text(name_node, self.source);
                    let mut symbol = make_symbol(self.path, &name, kind, line, namespace);
                    symbol.exported = exported;
                    symbol.doc = doc.clone();
                    self.push_symbol(symbol);

                    // Arrow functions assigned to consts still count as callables
                    if let Some(value) = declarator.child_by_field_name("value") {
                        if value.kind() == "arrow_function" || value.kind() == "function_expression" {
                            self.collect_calls(value, &qualified_name(self.path, &name));
                        }
                    }
                }
            }
            "internal_module" => {
                let Some(name) = named_text(node, self.source) else { return };
                let mut symbol =
                    make_symbol(self.path, &name, SymbolKind::Namespace, line, namespace);
                symbol.exported = exported;
                let full = symbol.name.clone();
                self.push_symbol(symbol);

                if let Some(body) = node.child_by_field_name("body") {
                    self.walk_container(body, Some(&full), exported);
                }
            }
            _ => {}
        }
    }

    fn push_named(
        &mut self,
        node: Node<'_>,
        kind: SymbolKind,
        namespace: Option<&str>,
        exported: bool,
        doc: String,
    ) {
        let Some(name) = named_text(node, self.source) else { return };
        let mut symbol = make_symbol(
            self.path,
            &name,
            kind,
            node.start_position().row as u32 + 1,
            namespace,
        );
        symbol.end_line = Some(node.end_position().row as u32 + 1);
        symbol.exported = exported;
        symbol.doc = doc;
        self.push_symbol(symbol);
    }

    /// Methods, properties, getters, setters inside a class body
    fn walk_class_body(&mut self, body: Node<'_>, class_name: &str, namespace: Option<&str>) {
        let mut cursor = body.walk();
        let members: Vec<Node<'_>> = body.named_children(&mut cursor).collect();
        for member in members {
            let line = member.start_position().row as u32 + 1;
            match member.kind() {
                "method_definition" => {
                    let Some(name_node) = member.child_by_field_name("name") else { continue };
                    let name = node_text(name_node, self.source);
                    let kind = if has_token(member, "get") {
                        SymbolKind::Getter
                    } else if has_token(member, "set") {
                        SymbolKind::Setter
                    } else {
                        SymbolKind::Method
                    };

                    let qualified = format!("{class_name}.{name}");
                    let mut symbol = SymbolEntry::new(name.clone(), kind, self.path, line);
                    symbol.qualified_name = qualified_name(self.path, &qualified);
                    symbol.end_line = Some(member.end_position().row as u32 + 1);
                    symbol.parent = Some(class_name.to_string());
                    symbol.namespace = namespace.map(str::to_string);
                    symbol.is_async = has_token(member, "async");
                    symbol.is_static = has_token(member, "static");
                    symbol.visibility = member_visibility(member, self.source);
                    symbol.signature = signature_text(member, self.source);
                    symbol.doc = preceding_doc(member, self.source);
                    symbol.decorators = preceding_decorators(member, self.source);
                    self.push_symbol(symbol);
                    self.collect_calls(member, &qualified_name(self.path, &qualified));
                }
                "public_field_definition" => {
                    let Some(name_node) = member.child_by_field_name("name") else { continue };
                    let name = node_text(name_node, self.source);
                    let mut symbol =
                        SymbolEntry::new(name.clone(), SymbolKind::Property, self.path, line);
                    symbol.qualified_name =
                        qualified_name(self.path, &format!("{class_name}.{name}"));
                    symbol.parent = Some(class_name.to_string());
                    symbol.namespace = namespace.map(str::to_string);
                    symbol.is_static = has_token(member, "static");
                    symbol.visibility = member_visibility(member, self.source);
                    symbol.decorators = preceding_decorators(member, self.source);
                    self.push_symbol(symbol);
                }
                _ => {}
            }
        }
    }

    /// Call expressions inside a function body, attributed to the caller
    fn collect_calls(&mut self, scope: Node<'_>, caller: &str) {
        let mut stack = vec![scope];
        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = match function.kind() {
                        "identifier" => Some(node_text(function, self.source)),
                        "member_expression" => function
                            .child_by_field_name("property")
                            .map(|p| node_text(p, self.source)),
                        _ => None,
                    };
                    if let Some(callee) = callee {
                        self.structure.calls.push(CallRef {
                            caller: caller.to_string(),
                            callee,
                        });
                    }
                }
            }
            for i in (0..node.named_child_count()).rev() {
                if let Some(child) = node.named_child(i) {
                    stack.push(child);
                }
            }
        }
    }

    fn push_symbol(&mut self, symbol: SymbolEntry) {
        self.structure.symbols.push(symbol);
    }
}

// ============================================================================
// NODE HELPERS
// ============================================================================

fn node_text(node: Node<'_>, source: &str) -> String {
    source[node.start_byte()..node.end_byte()].to_string()
}

fn named_text(node: Node<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("name").map(|n| node_text(n, source))
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == kind {
                return Some(child);
            }
        }
    }
    None
}

/// Whether a token (keyword or punctuation) appears among direct children
fn has_token(node: Node<'_>, token: &str) -> bool {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == token {
                return true;
            }
        }
    }
    false
}

/// Text inside a string literal node, quotes stripped
fn string_content(node: Node<'_>, source: &str) -> String {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == "string_fragment" {
                return node_text(child, source);
            }
        }
    }
    node_text(node, source).trim_matches(['\'', '"', '`']).to_string()
}

/// Declaration text up to the body, single-line, capped
fn signature_text(node: Node<'_>, source: &str) -> String {
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    let raw = &source[node.start_byte()..end];
    let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim().trim_end_matches('{').trim_end();
    let mut signature = trimmed.to_string();
    if signature.len() > MAX_SIGNATURE_LENGTH {
        signature.truncate(MAX_SIGNATURE_LENGTH);
    }
    signature
}

/// JSDoc comment immediately preceding a node, cleaned and capped
fn preceding_doc(node: Node<'_>, source: &str) -> String {
    let Some(previous) = node.prev_sibling() else {
        return String::new();
    };
    if previous.kind() != "comment" {
        return String::new();
    }
    let raw = node_text(previous, source);
    if !raw.starts_with("/**") {
        return String::new();
    }
    let mut doc = raw
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty() && !line.starts_with('@'))
        .collect::<Vec<_>>()
        .join(" ");
    if doc.len() > MAX_DOC_LENGTH {
        doc.truncate(MAX_DOC_LENGTH);
    }
    doc
}

/// Decorator names directly preceding a declaration or member
fn preceding_decorators(node: Node<'_>, source: &str) -> Vec<String> {
    let mut decorators = Vec::new();
    // Decorators can be children (class members) or preceding siblings
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == "decorator" {
                decorators.push(node_text(child, source).trim_start_matches('@').to_string());
            }
        }
    }
    let mut previous = node.prev_sibling();
    while let Some(p) = previous {
        if p.kind() == "decorator" {
            decorators.insert(0, node_text(p, source).trim_start_matches('@').to_string());
            previous = p.prev_sibling();
        } else {
            break;
        }
    }
    decorators
}

fn member_visibility(node: Node<'_>, source: &str) -> SymbolVisibility {
    if let Some(modifier) = child_of_kind(node, "accessibility_modifier") {
        match node_text(modifier, source).as_str() {
            "private" => SymbolVisibility::Private,
            "protected" => SymbolVisibility::Protected,
            _ => SymbolVisibility::Public,
        }
    } else {
        SymbolVisibility::Public
    }
}

/// Namespace members carry the namespace prefix in their name
fn make_symbol(
    path: &str,
    name: &str,
    kind: SymbolKind,
    line: u32,
    namespace: Option<&str>,
) -> SymbolEntry {
    let full_name = match namespace {
        Some(ns) => format!("{ns}.{name}"),
        None => name.to_string(),
    };
    let mut symbol = SymbolEntry::new(full_name, kind, path, line);
    symbol.namespace = namespace.map(str::to_string);
    symbol
}

// ============================================================================
// INGESTION SOURCE
// ============================================================================

/// Symbols as an ingestion source: one item per source file, carrying the
/// extraction summary. The bootstrap pipeline also drives the extractor
/// directly during `parse_symbols`.
#[derive(Debug, Default)]
pub struct SymbolsSource;

#[async_trait::async_trait]
impl IngestionSource for SymbolsSource {
    fn source_type(&self) -> &'static str {
        "symbols"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("symbolCount").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let extractor = SymbolExtractor::new();
        let mut output = SourceOutput::default();

        for file in ctx.files_with_extension(SOURCE_EXTENSIONS) {
            let source = match ctx.read_file(&file) {
                Ok(source) => source,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let structure = extractor.extract(&file, &source);
            let payload = json!({
                "path": structure.path,
                "symbolCount": structure.symbols.len(),
                "exports": structure.export_names(),
                "imports": structure.imports,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: structure.checksum.clone(),
                    taxonomy: vec![TaxonomyTag::CodeStructure],
                    path: Some(file),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> FileStructure {
        SymbolExtractor::new().extract("src/sample.ts", source)
    }

    fn find<'s>(structure: &'s FileStructure, name: &str, kind: SymbolKind) -> &'s SymbolEntry {
        structure
            .symbols
            .iter()
            .find(|s| s.name == name && s.kind == kind)
            .unwrap_or_else(|| panic!("symbol {name} ({kind:?}) not found in {:#?}", structure.symbols))
    }

    #[test]
    fn test_class_with_method() {
        let structure = extract("class Foo { bar(): number { return 1; } }");

        let class = find(&structure, "Foo", SymbolKind::Class);
        assert_eq!(class.line, 1);
        assert_eq!(class.qualified_name, "src/sample:Foo");

        let method = find(&structure, "bar", SymbolKind::Method);
        assert_eq!(method.parent.as_deref(), Some("Foo"));
        assert_eq!(method.qualified_name, "src/sample:Foo.bar");
        assert_eq!(method.visibility, SymbolVisibility::Public);
    }

    #[test]
    fn test_re_export_with_alias() {
        let structure = extract("export { X as Y } from './m';");
        let symbol = find(&structure, "Y", SymbolKind::ReExport);
        assert_eq!(symbol.original_name.as_deref(), Some("X"));
        assert_eq!(symbol.from_module.as_deref(), Some("./m"));
        assert!(symbol.exported);
    }

    #[test]
    fn test_barrel_export() {
        let structure = extract("export * from './models';");
        let symbol = &structure.symbols[0];
        assert_eq!(symbol.kind, SymbolKind::BarrelExport);
        assert_eq!(symbol.from_module.as_deref(), Some("./models"));
    }

    #[test]
    fn test_exported_function_with_async() {
        let structure = extract("export async function fetchData(url: string): Promise<void> {}");
        let symbol = find(&structure, "fetchData", SymbolKind::Function);
        assert!(symbol.exported);
        assert!(symbol.is_async);
        assert!(symbol.signature.contains("fetchData"));
    }

    #[test]
    fn test_interface_type_enum() {
        let structure = extract(
            "export interface Shape { area(): number }\n\
             type Point = { x: number };\n\
             enum Color { Red, Green }",
        );
        assert!(find(&structure, "Shape", SymbolKind::Interface).exported);
        assert!(!find(&structure, "Point", SymbolKind::Type).exported);
        find(&structure, "Color", SymbolKind::Enum);
    }

    #[test]
    fn test_getter_setter_static_private() {
        let structure = extract(
            "class Box {\n\
               private _v = 0;\n\
               get value(): number { return this._v; }\n\
               set value(v: number) { this._v = v; }\n\
               static make(): Box { return new Box(); }\n\
             }",
        );
        find(&structure, "value", SymbolKind::Getter);
        find(&structure, "value", SymbolKind::Setter);
        let factory = find(&structure, "make", SymbolKind::Method);
        assert!(factory.is_static);
        let field = find(&structure, "_v", SymbolKind::Property);
        assert_eq!(field.visibility, SymbolVisibility::Private);
    }

    #[test]
    fn test_namespace_members_prefixed() {
        let structure = extract("namespace Geo { export function dist(): number { return 0; } }");
        find(&structure, "Geo", SymbolKind::Namespace);
        let member = find(&structure, "Geo.dist", SymbolKind::Function);
        assert_eq!(member.namespace.as_deref(), Some("Geo"));
    }

    #[test]
    fn test_jsdoc_attaches_through_export() {
        let structure = extract(
            "/** Enforce request rate limiting per client. */\n\
             export function checkRateLimit(clientId: string): boolean { return true; }",
        );
        let symbol = find(&structure, "checkRateLimit", SymbolKind::Function);
        assert_eq!(symbol.doc, "Enforce request rate limiting per client.");
        assert!(symbol.exported);
    }

    #[test]
    fn test_jsdoc_capped_and_cleaned() {
        let long_line = "word ".repeat(80);
        let source = format!("/** {long_line} */\nfunction documented() {{}}");
        let structure = extract(&source);
        let symbol = find(&structure, "documented", SymbolKind::Function);
        assert!(symbol.doc.len() <= MAX_DOC_LENGTH);
        assert!(symbol.doc.starts_with("word"));
    }

    #[test]
    fn test_imports_and_calls_collected() {
        let structure = extract(
            "import { helper } from './util';\n\
             import fs from 'fs';\n\
             export function work() { helper(); fs.readFile('x'); }",
        );
        assert_eq!(structure.imports, vec!["./util", "fs"]);
        assert!(structure
            .calls
            .iter()
            .any(|c| c.caller == "src/sample:work" && c.callee == "helper"));
        assert!(structure
            .calls
            .iter()
            .any(|c| c.callee == "readFile"));
    }

    #[test]
    fn test_const_and_default_export() {
        let structure = extract("export const LIMIT = 10;\nexport default LIMIT;");
        assert!(find(&structure, "LIMIT", SymbolKind::Const).exported);
        assert!(structure
            .symbols
            .iter()
            .any(|s| s.kind == SymbolKind::DefaultExport));
    }

    #[test]
    fn test_decorators_on_class() {
        let structure = extract("@Injectable()\nexport class Service {}");
        let class = find(&structure, "Service", SymbolKind::Class);
        assert!(class
            .decorators
            .iter()
            .any(|d| d.starts_with("Injectable")));
    }

    #[test]
    fn test_unparseable_input_degrades() {
        let structure = extract("@@@@ not typescript @@@@");
        assert!(!structure.checksum.is_empty());
    }

    #[test]
    fn test_arrow_const_calls_attributed() {
        let structure = extract("const go = async () => { helper(); };");
        assert!(structure
            .calls
            .iter()
            .any(|c| c.caller == "src/sample:go" && c.callee == "helper"));
    }
}
