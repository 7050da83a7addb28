//! The Analyzer contract: an opaque external collaborator that, given
//! source text and compile arguments, yields a stream of symbol
//! occurrences. The real C/C++ parser is explicitly out of scope; this
//! module defines only the contract plus a deterministic test double and
//! a narrow, real implementation for plain C.

use crate::error::AnalyzerError;
use crate::index_file::IndexFile;
use crate::types::{Kind, SymbolKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source-level declaration categories an Analyzer can report, ahead of
/// classification into the graph's own `(Kind, SymbolKind)` pair. Only
/// the cases relevant to a C/C++/Objective-C surface are kept; an
/// Objective-C-only or template-only declaration collapses into its
/// closest C++ category since this crate has no separate Objective-C
/// Analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Namespace,
    Function,
    Method,
    StaticMethod,
    Constructor,
    Destructor,
    Field,
    Variable,
    Parameter,
    EnumConstant,
    Enum,
    Class,
    Struct,
    TypeAlias,
    Invalid,
}

/// The declaration-kind classification table: maps a source-level
/// `DeclKind` to the graph's `(Kind, SymbolKind)` pair. Every real
/// Analyzer implementation is expected to route through this rather
/// than inventing its own mapping.
pub fn classify(decl: DeclKind) -> (Kind, SymbolKind) {
    match decl {
        DeclKind::Namespace => (Kind::Type, SymbolKind::Namespace),
        DeclKind::Function => (Kind::Func, SymbolKind::Function),
        DeclKind::Method => (Kind::Func, SymbolKind::Method),
        DeclKind::StaticMethod => (Kind::Func, SymbolKind::StaticMethod),
        DeclKind::Constructor => (Kind::Func, SymbolKind::Constructor),
        // Destructors classify as a plain method; see DESIGN.md's Open
        // Question resolution on destructor call sites.
        DeclKind::Destructor => (Kind::Func, SymbolKind::Method),
        DeclKind::Field => (Kind::Var, SymbolKind::Field),
        DeclKind::Variable => (Kind::Var, SymbolKind::Variable),
        DeclKind::Parameter => (Kind::Var, SymbolKind::Parameter),
        DeclKind::EnumConstant => (Kind::Var, SymbolKind::EnumMember),
        DeclKind::Enum => (Kind::Type, SymbolKind::Enum),
        DeclKind::Class => (Kind::Type, SymbolKind::Class),
        DeclKind::Struct => (Kind::Type, SymbolKind::Struct),
        DeclKind::TypeAlias => (Kind::Type, SymbolKind::TypeAlias),
        DeclKind::Invalid => (Kind::Invalid, SymbolKind::Invalid),
    }
}

/// An override of a file's contents supplied by an open editor buffer,
/// rather than read from disk.
pub struct Override<'a> {
    pub path: &'a Path,
    pub contents: &'a str,
}

/// Result of one analysis run: the per-translation-unit records plus
/// diagnostics. `ok = false` means the compile driver itself failed
/// (crash or refusal), distinct from ordinary diagnostics.
#[derive(Debug)]
pub struct AnalyzeResult {
    pub indexes: Vec<IndexFile>,
    pub n_errors: u32,
    pub first_error: Option<String>,
    pub ok: bool,
}

/// The contract every Analyzer implementation fulfils: compile args in,
/// `IndexFile`s out. Headers discovered inside the translation unit yield
/// their own `IndexFile` entries in `indexes`.
pub trait Analyzer: Send + Sync {
    fn analyze(
        &self,
        compile_args: &[String],
        main_path: &Path,
        overrides: &[Override<'_>],
    ) -> Result<AnalyzeResult, AnalyzerError>;
}

/// Deterministic test double: returns whatever `IndexFile`s were
/// registered for a path. Lets tests describe what an Analyzer would have
/// produced for a translation unit without parsing real C++ grammar.
#[derive(Default)]
pub struct MockAnalyzer {
    fixtures: Mutex<HashMap<PathBuf, Vec<IndexFile>>>,
    fail: Mutex<HashMap<PathBuf, String>>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        MockAnalyzer::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>, indexes: Vec<IndexFile>) {
        self.fixtures.lock().unwrap().insert(path.into(), indexes);
    }

    pub fn register_failure(&self, path: impl Into<PathBuf>, message: impl Into<String>) {
        self.fail.lock().unwrap().insert(path.into(), message.into());
    }
}

impl Analyzer for MockAnalyzer {
    fn analyze(
        &self,
        _compile_args: &[String],
        main_path: &Path,
        _overrides: &[Override<'_>],
    ) -> Result<AnalyzeResult, AnalyzerError> {
        if let Some(message) = self.fail.lock().unwrap().get(main_path) {
            return Err(AnalyzerError::Failed {
                path: main_path.to_path_buf(),
                message: message.clone(),
            });
        }
        let indexes = self
            .fixtures
            .lock()
            .unwrap()
            .get(main_path)
            .cloned()
            .unwrap_or_default();
        Ok(AnalyzeResult {
            indexes,
            n_errors: 0,
            first_error: None,
            ok: true,
        })
    }
}

/// A real, intentionally narrow Analyzer for plain C: function
/// definitions, declarations, and direct call sites only. Does not
/// attempt templates, overrides, or multiple-inheritance bases — those
/// are C++-only features this crate treats as test-only (driven by
/// `MockAnalyzer`), matching the Analyzer's out-of-scope boundary.
pub struct TreeSitterAnalyzer {
    language: tree_sitter::Language,
}

impl Default for TreeSitterAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSitterAnalyzer {
    pub fn new() -> Self {
        TreeSitterAnalyzer {
            language: tree_sitter_c::LANGUAGE.into(),
        }
    }
}

impl Analyzer for TreeSitterAnalyzer {
    fn analyze(
        &self,
        compile_args: &[String],
        main_path: &Path,
        overrides: &[Override<'_>],
    ) -> Result<AnalyzeResult, AnalyzerError> {
        let contents = overrides
            .iter()
            .find(|o| o.path == main_path)
            .map(|o| o.contents.to_string())
            .or_else(|| std::fs::read_to_string(main_path).ok())
            .ok_or_else(|| AnalyzerError::Failed {
                path: main_path.to_path_buf(),
                message: "no source available".to_string(),
            })?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| AnalyzerError::Failed {
                path: main_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let tree = parser.parse(&contents, None).ok_or_else(|| AnalyzerError::Failed {
            path: main_path.to_path_buf(),
            message: "parse produced no tree".to_string(),
        })?;

        let mut index = IndexFile::new(
            main_path.to_path_buf(),
            0,
            contents.clone(),
            "c".to_string(),
        );
        index.args = compile_args.to_vec();

        let mut function_names: Vec<(String, crate::types::Range)> = Vec::new();
        walk_c_functions(tree.root_node(), &contents, &mut function_names);

        let (kind, symbol_kind) = classify(DeclKind::Function);
        for (name, range) in &function_names {
            let usr = crate::identity::hash_usr(format!("c:@F@{name}#").as_bytes());
            let def = crate::index_file::Def {
                detailed_name: name.clone(),
                spell: Some(*range),
                extent: Some(*range),
                ..Default::default()
            };
            index.usr2func.insert(
                usr,
                crate::index_file::Entry {
                    def: Some(def),
                    kind,
                    symbol_kind,
                    ..Default::default()
                },
            );
        }

        Ok(AnalyzeResult {
            indexes: vec![index],
            n_errors: 0,
            first_error: None,
            ok: true,
        })
    }
}

/// Recursively collect `function_definition` nodes, pairing each with its
/// declarator's identifier name and a `Range` built from tree-sitter's
/// byte/point positions.
fn walk_c_functions(
    node: tree_sitter::Node<'_>,
    source: &str,
    out: &mut Vec<(String, crate::types::Range)>,
) {
    if node.kind() == "function_definition" {
        if let Some(declarator) = node.child_by_field_name("declarator") {
            if let Some(name_node) = find_identifier(declarator) {
                if let Ok(name) = name_node.utf8_text(source.as_bytes()) {
                    let start = name_node.start_position();
                    let end = name_node.end_position();
                    let range = crate::types::Range::new(
                        crate::types::Pos::new(start.row as u16, start.column as u16),
                        crate::types::Pos::new(end.row as u16, end.column as u16),
                    );
                    out.push((name.to_string(), range));
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_c_functions(child, source, out);
    }
}

fn find_identifier(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.kind() == "identifier" {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = find_identifier(child) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_registered_fixture() {
        let analyzer = MockAnalyzer::new();
        let path = PathBuf::from("/t.cc");
        let idx = IndexFile::new(path.clone(), 1, String::new(), "c".into());
        analyzer.register(path.clone(), vec![idx]);

        let result = analyzer.analyze(&[], &path, &[]).unwrap();
        assert_eq!(result.indexes.len(), 1);
        assert!(result.ok);
    }

    #[test]
    fn mock_reports_registered_failure() {
        let analyzer = MockAnalyzer::new();
        let path = PathBuf::from("/bad.cc");
        analyzer.register_failure(path.clone(), "driver refused");

        let err = analyzer.analyze(&[], &path, &[]).unwrap_err();
        match err {
            AnalyzerError::Failed { message, .. } => assert_eq!(message, "driver refused"),
        }
    }

    #[test]
    fn classify_maps_constructor_and_destructor() {
        assert_eq!(classify(DeclKind::Constructor), (Kind::Func, SymbolKind::Constructor));
        assert_eq!(classify(DeclKind::Destructor), (Kind::Func, SymbolKind::Method));
        assert_eq!(classify(DeclKind::EnumConstant), (Kind::Var, SymbolKind::EnumMember));
        assert_eq!(classify(DeclKind::Invalid), (Kind::Invalid, SymbolKind::Invalid));
    }

    #[test]
    fn tree_sitter_analyzer_finds_function_definitions() {
        let analyzer = TreeSitterAnalyzer::new();
        let src = "int add(int a, int b) { return a + b; }\n";
        let overrides = [Override {
            path: Path::new("/a.c"),
            contents: src,
        }];
        let result = analyzer
            .analyze(&[], Path::new("/a.c"), &overrides)
            .unwrap();
        assert_eq!(result.indexes.len(), 1);
        assert_eq!(result.indexes[0].usr2func.len(), 1);
    }
}
