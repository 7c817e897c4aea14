// Copyright 2024-2026 the Tern authors. MIT license.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ids::ImportRecordIndex;
use crate::ids::Loc;
use crate::ids::PartIndex;
use crate::ids::SourceIndex;
use crate::symbols::SymbolRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
  Js,
  Jsx,
  Ts,
  Tsx,
  Css,
  Json,
  Text,
  Base64,
  DataUrl,
  File,
}

impl LoaderKind {
  pub fn is_typescript(self) -> bool {
    matches!(self, LoaderKind::Ts | LoaderKind::Tsx)
  }

  pub fn is_css(self) -> bool {
    matches!(self, LoaderKind::Css)
  }

  /// Loaders whose module body is a single expression. The linker lowers
  /// these into synthetic exports instead of scanning statements.
  pub fn is_lazy_export(self) -> bool {
    matches!(
      self,
      LoaderKind::Json
        | LoaderKind::Text
        | LoaderKind::Base64
        | LoaderKind::DataUrl
        | LoaderKind::File
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportsKind {
  /// No exports of any kind were seen.
  #[default]
  None,
  /// Uses `exports` / `module.exports`.
  CommonJs,
  /// Uses `import` / `export` syntax.
  Esm,
  /// ESM whose `export *` reaches an external or CommonJS target, so the
  /// final export set is only known at runtime.
  EsmWithDynamicFallback,
}

impl ExportsKind {
  pub fn is_dynamic(self) -> bool {
    matches!(self, ExportsKind::EsmWithDynamicFallback)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
  /// `import ... from` / `export ... from` statement.
  Stmt,
  /// `require(...)` call.
  Require,
  /// `import(...)` expression.
  Dynamic,
  /// CSS `@import` rule.
  At,
}

impl ImportKind {
  pub fn as_metafile_str(self) -> &'static str {
    match self {
      ImportKind::Stmt => "import-statement",
      ImportKind::Require => "require-call",
      ImportKind::Dynamic => "dynamic-import",
      ImportKind::At => "import-rule",
    }
  }
}

#[derive(Debug, Clone)]
pub struct ImportRecord {
  pub path: String,
  pub kind: ImportKind,
  /// `None` means the import is external and survives into the output.
  pub source_index: Option<SourceIndex>,
  pub contains_import_star: bool,
  pub contains_default_alias: bool,
  /// The resolver mapped this path to `false` in a browser map.
  pub is_disabled: bool,
  /// CSS `@import` condition tokens; empty means unconditional.
  pub css_conditions: Vec<String>,

  // Set by the linker while binding imports.
  pub calls_runtime_require: bool,
  pub wrap_with_to_esm: bool,
  pub wrap_with_to_cjs: bool,
  pub calls_runtime_re_export_fn: bool,
}

impl ImportRecord {
  pub fn new(path: impl Into<String>, kind: ImportKind) -> Self {
    Self {
      path: path.into(),
      kind,
      source_index: None,
      contains_import_star: false,
      contains_default_alias: false,
      is_disabled: false,
      css_conditions: Vec::new(),
      calls_runtime_require: false,
      wrap_with_to_esm: false,
      wrap_with_to_cjs: false,
      calls_runtime_re_export_fn: false,
    }
  }

  pub fn resolved(path: impl Into<String>, kind: ImportKind, source: SourceIndex) -> Self {
    let mut record = Self::new(path, kind);
    record.source_index = Some(source);
    record
  }
}

#[derive(Debug, Clone)]
pub struct NamedImport {
  /// The imported name, e.g. `"foo"` in `import { foo } from ...` or
  /// `"default"`. A star import uses the alias `"*"`.
  pub alias: String,
  pub alias_loc: Loc,
  pub import_record_index: ImportRecordIndex,
  /// For property accesses synthesized off a star import, the star's ref.
  pub namespace_ref: Option<SymbolRef>,
  /// The import is re-exported by this file.
  pub is_exported: bool,
  /// Synthesized from a property access on an import star rather than
  /// written by the user; failures downgrade to warnings.
  pub is_generated: bool,
}

#[derive(Debug, Clone)]
pub struct NamedExport {
  pub sym: SymbolRef,
  pub alias_loc: Loc,
}

#[derive(Debug, Clone, Copy)]
pub struct DeclaredSymbol {
  pub sym: SymbolRef,
  pub is_top_level: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartDependency {
  pub source: SourceIndex,
  pub part: PartIndex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolUse {
  pub count_estimate: u32,
}

/// A group of top-level statements sharing a single tree-shaking fate.
#[derive(Debug, Clone, Default)]
pub struct Part {
  pub stmts: Vec<Stmt>,
  pub declared_symbols: Vec<DeclaredSymbol>,
  pub symbol_uses: FxHashMap<SymbolRef, SymbolUse>,
  /// Property names accessed off an import star in this part, folded into
  /// use counts during linking.
  pub import_symbol_property_uses: FxHashMap<SymbolRef, FxHashMap<String, SymbolUse>>,
  /// Symbols invoked as calls; identity and empty functions get their
  /// argument counts folded differently.
  pub symbol_call_uses: FxHashMap<SymbolRef, SymbolUse>,
  pub import_record_indices: Vec<ImportRecordIndex>,
  pub dependencies: Vec<PartDependency>,
  pub can_be_removed_if_unused: bool,
  pub force_tree_shaking: bool,
  pub is_live: bool,
}

impl Part {
  pub fn with_stmts(stmts: Vec<Stmt>) -> Self {
    Self {
      stmts,
      ..Default::default()
    }
  }
}

/// A printable fragment of output code. The linker never edits expression
/// trees; statement bodies and initializers are carried as pieces that the
/// printer renders with the renamer applied to every symbol occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
  Text(String),
  /// A reference printed as the symbol's final name.
  Ref(SymbolRef),
  /// Like `Ref`, but the symbol may carry a namespace alias, in which case
  /// it prints as `namespace.property` instead.
  ImportRef(SymbolRef),
  /// A `require(...)` call site. Prints as the target's wrapper invocation
  /// for bundled modules, or a runtime require for external ones.
  Require(ImportRecordIndex),
  /// An `import(...)` call site. Prints as a dynamic import of the target
  /// chunk's path placeholder under code splitting, and as an immediately
  /// resolved promise otherwise.
  DynamicImport(ImportRecordIndex),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Code {
  pub pieces: Vec<Piece>,
}

impl Code {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      pieces: vec![Piece::Text(text.into())],
    }
  }

  pub fn push_text(&mut self, text: impl Into<String>) -> &mut Self {
    self.pieces.push(Piece::Text(text.into()));
    self
  }

  pub fn push_ref(&mut self, sym: SymbolRef) -> &mut Self {
    self.pieces.push(Piece::Ref(sym));
    self
  }

  pub fn push_import_ref(&mut self, sym: SymbolRef) -> &mut Self {
    self.pieces.push(Piece::ImportRef(sym));
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
  Var,
  Let,
  Const,
}

impl LocalKind {
  pub fn keyword(self) -> &'static str {
    match self {
      LocalKind::Var => "var",
      LocalKind::Let => "let",
      LocalKind::Const => "const",
    }
  }
}

#[derive(Debug, Clone)]
pub struct LocalDecl {
  pub name: SymbolRef,
  pub value: Option<Code>,
}

/// One entry of an import or export clause: `name as alias`.
#[derive(Debug, Clone)]
pub struct ClauseItem {
  pub alias: String,
  pub name: SymbolRef,
}

#[derive(Debug, Clone)]
pub enum DefaultValue {
  /// `export default <expr>` — lowered to `var <default_name> = <expr>`.
  Expr(Code),
  /// `export default function/class ...` — the code declares the default
  /// name itself via a `Ref` piece.
  Decl(Code),
}

#[derive(Debug, Clone)]
pub enum Stmt {
  Directive(String),
  Import {
    record: ImportRecordIndex,
    default_name: Option<SymbolRef>,
    star_name: Option<SymbolRef>,
    items: Vec<ClauseItem>,
  },
  ExportStar {
    record: ImportRecordIndex,
    /// `export * as alias from ...` keeps the generated namespace ref.
    alias: Option<ClauseItem>,
  },
  ExportFrom {
    record: ImportRecordIndex,
    namespace_ref: SymbolRef,
    items: Vec<ClauseItem>,
  },
  ExportClause {
    items: Vec<ClauseItem>,
  },
  ExportDefault {
    default_name: SymbolRef,
    value: DefaultValue,
  },
  Function {
    name: SymbolRef,
    is_export: bool,
    code: Code,
  },
  Class {
    name: SymbolRef,
    is_export: bool,
    code: Code,
  },
  Local {
    kind: LocalKind,
    is_export: bool,
    decls: Vec<LocalDecl>,
  },
  Expr(Code),
}

#[derive(Debug, Clone, Default)]
pub struct JsAst {
  pub parts: Vec<Part>,
  pub named_imports: FxHashMap<SymbolRef, NamedImport>,
  pub named_exports: FxHashMap<String, NamedExport>,
  pub export_star_import_records: Vec<ImportRecordIndex>,
  pub import_records: Vec<ImportRecord>,
  pub exports_kind: ExportsKind,
  pub exports_ref: SymbolRef,
  pub module_ref: SymbolRef,
  pub wrapper_ref: SymbolRef,
  /// Single-expression module body for lazy-export loaders.
  pub lazy_value: Option<serde_json::Value>,
  pub has_lazy_export: bool,
  pub top_level_await: bool,
  pub uses_exports_ref: bool,
  pub uses_module_ref: bool,
  pub hashbang: Option<String>,
  pub directive: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CssAst {
  pub import_records: Vec<ImportRecord>,
  /// Rule text after the leading `@import` block.
  pub source_code: String,
}

#[derive(Debug, Clone)]
pub enum FileRepr {
  Js(JsAst),
  Css(CssAst),
}

impl FileRepr {
  pub fn as_js(&self) -> Option<&JsAst> {
    match self {
      FileRepr::Js(ast) => Some(ast),
      FileRepr::Css(_) => None,
    }
  }

  pub fn as_js_mut(&mut self) -> Option<&mut JsAst> {
    match self {
      FileRepr::Js(ast) => Some(ast),
      FileRepr::Css(_) => None,
    }
  }

  pub fn as_css(&self) -> Option<&CssAst> {
    match self {
      FileRepr::Js(_) => None,
      FileRepr::Css(css) => Some(css),
    }
  }

  pub fn import_records(&self) -> &[ImportRecord] {
    match self {
      FileRepr::Js(ast) => &ast.import_records,
      FileRepr::Css(css) => &css.import_records,
    }
  }

  pub fn import_records_mut(&mut self) -> &mut Vec<ImportRecord> {
    match self {
      FileRepr::Js(ast) => &mut ast.import_records,
      FileRepr::Css(css) => &mut css.import_records,
    }
  }
}

/// Where a file's bytes came from, for hashing and the metafile. Files from
/// plugins or data URLs use a namespace other than `"file"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
  pub namespace: String,
  pub text: String,
}

impl KeyPath {
  pub fn file(text: impl Into<String>) -> Self {
    Self {
      namespace: "file".to_string(),
      text: text.into(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileSideEffects {
  #[default]
  HasSideEffects,
  /// `"sideEffects": false` in the owning package.json, or a pure
  /// annotation from the loader.
  NoSideEffects,
}

/// One input file of the module graph, as handed to the linker.
#[derive(Debug, Clone)]
pub struct InputFile {
  pub source: String,
  pub pretty_path: String,
  pub key_path: KeyPath,
  pub loader: LoaderKind,
  pub side_effects: FileSideEffects,
  /// `/*! ... */` and `@license` comments extracted by the parser, emitted
  /// per the legal-comments mode.
  pub legal_comments: Vec<String>,
  pub repr: FileRepr,
}

impl InputFile {
  pub fn js_ast(&self) -> &JsAst {
    self.repr.as_js().expect("expected a JS file")
  }

  pub fn js_ast_mut(&mut self) -> &mut JsAst {
    self.repr.as_js_mut().expect("expected a JS file")
  }
}
