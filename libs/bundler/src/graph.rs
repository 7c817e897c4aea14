// Copyright 2024-2026 the Tern authors. MIT license.

//! The linker's mutable view of the module graph.
//!
//! Input files and the symbol table are cloned once up front; everything
//! the linker learns lives in the per-file [`LinkerMeta`] record or in the
//! symbol table, never in the ASTs' expression trees.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use tern_common::BitSet;
use tern_common::FileRepr;
use tern_common::ImportRecordIndex;
use tern_common::InputFile;
use tern_common::JsAst;
use tern_common::Loc;
use tern_common::PartDependency;
use tern_common::PartIndex;
use tern_common::SourceIndex;
use tern_common::SymbolRef;
use tern_common::SymbolTable;
use tern_common::RUNTIME_SOURCE_INDEX;

use crate::runtime;
use crate::runtime::RuntimeSymbols;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapKind {
  #[default]
  None,
  /// Body becomes `var require_foo = __commonJS(...)`.
  Cjs,
  /// Body becomes `var init_foo = __esm(...)` with hoisted declarations.
  Esm,
}

/// One resolved export alias: where the symbol actually lives.
#[derive(Debug, Clone)]
pub struct ExportData {
  pub sym: SymbolRef,
  pub source: SourceIndex,
  pub name_loc: Loc,
  /// Other candidates reached through different `export *` chains. Only a
  /// real ambiguity if following them lands on a different symbol.
  pub potentially_ambiguous_export_star_refs: Vec<AmbiguousExport>,
}

#[derive(Debug, Clone, Copy)]
pub struct AmbiguousExport {
  pub source: SourceIndex,
  pub sym: SymbolRef,
  pub name_loc: Loc,
}

/// Where an import ended up binding, plus the part dependencies collected
/// along the re-export chain that led there.
#[derive(Debug, Clone)]
pub struct ImportData {
  pub sym: SymbolRef,
  pub source: SourceIndex,
  pub re_exports: Vec<PartDependency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointKind {
  User,
  /// Added for a dynamic `import()` when code splitting is on.
  DynamicImport,
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
  pub source: SourceIndex,
  /// Explicit output path from the user, overriding the path template.
  pub output_path: Option<String>,
  pub kind: EntryPointKind,
}

/// Linker-owned state for one file.
#[derive(Debug, Default)]
pub struct LinkerMeta {
  pub wrap: WrapKind,
  pub resolved_exports: FxHashMap<String, ExportData>,
  pub resolved_export_star: Option<ExportData>,
  pub imports_to_bind: FxHashMap<SymbolRef, ImportData>,
  pub sorted_and_filtered_export_aliases: Vec<String>,
  pub needs_exports_variable: bool,
  pub force_include_exports_for_entry_point: bool,
  pub is_async_or_has_async_dependency: bool,
  pub did_wrap_dependencies: bool,
  pub wrapper_part_index: Option<PartIndex>,
  /// Symbols for `var export_foo = ns.foo` copies materialized when an
  /// entry point with CommonJS-shaped exports targets ESM output.
  pub cjs_export_copies: Vec<SymbolRef>,
  pub needs_export_symbol_from_runtime: bool,
  pub entry_point_part_index: Option<PartIndex>,
  pub is_probably_typescript_type: FxHashSet<SymbolRef>,
  /// Namespace symbols synthesized for import records that need a
  /// `var ns = require_foo()` binding but had no star name of their own.
  pub import_record_namespace_refs: FxHashMap<ImportRecordIndex, SymbolRef>,

  // Tree shaking and code splitting state.
  pub is_live: bool,
  pub entry_bits: BitSet,
  pub distance_from_entry_point: u32,
}

pub struct LinkerGraph {
  pub files: Vec<InputFile>,
  pub meta: Vec<LinkerMeta>,
  pub symbols: SymbolTable,
  pub entry_points: Vec<EntryPoint>,
  pub reachable_files: Vec<SourceIndex>,
}

impl LinkerGraph {
  /// Clones the immutable inputs into a linkable graph. `files[0]` must be
  /// the runtime module (see [`crate::runtime::runtime_file`]).
  pub fn new(
    files: Vec<InputFile>,
    symbols: SymbolTable,
    entry_points: Vec<EntryPoint>,
    reachable_files: Vec<SourceIndex>,
  ) -> Self {
    debug_assert_eq!(files.len(), symbols.file_count());
    let meta = files
      .iter()
      .map(|_| LinkerMeta {
        distance_from_entry_point: u32::MAX,
        ..Default::default()
      })
      .collect();
    Self {
      files,
      meta,
      symbols,
      entry_points,
      reachable_files,
    }
  }

  pub fn js_ast(&self, source: SourceIndex) -> Option<&JsAst> {
    self.files[source.idx()].repr.as_js()
  }

  pub fn js_ast_mut(&mut self, source: SourceIndex) -> Option<&mut JsAst> {
    self.files[source.idx()].repr.as_js_mut()
  }

  pub fn is_entry_point(&self, source: SourceIndex) -> bool {
    self.entry_points.iter().any(|e| e.source == source)
  }

  /// Looks up a runtime helper by export name.
  pub fn runtime_symbol(&self, name: &str) -> SymbolRef {
    let runtime = self
      .js_ast(RUNTIME_SOURCE_INDEX)
      .expect("runtime file must be JS");
    runtime
      .named_exports
      .get(name)
      .unwrap_or_else(|| panic!("missing runtime helper {}", name))
      .sym
  }

  /// Part index declaring a runtime helper, for dependency edges.
  pub fn runtime_part(&self, name: &str) -> PartIndex {
    let sym = self.runtime_symbol(name);
    let runtime = self.js_ast(RUNTIME_SOURCE_INDEX).unwrap();
    for (index, part) in runtime.parts.iter().enumerate() {
      if part.declared_symbols.iter().any(|d| d.sym == sym) {
        return PartIndex::new(index as u32);
      }
    }
    panic!("runtime helper {} has no declaring part", name);
  }

  pub fn runtime_symbols(&self) -> RuntimeSymbols {
    RuntimeSymbols {
      to_esm: self.runtime_symbol(runtime::TO_ESM),
      to_common_js: self.runtime_symbol(runtime::TO_COMMON_JS),
      require: self.runtime_symbol(runtime::REQUIRE),
      re_export: self.runtime_symbol(runtime::RE_EXPORT),
      export: self.runtime_symbol(runtime::EXPORT),
      common_js: self.runtime_symbol(runtime::COMMON_JS),
      esm: self.runtime_symbol(runtime::ESM),
    }
  }

  /// Adds a dependency from a part to a runtime helper's declaring part and
  /// bumps the helper's use count.
  pub fn record_runtime_use(
    &mut self,
    source: SourceIndex,
    part: PartIndex,
    helper: &str,
    count: u32,
  ) {
    if count == 0 {
      return;
    }
    let helper_part = self.runtime_part(helper);
    let helper_sym = self.runtime_symbol(helper);
    self.symbols.get_mut(helper_sym).use_count_estimate += count;
    if let Some(ast) = self.js_ast_mut(source) {
      let part = &mut ast.parts[part.idx()];
      part
        .symbol_uses
        .entry(helper_sym)
        .or_default()
        .count_estimate += count;
      let dep = PartDependency {
        source: RUNTIME_SOURCE_INDEX,
        part: helper_part,
      };
      if !part.dependencies.contains(&dep) {
        part.dependencies.push(dep);
      }
    }
  }

  /// Map from each top-level symbol of `source` to the parts declaring it.
  pub fn top_level_symbol_to_parts(
    &self,
    source: SourceIndex,
  ) -> FxHashMap<SymbolRef, Vec<PartIndex>> {
    let mut map: FxHashMap<SymbolRef, Vec<PartIndex>> = FxHashMap::default();
    if let Some(ast) = self.js_ast(source) {
      for (index, part) in ast.parts.iter().enumerate() {
        for declared in &part.declared_symbols {
          if declared.is_top_level {
            map
              .entry(declared.sym)
              .or_default()
              .push(PartIndex::new(index as u32));
          }
        }
      }
    }
    map
  }

  pub fn file_repr(&self, source: SourceIndex) -> &FileRepr {
    &self.files[source.idx()].repr
  }
}
