// Copyright 2024-2026 the Tern authors. MIT license.

//! Scanner steps 1–3: classify each module's export shape, propagate
//! CommonJS/ESM wrapping through the import graph, and resolve
//! `export * from` chains into concrete export tables.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde_json::Value;
use tern_common::Code;
use tern_common::DeclaredSymbol;
use tern_common::ExportsKind;
use tern_common::ImportKind;
use tern_common::LoaderKind;
use tern_common::Loc;
use tern_common::LocalDecl;
use tern_common::LocalKind;
use tern_common::NamedExport;
use tern_common::Part;
use tern_common::SourceIndex;
use tern_common::Stmt;
use tern_common::SymbolKind;

use crate::graph::AmbiguousExport;
use crate::graph::ExportData;
use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::options::BundleMode;
use crate::options::BundleOptions;
use crate::options::OutputFormat;

pub(crate) fn classify_and_wrap(graph: &mut LinkerGraph, options: &BundleOptions) {
  step1_classify_exports_kind(graph, options);
  step2_propagate_wrapping(graph, options);

  if log::log_enabled!(log::Level::Debug) {
    let wrapped = graph
      .meta
      .iter()
      .filter(|m| m.wrap != WrapKind::None)
      .count();
    log::debug!("scan: {} of {} files wrapped", wrapped, graph.files.len());
  }
}

/// Step 1. Walk every import record and decide which targets must become
/// CommonJS, then wrap CommonJS files the output format cannot host inline.
fn step1_classify_exports_kind(graph: &mut LinkerGraph, options: &BundleOptions) {
  let bundling = options.mode == BundleMode::Bundle;
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let Some(ast) = graph.js_ast(source) else {
      continue;
    };

    let records: Vec<_> = ast
      .import_records
      .iter()
      .map(|r| {
        (
          r.kind,
          r.source_index,
          r.contains_import_star || r.contains_default_alias,
        )
      })
      .collect();

    for (kind, target, has_star_or_default) in records {
      let Some(target) = target else {
        continue;
      };
      let Some((other_kind, other_lazy)) = graph
        .js_ast(target)
        .map(|a| (a.exports_kind, a.has_lazy_export))
      else {
        continue;
      };
      match kind {
        ImportKind::Stmt => {
          // `import * as ns` / `import def` of a module with no exports
          // forces the CommonJS interpretation: the namespace has to be a
          // real object at runtime. Named-only imports keep the target ESM
          // and the missing names warn later.
          if has_star_or_default
            && other_kind == ExportsKind::None
            && !other_lazy
          {
            graph.js_ast_mut(target).unwrap().exports_kind = ExportsKind::CommonJs;
            if bundling && graph.meta[target.idx()].wrap == WrapKind::None {
              graph.meta[target.idx()].wrap = WrapKind::Cjs;
            }
          }
        }
        ImportKind::Require | ImportKind::Dynamic
          if kind == ImportKind::Require || !options.code_splitting =>
        {
          if other_kind == ExportsKind::Esm
            || other_kind == ExportsKind::EsmWithDynamicFallback
          {
            if bundling && graph.meta[target.idx()].wrap == WrapKind::None {
              graph.meta[target.idx()].wrap = WrapKind::Esm;
            }
            // require() observes the namespace object.
            graph.meta[target.idx()].needs_exports_variable = true;
          } else {
            if other_kind == ExportsKind::None {
              graph.js_ast_mut(target).unwrap().exports_kind = ExportsKind::CommonJs;
            }
            if bundling && graph.meta[target.idx()].wrap == WrapKind::None {
              graph.meta[target.idx()].wrap = WrapKind::Cjs;
            }
          }
        }
        _ => {}
      }
    }
  }

  // A CommonJS file can only run unwrapped when it is itself the entry
  // point of a CommonJS-shaped output.
  if options.mode == BundleMode::Bundle {
    for i in 0..graph.reachable_files.len() {
      let source = graph.reachable_files[i];
      let Some(ast) = graph.js_ast(source) else {
        continue;
      };
      if ast.exports_kind != ExportsKind::CommonJs {
        continue;
      }
      // Wrapped unless this file is itself the entry of a CommonJS-shaped
      // output; ESM and IIFE entries cannot host a bare CJS body.
      let hosts_cjs_inline = graph.is_entry_point(source)
        && matches!(
          options.output_format,
          OutputFormat::CommonJs | OutputFormat::Preserve
        );
      if !hosts_cjs_inline && graph.meta[source.idx()].wrap == WrapKind::None {
        graph.meta[source.idx()].wrap = WrapKind::Cjs;
      }
    }
  }
}

/// Step 2. Wrapping is contagious: everything a wrapped file imports must
/// also be wrapped, or its side effects would run at bundle evaluation time
/// instead of on first `require`/`init`.
fn step2_propagate_wrapping(graph: &mut LinkerGraph, options: &BundleOptions) {
  if options.mode == BundleMode::Bundle {
    for i in 0..graph.reachable_files.len() {
      let source = graph.reachable_files[i];
      if graph.meta[source.idx()].wrap != WrapKind::None {
        recursively_wrap_dependencies(graph, source);
      }
    }

    // Importing a CommonJS file also wraps that file and its dependencies.
    for i in 0..graph.reachable_files.len() {
      let source = graph.reachable_files[i];
      let Some(ast) = graph.js_ast(source) else {
        continue;
      };
      let targets: Vec<_> =
        ast.import_records.iter().filter_map(|r| r.source_index).collect();
      for target in targets {
        let is_cjs = graph
          .js_ast(target)
          .map(|a| a.exports_kind == ExportsKind::CommonJs)
          .unwrap_or(false);
        if is_cjs {
          if graph.meta[target.idx()].wrap == WrapKind::None {
            graph.meta[target.idx()].wrap = WrapKind::Cjs;
          }
          recursively_wrap_dependencies(graph, target);
        }
      }
    }
  }

  propagate_async(graph);
  trace_dynamic_export_stars(graph);
}

fn recursively_wrap_dependencies(graph: &mut LinkerGraph, source: SourceIndex) {
  if graph.meta[source.idx()].did_wrap_dependencies {
    return;
  }
  graph.meta[source.idx()].did_wrap_dependencies = true;

  let Some(ast) = graph.js_ast(source) else {
    return;
  };
  let targets: Vec<_> = ast
    .import_records
    .iter()
    .filter(|r| r.kind != ImportKind::Dynamic)
    .filter_map(|r| r.source_index)
    .collect();
  for target in targets {
    if graph.meta[target.idx()].wrap == WrapKind::None {
      let is_cjs = graph
        .js_ast(target)
        .map(|a| a.exports_kind == ExportsKind::CommonJs)
        .unwrap_or(false);
      graph.meta[target.idx()].wrap = if is_cjs { WrapKind::Cjs } else { WrapKind::Esm };
    }
    recursively_wrap_dependencies(graph, target);
  }
}

/// Top-level await propagates backwards: an importer of an async module is
/// itself async, which decides whether ESM wrappers get an `async` body.
fn propagate_async(graph: &mut LinkerGraph) {
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    if let Some(ast) = graph.js_ast(source) {
      if ast.top_level_await {
        graph.meta[source.idx()].is_async_or_has_async_dependency = true;
      }
    }
  }

  let mut changed = true;
  while changed {
    changed = false;
    for i in 0..graph.reachable_files.len() {
      let source = graph.reachable_files[i];
      if graph.meta[source.idx()].is_async_or_has_async_dependency {
        continue;
      }
      let Some(ast) = graph.js_ast(source) else {
        continue;
      };
      let has_async_dep = ast
        .import_records
        .iter()
        .filter(|r| r.kind == ImportKind::Stmt || r.kind == ImportKind::Require)
        .filter_map(|r| r.source_index)
        .any(|t| graph.meta[t.idx()].is_async_or_has_async_dependency);
      if has_async_dep {
        graph.meta[source.idx()].is_async_or_has_async_dependency = true;
        changed = true;
      }
    }
  }
}

/// `export *` that reaches an external or CommonJS module means the export
/// set is only knowable at runtime.
fn trace_dynamic_export_stars(graph: &mut LinkerGraph) {
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let mut visited = FxHashSet::default();
    has_dynamic_exports_due_to_export_star(graph, source, &mut visited);
  }
}

fn has_dynamic_exports_due_to_export_star(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  visited: &mut FxHashSet<SourceIndex>,
) -> bool {
  if !visited.insert(source) {
    return graph
      .js_ast(source)
      .map(|a| a.exports_kind.is_dynamic())
      .unwrap_or(false);
  }
  let Some(ast) = graph.js_ast(source) else {
    return false;
  };
  if ast.exports_kind == ExportsKind::CommonJs {
    return true;
  }
  let star_targets: Vec<_> = ast
    .export_star_import_records
    .iter()
    .map(|index| ast.import_records[index.idx()].source_index)
    .collect();

  let mut dynamic = false;
  for target in star_targets {
    match target {
      None => dynamic = true,
      Some(target) => {
        if has_dynamic_exports_due_to_export_star(graph, target, visited) {
          dynamic = true;
        }
      }
    }
  }

  if dynamic {
    if let Some(ast) = graph.js_ast_mut(source) {
      if ast.exports_kind == ExportsKind::Esm || ast.exports_kind == ExportsKind::None {
        ast.exports_kind = ExportsKind::EsmWithDynamicFallback;
      }
    }
  }
  dynamic
}

/// Step 3. Lower lazy-export loaders, seed each file's resolved exports from
/// its own `named_exports`, then fold in everything reachable through
/// `export * from` chains with shadowing and ambiguity bookkeeping.
pub(crate) fn resolve_exports(graph: &mut LinkerGraph, options: &BundleOptions) {
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let has_lazy = graph
      .js_ast(source)
      .map(|a| a.has_lazy_export)
      .unwrap_or(false);
    if has_lazy {
      generate_lazy_export(graph, source, options);
    }
  }

  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let Some(ast) = graph.js_ast(source) else {
      continue;
    };

    let mut resolved: FxHashMap<String, ExportData> = FxHashMap::default();
    for (alias, export) in &ast.named_exports {
      resolved.insert(
        alias.clone(),
        ExportData {
          sym: export.sym,
          source,
          name_loc: export.alias_loc,
          potentially_ambiguous_export_star_refs: Vec::new(),
        },
      );
    }

    if !ast.export_star_import_records.is_empty() {
      let mut stack = vec![source];
      add_exports_for_export_star(graph, &mut resolved, source, &mut stack);
    }

    let exports_ref = graph.js_ast(source).unwrap().exports_ref;
    let meta = &mut graph.meta[source.idx()];
    meta.resolved_export_star = Some(ExportData {
      sym: exports_ref,
      source,
      name_loc: Loc::default(),
      potentially_ambiguous_export_star_refs: Vec::new(),
    });
    meta.resolved_exports = resolved;
  }
}

fn add_exports_for_export_star(
  graph: &LinkerGraph,
  resolved_exports: &mut FxHashMap<String, ExportData>,
  source: SourceIndex,
  stack: &mut Vec<SourceIndex>,
) {
  let Some(ast) = graph.js_ast(source) else {
    return;
  };

  for record_index in &ast.export_star_import_records {
    let record = &ast.import_records[record_index.idx()];
    let Some(other_source) = record.source_index else {
      // External stars are deferred to a runtime __reExport call.
      continue;
    };
    if stack.contains(&other_source) {
      continue;
    }
    let Some(other) = graph.js_ast(other_source) else {
      continue;
    };
    if other.exports_kind == ExportsKind::CommonJs {
      // Star-exported CommonJS contributes nothing statically.
      continue;
    }

    for (alias, export) in &other.named_exports {
      if alias == "default" {
        continue;
      }
      // A direct export anywhere along the chain shadows the starred one.
      let shadowed = stack.iter().any(|s| {
        graph
          .js_ast(*s)
          .map(|a| a.named_exports.contains_key(alias))
          .unwrap_or(false)
      });
      if shadowed {
        continue;
      }

      match resolved_exports.get_mut(alias) {
        None => {
          resolved_exports.insert(
            alias.clone(),
            ExportData {
              sym: export.sym,
              source: other_source,
              name_loc: export.alias_loc,
              potentially_ambiguous_export_star_refs: Vec::new(),
            },
          );
        }
        Some(existing) => {
          if existing.source != other_source && existing.sym != export.sym {
            existing
              .potentially_ambiguous_export_star_refs
              .push(AmbiguousExport {
                source: other_source,
                sym: export.sym,
                name_loc: export.alias_loc,
              });
          }
        }
      }
    }

    stack.push(other_source);
    add_exports_for_export_star(graph, resolved_exports, other_source, stack);
    stack.pop();
  }
}

/// Converts a single-expression module (JSON, text, ...) into synthetic
/// exports. Object-shaped JSON gets one part per identifier-valid property
/// so individual keys tree-shake; everything becomes `module.exports` when
/// the importer forced the CommonJS interpretation.
fn generate_lazy_export(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  _options: &BundleOptions,
) {
  let (value, exports_kind, loader) = {
    let file = &graph.files[source.idx()];
    let ast = file.js_ast();
    (
      ast.lazy_value.clone().unwrap_or(Value::Null),
      ast.exports_kind,
      file.loader,
    )
  };

  if exports_kind == ExportsKind::CommonJs {
    let module_ref = graph.js_ast(source).unwrap().module_ref;
    let mut code = Code::default();
    code.push_ref(module_ref);
    code.push_text(format!(".exports = {}", json_literal(&value)));
    let mut part = Part::with_stmts(vec![Stmt::Expr(code)]);
    part.symbol_uses.entry(module_ref).or_default().count_estimate += 1;
    part.can_be_removed_if_unused = true;
    let ast = graph.js_ast_mut(source).unwrap();
    ast.uses_module_ref = true;
    ast.parts.push(part);
    return;
  }

  // ESM shape: named exports for identifier-valid object keys, plus a
  // default export that reuses the named symbols.
  let mut named: Vec<(String, Value)> = Vec::new();
  if loader == LoaderKind::Json {
    if let Value::Object(map) = &value {
      for (key, v) in map {
        if is_valid_identifier(key) {
          named.push((key.clone(), v.clone()));
        }
      }
    }
  }

  let mut name_to_sym = FxHashMap::default();
  for (key, v) in &named {
    let sym = graph.symbols.create(source, key.clone(), SymbolKind::Other);
    name_to_sym.insert(key.clone(), sym);
    let mut part = Part::with_stmts(vec![Stmt::Local {
      kind: LocalKind::Let,
      is_export: true,
      decls: vec![LocalDecl {
        name: sym,
        value: Some(Code::text(json_literal(v))),
      }],
    }]);
    part.declared_symbols.push(DeclaredSymbol {
      sym,
      is_top_level: true,
    });
    part.can_be_removed_if_unused = true;
    let ast = graph.js_ast_mut(source).unwrap();
    let _part_index = ast.parts.len();
    ast.parts.push(part);
    ast.named_exports.insert(
      key.clone(),
      NamedExport {
        sym,
        alias_loc: Loc::default(),
      },
    );
  }

  let default_sym = graph.symbols.create(source, "default", SymbolKind::Other);
  let mut code = Code::default();
  match &value {
    Value::Object(map) if loader == LoaderKind::Json => {
      code.push_text("{");
      let mut first = true;
      for (key, v) in map {
        if !first {
          code.push_text(", ");
        }
        first = false;
        code.push_text(format!("{}: ", json_key(key)));
        match name_to_sym.get(key) {
          Some(sym) => {
            code.push_ref(*sym);
          }
          None => {
            code.push_text(json_literal(v));
          }
        }
      }
      code.push_text(" }");
    }
    other => {
      code.push_text(json_literal(other));
    }
  }

  let mut part = Part::with_stmts(vec![Stmt::ExportDefault {
    default_name: default_sym,
    value: tern_common::DefaultValue::Expr(code),
  }]);
  part.declared_symbols.push(DeclaredSymbol {
    sym: default_sym,
    is_top_level: true,
  });
  for sym in name_to_sym.values() {
    part.symbol_uses.entry(*sym).or_default().count_estimate += 1;
  }
  part.can_be_removed_if_unused = true;
  let ast = graph.js_ast_mut(source).unwrap();
  ast.parts.push(part);
  ast.named_exports.insert(
    "default".to_string(),
    NamedExport {
      sym: default_sym,
      alias_loc: Loc::default(),
    },
  );
  ast.exports_kind = ExportsKind::Esm;
}

fn json_literal(value: &Value) -> String {
  serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn json_key(key: &str) -> String {
  if is_valid_identifier(key) {
    key.to_string()
  } else {
    serde_json::to_string(key).unwrap_or_else(|_| format!("\"{}\"", key))
  }
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
