// Copyright 2024-2026 the Tern authors. MIT license.

//! Scanner steps 5 and 6: synthesize each file's namespace-export part and
//! wire every bound import into part dependencies, symbol merges, and
//! runtime-helper uses.
//!
//! Step 5 runs one task per file; each task touches only its own file's
//! parts, so the files are handed out as disjoint mutable slices. The only
//! cross-file effect, runtime helper use counts, is collected per task and
//! applied after the join.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use tern_common::Code;
use tern_common::DeclaredSymbol;
use tern_common::ExportsKind;
use tern_common::ImportKind;
use tern_common::LocalDecl;
use tern_common::LocalKind;
use tern_common::Part;
use tern_common::PartDependency;
use tern_common::PartIndex;
use tern_common::SourceIndex;
use tern_common::Stmt;
use tern_common::SymbolKind;
use tern_common::SymbolRef;
use tern_common::NS_EXPORT_PART_INDEX;
use tern_common::RUNTIME_SOURCE_INDEX;

use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::matching::file_name_stem;
use crate::options::BundleOptions;
use crate::options::OutputFormat;
use crate::runtime;
use crate::scan::is_valid_identifier;

/// Step 5.
pub(crate) fn create_namespace_exports(graph: &mut LinkerGraph, options: &BundleOptions) {
  filter_and_sort_export_aliases(graph, options);

  let runtime_export_sym = graph.runtime_symbol(runtime::EXPORT);
  let runtime_to_cjs_sym = graph.runtime_symbol(runtime::TO_COMMON_JS);
  let runtime_export_part = graph.runtime_part(runtime::EXPORT);
  let runtime_to_cjs_part = graph.runtime_part(runtime::TO_COMMON_JS);

  let entry_sources: FxHashSet<SourceIndex> =
    graph.entry_points.iter().map(|e| e.source).collect();
  let reachable: FxHashSet<SourceIndex> = graph.reachable_files.iter().copied().collect();
  let cjs_output = options.output_format == OutputFormat::CommonJs;

  let LinkerGraph {
    files,
    meta,
    symbols,
    ..
  } = graph;
  let meta_ref: &Vec<_> = meta;
  let symbols_ref = &*symbols;

  let deltas: Vec<(u32, u32)> = files
    .par_iter_mut()
    .enumerate()
    .map(|(i, file)| {
      let source = SourceIndex::new(i as u32);
      if source == RUNTIME_SOURCE_INDEX || !reachable.contains(&source) {
        return (0, 0);
      }
      let file_meta = &meta_ref[i];
      let Some(ast) = file.repr.as_js_mut() else {
        return (0, 0);
      };

      // Fold the indirect uses collected by the parser into plain symbol
      // use counts so the minifier sees them.
      for part in &mut ast.parts {
        let property_uses: Vec<(SymbolRef, u32)> = part
          .import_symbol_property_uses
          .iter()
          .map(|(sym, props)| {
            (*sym, props.values().map(|u| u.count_estimate).sum())
          })
          .collect();
        for (sym, count) in property_uses {
          part.symbol_uses.entry(sym).or_default().count_estimate += count;
        }
        let call_uses: Vec<(SymbolRef, u32)> = part
          .symbol_call_uses
          .iter()
          .map(|(sym, uses)| (*sym, uses.count_estimate))
          .collect();
        for (sym, count) in call_uses {
          let flags = symbols_ref.get(sym).flags;
          if flags.is_empty_function {
            // Calls to empty functions vanish under minification.
            continue;
          }
          part.symbol_uses.entry(sym).or_default().count_estimate += count;
        }
      }

      // Establish intra-file part dependencies from symbol uses.
      let mut top_level: FxHashMap<SymbolRef, Vec<PartIndex>> = FxHashMap::default();
      for (index, part) in ast.parts.iter().enumerate() {
        for declared in &part.declared_symbols {
          if declared.is_top_level {
            top_level
              .entry(declared.sym)
              .or_default()
              .push(PartIndex::new(index as u32));
          }
        }
      }
      for index in 0..ast.parts.len() {
        let mut uses: Vec<SymbolRef> =
          ast.parts[index].symbol_uses.keys().copied().collect();
        uses.sort();
        for sym in uses {
          let canonical = symbols_ref.follow_read(sym);
          for declaring in [sym, canonical] {
            if let Some(parts) = top_level.get(&declaring) {
              for q in parts {
                if q.idx() != index {
                  let dep = PartDependency {
                    source,
                    part: *q,
                  };
                  if !ast.parts[index].dependencies.contains(&dep) {
                    ast.parts[index].dependencies.push(dep);
                  }
                }
              }
            }
          }
        }
      }

      // Build the namespace-export part.
      let mut export_uses = 0u32;
      let mut to_cjs_uses = 0u32;
      let aliases = &file_meta.sorted_and_filtered_export_aliases;
      let mut part = Part {
        can_be_removed_if_unused: true,
        force_tree_shaking: true,
        ..Default::default()
      };

      if file_meta.needs_exports_variable {
        part.stmts.push(Stmt::Local {
          kind: LocalKind::Var,
          is_export: false,
          decls: vec![LocalDecl {
            name: ast.exports_ref,
            value: Some(Code::text("{}")),
          }],
        });
        part.declared_symbols.push(DeclaredSymbol {
          sym: ast.exports_ref,
          is_top_level: true,
        });
      }

      if file_meta.needs_exports_variable && !aliases.is_empty() {
        let mut code = Code::default();
        code.push_ref(runtime_export_sym);
        code.push_text("(");
        code.push_ref(ast.exports_ref);
        code.push_text(", {\n");
        for (index, alias) in aliases.iter().enumerate() {
          let export = &file_meta.resolved_exports[alias];
          if index > 0 {
            code.push_text(",\n");
          }
          let key = if is_valid_identifier(alias) {
            alias.clone()
          } else {
            format!("{:?}", alias)
          };
          code.push_text(format!("  {}: () => ", key));
          code.push_import_ref(export.sym);
          part
            .symbol_uses
            .entry(export.sym)
            .or_default()
            .count_estimate += 1;
        }
        code.push_text("\n})");
        part.stmts.push(Stmt::Expr(code));
        part
          .symbol_uses
          .entry(runtime_export_sym)
          .or_default()
          .count_estimate += 1;
        part
          .symbol_uses
          .entry(ast.exports_ref)
          .or_default()
          .count_estimate += 1;
        part.dependencies.push(PartDependency {
          source: RUNTIME_SOURCE_INDEX,
          part: runtime_export_part,
        });
        export_uses += 1;
      }

      // A CommonJS-shaped entry output re-exports the ESM namespace.
      let is_entry = entry_sources.contains(&source);
      if is_entry
        && cjs_output
        && ast.exports_kind == ExportsKind::Esm
        && !aliases.is_empty()
      {
        let mut code = Code::default();
        code.push_ref(ast.module_ref);
        code.push_text(".exports = ");
        code.push_ref(runtime_to_cjs_sym);
        code.push_text("(");
        code.push_ref(ast.exports_ref);
        code.push_text(")");
        part.stmts.push(Stmt::Expr(code));
        for sym in [ast.module_ref, runtime_to_cjs_sym, ast.exports_ref] {
          part.symbol_uses.entry(sym).or_default().count_estimate += 1;
        }
        part.dependencies.push(PartDependency {
          source: RUNTIME_SOURCE_INDEX,
          part: runtime_to_cjs_part,
        });
        ast.uses_module_ref = true;
        to_cjs_uses += 1;
      }

      ast.parts[NS_EXPORT_PART_INDEX.idx()] = part;
      (export_uses, to_cjs_uses)
    })
    .collect();

  let total_export: u32 = deltas.iter().map(|d| d.0).sum();
  let total_to_cjs: u32 = deltas.iter().map(|d| d.1).sum();
  graph.symbols.get_mut(runtime_export_sym).use_count_estimate += total_export;
  graph.symbols.get_mut(runtime_to_cjs_sym).use_count_estimate += total_to_cjs;
  for (i, (export_uses, _)) in deltas.iter().enumerate() {
    if *export_uses > 0 {
      graph.meta[i].needs_export_symbol_from_runtime = true;
    }
  }
}

fn filter_and_sort_export_aliases(graph: &mut LinkerGraph, options: &BundleOptions) {
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    if graph.js_ast(source).is_none() {
      continue;
    }

    let mut aliases = Vec::new();
    for (alias, export) in &graph.meta[source.idx()].resolved_exports {
      if !export.potentially_ambiguous_export_star_refs.is_empty() {
        let main = follow_terminal(graph, export.source, export.sym);
        let ambiguous = export
          .potentially_ambiguous_export_star_refs
          .iter()
          .any(|candidate| {
            follow_terminal(graph, candidate.source, candidate.sym) != main
          });
        if ambiguous {
          continue;
        }
      }
      if graph.meta[export.source.idx()]
        .is_probably_typescript_type
        .contains(&export.sym)
      {
        continue;
      }
      aliases.push(alias.clone());
    }
    aliases.sort();

    let is_entry = graph.is_entry_point(source);
    let ast = graph.js_ast(source).unwrap();

    // `export *` reaching an external or CommonJS module re-exports into
    // the namespace object at runtime.
    let has_dynamic_star = ast.export_star_import_records.iter().any(|ri| {
      match ast.import_records[ri.idx()].source_index {
        None => true,
        Some(target) => graph
          .js_ast(target)
          .map(|a| {
            a.exports_kind == ExportsKind::CommonJs || a.exports_kind.is_dynamic()
          })
          .unwrap_or(false),
      }
    });

    // Entry interop tails read the namespace object too.
    let needs_interop_namespace = is_entry
      && !aliases.is_empty()
      && ast.exports_kind == ExportsKind::Esm
      && (options.output_format == OutputFormat::CommonJs
        || (options.output_format == OutputFormat::Iife
          && options.global_name.is_some()));

    let meta = &mut graph.meta[source.idx()];
    meta.needs_exports_variable |= has_dynamic_star || needs_interop_namespace;
    meta.sorted_and_filtered_export_aliases = aliases;
  }
}

/// Follows `imports_to_bind` hops to the symbol an export finally lands on.
fn follow_terminal(
  graph: &LinkerGraph,
  mut source: SourceIndex,
  mut sym: SymbolRef,
) -> (SourceIndex, SymbolRef) {
  let mut hops = 0;
  while let Some(data) = graph.meta[source.idx()].imports_to_bind.get(&sym) {
    source = data.source;
    sym = data.sym;
    hops += 1;
    if hops > graph.files.len() {
      break;
    }
  }
  (source, sym)
}

/// Step 6.
pub(crate) fn bind_imports_to_exports(graph: &mut LinkerGraph, options: &BundleOptions) {
  let reachable = graph.reachable_files.clone();

  for &source in &reachable {
    if graph.js_ast(source).is_none() {
      continue;
    }

    bind_file_imports(graph, source);
    wire_ns_export_part_deps(graph, source);
    rewrite_external_imports(graph, source, options);
    materialize_cjs_export_copies(graph, source, options);
    prettify_shim_names(graph, source);
    encode_runtime_helper_uses(graph, source, options);
  }
}

fn bind_file_imports(graph: &mut LinkerGraph, source: SourceIndex) {
  let mut binds: Vec<(SymbolRef, crate::graph::ImportData)> = graph.meta
    [source.idx()]
  .imports_to_bind
  .iter()
  .map(|(k, v)| (*k, v.clone()))
  .collect();
  binds.sort_by_key(|(k, _)| *k);

  for (import_ref, data) in binds {
    let mut new_deps: Vec<PartDependency> = graph
      .top_level_symbol_to_parts(data.source)
      .get(&data.sym)
      .cloned()
      .unwrap_or_default()
      .into_iter()
      .map(|part| PartDependency {
        source: data.source,
        part,
      })
      .collect();
    new_deps.extend(data.re_exports.iter().copied());

    let ast = graph.js_ast_mut(source).unwrap();
    for part in &mut ast.parts {
      if part.symbol_uses.contains_key(&import_ref) {
        for dep in &new_deps {
          if !part.dependencies.contains(dep) {
            part.dependencies.push(*dep);
          }
        }
      }
    }

    graph.symbols.merge(import_ref, data.sym);
  }
}

/// The namespace-export part references every exported symbol through its
/// getter closures; those references must keep the declaring parts alive.
fn wire_ns_export_part_deps(graph: &mut LinkerGraph, source: SourceIndex) {
  let aliases = graph.meta[source.idx()]
    .sorted_and_filtered_export_aliases
    .clone();
  if aliases.is_empty() {
    return;
  }

  let mut new_deps: Vec<PartDependency> = Vec::new();
  for alias in &aliases {
    let export = graph.meta[source.idx()].resolved_exports[alias].clone();
    let canonical = graph.symbols.follow(export.sym);
    for target in [export.sym, canonical] {
      let owner = if target == export.sym {
        export.source
      } else {
        canonical.source
      };
      if let Some(parts) = graph.top_level_symbol_to_parts(owner).get(&target) {
        for part in parts {
          let dep = PartDependency {
            source: owner,
            part: *part,
          };
          if !new_deps.contains(&dep) {
            new_deps.push(dep);
          }
        }
      }
    }
  }

  // Both the namespace-export part and the entry part (when this file is
  // an entry) keep the exported symbols alive: ESM entries export directly
  // without ever materializing the namespace object.
  let entry_part = graph.meta[source.idx()].entry_point_part_index;
  if let Some(ast) = graph.js_ast_mut(source) {
    let mut targets = vec![NS_EXPORT_PART_INDEX];
    if let Some(entry_part) = entry_part {
      targets.push(entry_part);
    }
    for part_index in targets {
      let part = &mut ast.parts[part_index.idx()];
      for dep in &new_deps {
        if !part.dependencies.contains(dep) {
          part.dependencies.push(*dep);
        }
      }
    }
  }
}

/// When import syntax does not survive into the output, bindings on
/// external modules become property accesses on the `var ns = require(...)`
/// namespace the renderer will emit.
fn rewrite_external_imports(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  options: &BundleOptions,
) {
  if options.output_format.keeps_import_export_syntax() {
    return;
  }
  let Some(ast) = graph.js_ast(source) else {
    return;
  };

  let mut externals: Vec<(SymbolRef, tern_common::ImportRecordIndex, String, String)> =
    Vec::new();
  for (import_ref, named_import) in &ast.named_imports {
    let record = &ast.import_records[named_import.import_record_index.idx()];
    if record.source_index.is_some() || record.is_disabled || named_import.alias == "*" {
      continue;
    }
    externals.push((
      *import_ref,
      named_import.import_record_index,
      named_import.alias.clone(),
      record.path.clone(),
    ));
  }
  externals.sort_by_key(|(sym, ..)| *sym);

  for (import_ref, record, alias, path) in externals {
    let ns_ref = crate::matching::namespace_ref_for_record(graph, source, record, &path);
    graph.symbols.get_mut(import_ref).namespace_alias =
      Some(tern_common::NamespaceAlias {
        namespace_ref: ns_ref,
        alias,
      });
  }
}

/// ESM output of an entry whose exports are CommonJS property accesses gets
/// live-looking copies: `var export_foo = ns.foo; export { export_foo as foo }`.
fn materialize_cjs_export_copies(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  options: &BundleOptions,
) {
  if options.output_format != OutputFormat::EsModule || !graph.is_entry_point(source) {
    return;
  }
  let aliases = graph.meta[source.idx()]
    .sorted_and_filtered_export_aliases
    .clone();
  if aliases.is_empty() {
    return;
  }
  let needs_copies = aliases.iter().any(|alias| {
    let export = &graph.meta[source.idx()].resolved_exports[alias];
    graph
      .symbols
      .get(graph.symbols.follow_read(export.sym))
      .namespace_alias
      .is_some()
  });
  if !needs_copies {
    return;
  }

  let mut copies = Vec::with_capacity(aliases.len());
  for alias in &aliases {
    let sym = graph
      .symbols
      .create(source, format!("export_{}", alias), SymbolKind::Other);
    copies.push(sym);
  }
  graph.meta[source.idx()].cjs_export_copies = copies;
}

/// Cosmetic names for the shim objects once they become real variables.
fn prettify_shim_names(graph: &mut LinkerGraph, source: SourceIndex) {
  let Some(ast) = graph.js_ast(source) else {
    return;
  };
  let stem = file_name_stem(&graph.files[source.idx()].pretty_path);
  let exports_ref = ast.exports_ref;
  let module_ref = ast.module_ref;
  let needs_exports = graph.meta[source.idx()].needs_exports_variable;

  let exports_symbol = graph.symbols.get_mut(exports_ref);
  if needs_exports
    && exports_symbol.kind != SymbolKind::Unbound
    && source != RUNTIME_SOURCE_INDEX
  {
    exports_symbol.original_name = format!("{}_exports", stem);
  }
  // `module` keeps its name everywhere it is printed: as a wrapper
  // parameter and as the host binding of a CommonJS entry.
  let _ = module_ref;
}

/// Walks each part's import records once, decides which interop helpers the
/// record needs, and wires dependencies on both the helpers and the target
/// file's wrapper part.
fn encode_runtime_helper_uses(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  options: &BundleOptions,
) {
  let part_count = graph.js_ast(source).map(|a| a.parts.len()).unwrap_or(0);
  let keeps_syntax = options.output_format.keeps_import_export_syntax();

  for part_index in 0..part_count {
    let mut require_uses = 0u32;
    let mut to_esm_uses = 0u32;
    let mut to_cjs_uses = 0u32;
    let mut re_export_uses = 0u32;
    let mut wrapper_deps: Vec<PartDependency> = Vec::new();
    let mut wrapper_uses: Vec<SymbolRef> = Vec::new();
    let mut flag_updates: Vec<(usize, bool, bool, bool)> = Vec::new();
    let mut dynamic_star_records: Vec<usize> = Vec::new();
    let mut external_ns_records: Vec<(tern_common::ImportRecordIndex, String)> = Vec::new();

    {
      let ast = graph.js_ast(source).unwrap();
      let part = &ast.parts[part_index];
      for record_index in &part.import_record_indices {
        let record = &ast.import_records[record_index.idx()];
        let mut calls_require = false;
        let mut wrap_to_esm = false;
        let mut wrap_to_cjs = false;

        match record.source_index {
          None => {
            if record.is_disabled {
              continue;
            }
            match record.kind {
              ImportKind::Stmt if !keeps_syntax => {
                calls_require = true;
                if record.contains_import_star || record.contains_default_alias {
                  wrap_to_esm = true;
                }
              }
              ImportKind::Require => {
                if !matches!(options.output_format, OutputFormat::CommonJs) {
                  calls_require = true;
                }
              }
              ImportKind::Dynamic if !keeps_syntax => {
                calls_require = true;
                wrap_to_esm = true;
              }
              _ => {}
            }
          }
          Some(target) => {
            let target_meta = &graph.meta[target.idx()];
            let target_kind = graph
              .js_ast(target)
              .map(|a| a.exports_kind)
              .unwrap_or(ExportsKind::None);
            match target_meta.wrap {
              WrapKind::Cjs => {
                if let Some(wrapper_part) = target_meta.wrapper_part_index {
                  wrapper_deps.push(PartDependency {
                    source: target,
                    part: wrapper_part,
                  });
                  wrapper_uses.push(graph.js_ast(target).unwrap().wrapper_ref);
                }
                // Star or default imports of CommonJS need the ESM view,
                // as does an inlined dynamic import.
                if record.kind == ImportKind::Stmt
                  && (record.contains_import_star || record.contains_default_alias)
                {
                  wrap_to_esm = true;
                }
                if record.kind == ImportKind::Dynamic && !options.code_splitting {
                  wrap_to_esm = true;
                }
              }
              WrapKind::Esm => {
                if let Some(wrapper_part) = target_meta.wrapper_part_index {
                  wrapper_deps.push(PartDependency {
                    source: target,
                    part: wrapper_part,
                  });
                  wrapper_uses.push(graph.js_ast(target).unwrap().wrapper_ref);
                }
                // `require()` of ESM materializes the namespace object.
                if record.kind == ImportKind::Require {
                  wrap_to_cjs = true;
                }
              }
              WrapKind::None => {
                if record.kind == ImportKind::Require
                  && target_kind != ExportsKind::CommonJs
                {
                  wrap_to_cjs = true;
                }
              }
            }
          }
        }

        if calls_require {
          require_uses += 1;
        }
        if wrap_to_esm {
          to_esm_uses += 1;
        }
        if wrap_to_cjs {
          to_cjs_uses += 1;
        }
        if calls_require || wrap_to_esm || wrap_to_cjs {
          flag_updates.push((
            record_index.idx(),
            calls_require,
            wrap_to_esm,
            wrap_to_cjs,
          ));
        }
      }

      // Dynamic `export *` falls back to a runtime re-export call.
      for stmt in &part.stmts {
        if let Stmt::ExportStar {
          record,
          alias: None,
        } = stmt
        {
          let target = ast.import_records[record.idx()].source_index;
          let is_dynamic = match target {
            None => true,
            Some(t) => graph
              .js_ast(t)
              .map(|a| {
                a.exports_kind == ExportsKind::CommonJs
                  || a.exports_kind.is_dynamic()
              })
              .unwrap_or(false),
          };
          if is_dynamic {
            re_export_uses += 1;
            dynamic_star_records.push(record.idx());
            if target.is_none() {
              let path = ast.import_records[record.idx()].path.clone();
              external_ns_records.push((*record, path));
            }
          }
        }
      }
    }

    for (record, path) in external_ns_records {
      crate::matching::namespace_ref_for_record(graph, source, record, &path);
    }

    if let Some(ast) = graph.js_ast_mut(source) {
      for &(record_index, calls_require, wrap_to_esm, wrap_to_cjs) in &flag_updates {
        let record = &mut ast.import_records[record_index];
        record.calls_runtime_require |= calls_require;
        record.wrap_with_to_esm |= wrap_to_esm;
        record.wrap_with_to_cjs |= wrap_to_cjs;
      }
      for record_index in &dynamic_star_records {
        ast.import_records[*record_index].calls_runtime_re_export_fn = true;
      }
      let part = &mut ast.parts[part_index];
      for dep in &wrapper_deps {
        if !part.dependencies.contains(dep) {
          part.dependencies.push(*dep);
        }
      }
      // The wrapper invocation is a real use for cross-chunk analysis.
      for wrapper in &wrapper_uses {
        part.symbol_uses.entry(*wrapper).or_default().count_estimate += 1;
      }
    }

    let part = PartIndex::new(part_index as u32);
    graph.record_runtime_use(source, part, runtime::REQUIRE, require_uses);
    graph.record_runtime_use(source, part, runtime::TO_ESM, to_esm_uses);
    graph.record_runtime_use(source, part, runtime::TO_COMMON_JS, to_cjs_uses);
    graph.record_runtime_use(source, part, runtime::RE_EXPORT, re_export_uses);
  }
}
