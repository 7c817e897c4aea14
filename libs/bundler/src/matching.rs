// Copyright 2024-2026 the Tern authors. MIT license.

//! Scanner step 4: match every named import to the export it binds to,
//! following re-export chains with cycle detection and reporting
//! ambiguities introduced by overlapping `export *` trees.

use tern_common::ExportsKind;
use tern_common::Loc;
use tern_common::PartDependency;
use tern_common::SourceIndex;
use tern_common::SymbolKind;
use tern_common::SymbolRef;

use crate::diagnostics::Log;
use crate::diagnostics::MsgLocation;
use crate::diagnostics::Note;
use crate::graph::AmbiguousExport;
use crate::graph::ImportData;
use crate::graph::LinkerGraph;
use crate::graph::WrapKind;
use crate::options::BundleOptions;
use crate::options::OutputFormat;
use crate::runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImportTracker {
  source: SourceIndex,
  import_ref: SymbolRef,
}

enum ImportStatus {
  /// Matched an export; maybe through more re-exports.
  Found {
    source: SourceIndex,
    sym: SymbolRef,
    ambiguous: Vec<AmbiguousExport>,
  },
  NoMatch,
  /// Property access on the target's namespace object at runtime. The
  /// namespace variable lives in the importing file: the star binding if
  /// the import had one, else a ref synthesized per import record.
  CommonJs {
    record: tern_common::ImportRecordIndex,
    target: SourceIndex,
    alias: String,
  },
  CommonJsWithoutExports {
    other_path: String,
  },
  DynamicFallback {
    source: SourceIndex,
    namespace_ref: SymbolRef,
    alias: String,
  },
  Disabled,
  External,
  /// Terminal with nothing to record: the binding is declared locally by
  /// interop code the renderer emits (e.g. a star import of CommonJS).
  Ignore,
  ProbablyTypeScriptType,
}

#[derive(Debug, Clone, PartialEq)]
enum MatchResult {
  Ignore,
  /// The resolver disabled the module; the binding is always undefined.
  Disabled,
  NoMatch,
  /// The target is CommonJS-shaped but exports nothing; the binding is
  /// always undefined.
  NoExports {
    other_path: String,
  },
  Normal {
    source: SourceIndex,
    sym: SymbolRef,
  },
  Namespace {
    namespace_ref: SymbolRef,
    alias: String,
  },
  /// Like `Namespace`, but the namespace variable must first be created
  /// for the import record in the importing file.
  NamespaceOfRecord {
    record: tern_common::ImportRecordIndex,
    target: SourceIndex,
    alias: String,
  },
  NormalAndNamespace {
    source: SourceIndex,
    sym: SymbolRef,
    namespace_ref: SymbolRef,
    alias: String,
  },
  Cycle,
  ProbablyTypeScriptType,
  Ambiguous {
    a: (SourceIndex, Loc),
    b: (SourceIndex, Loc),
  },
}

pub(crate) fn match_imports_with_exports(
  graph: &mut LinkerGraph,
  log: &Log,
  options: &BundleOptions,
) {
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let Some(ast) = graph.js_ast(source) else {
      continue;
    };

    // Imports are processed in declaration order for determinism.
    let mut import_refs: Vec<SymbolRef> = ast.named_imports.keys().copied().collect();
    import_refs.sort();

    for import_ref in import_refs {
      let mut cycle_stack = Vec::new();
      let mut re_exports = Vec::new();
      let result = match_import_with_export(
        graph,
        ImportTracker { source, import_ref },
        &mut cycle_stack,
        &mut re_exports,
      );
      apply_match_result(graph, log, source, import_ref, result, re_exports);
    }
  }

  demote_entry_cjs_shims(graph, options);
  create_wrapper_parts(graph);
  create_entry_point_parts(graph, options);
}

fn match_import_with_export(
  graph: &LinkerGraph,
  first: ImportTracker,
  cycle_stack: &mut Vec<ImportTracker>,
  re_exports: &mut Vec<PartDependency>,
) -> MatchResult {
  let mut ambiguous_candidates: Vec<AmbiguousExport> = Vec::new();
  let mut tracker = first;

  let result = loop {
    if cycle_stack.contains(&tracker) {
      break MatchResult::Cycle;
    }
    cycle_stack.push(tracker);

    match advance_import_tracker(graph, &tracker) {
      ImportStatus::External => break MatchResult::Ignore,
      ImportStatus::CommonJsWithoutExports { other_path } => {
        break MatchResult::NoExports { other_path }
      }
      ImportStatus::Disabled => break MatchResult::Disabled,
      ImportStatus::Ignore => break MatchResult::Ignore,
      ImportStatus::CommonJs {
        record,
        target,
        alias,
      } => {
        break MatchResult::NamespaceOfRecord {
          record,
          target,
          alias,
        }
      }
      ImportStatus::DynamicFallback {
        source,
        namespace_ref,
        alias,
      } => {
        // A star import binds the namespace object directly; named imports
        // bind it and read the property at runtime.
        if alias == "*" {
          break MatchResult::Normal {
            source,
            sym: namespace_ref,
          };
        }
        break MatchResult::NormalAndNamespace {
          source,
          sym: namespace_ref,
          namespace_ref,
          alias,
        };
      }
      ImportStatus::NoMatch => break MatchResult::NoMatch,
      ImportStatus::ProbablyTypeScriptType => {
        break MatchResult::ProbablyTypeScriptType
      }
      ImportStatus::Found {
        source: next_source,
        sym: next_sym,
        ambiguous,
      } => {
        ambiguous_candidates.extend(ambiguous);

        let is_re_export = graph
          .js_ast(next_source)
          .map(|a| a.named_imports.contains_key(&next_sym))
          .unwrap_or(false);
        if is_re_export {
          // Depend on the re-exporting statements so they stay alive.
          for part in graph
            .top_level_symbol_to_parts(next_source)
            .get(&next_sym)
            .into_iter()
            .flatten()
          {
            re_exports.push(PartDependency {
              source: next_source,
              part: *part,
            });
          }
          tracker = ImportTracker {
            source: next_source,
            import_ref: next_sym,
          };
          continue;
        }

        break MatchResult::Normal {
          source: next_source,
          sym: next_sym,
        };
      }
    }
  };

  // An ambiguity is only real if one of the alternative export-star chains
  // lands on a different symbol. Each alternative runs with a copy of the
  // current cycle stack so the probe cannot poison this resolution.
  if !ambiguous_candidates.is_empty() {
    if let Some(main) = terminal_of(&result) {
      for candidate in &ambiguous_candidates {
        let is_import = graph
          .js_ast(candidate.source)
          .map(|a| a.named_imports.contains_key(&candidate.sym))
          .unwrap_or(false);
        let candidate_terminal = if is_import {
          let mut saved_stack = cycle_stack.clone();
          let mut scratch = Vec::new();
          let alt = match_import_with_export(
            graph,
            ImportTracker {
              source: candidate.source,
              import_ref: candidate.sym,
            },
            &mut saved_stack,
            &mut scratch,
          );
          terminal_of(&alt)
        } else {
          Some((candidate.source, candidate.sym))
        };
        if let Some(alt) = candidate_terminal {
          if alt != main {
            let main_loc = export_loc(graph, main.0, main.1);
            return MatchResult::Ambiguous {
              a: (main.0, main_loc),
              b: (candidate.source, candidate.name_loc),
            };
          }
        }
      }
    }
  }

  result
}

fn terminal_of(result: &MatchResult) -> Option<(SourceIndex, SymbolRef)> {
  match result {
    MatchResult::Normal { source, sym }
    | MatchResult::NormalAndNamespace { source, sym, .. } => Some((*source, *sym)),
    _ => None,
  }
}

fn export_loc(graph: &LinkerGraph, source: SourceIndex, sym: SymbolRef) -> Loc {
  graph
    .js_ast(source)
    .and_then(|ast| {
      ast
        .named_exports
        .values()
        .find(|e| e.sym == sym)
        .map(|e| e.alias_loc)
    })
    .unwrap_or_default()
}

fn advance_import_tracker(graph: &LinkerGraph, tracker: &ImportTracker) -> ImportStatus {
  let Some(ast) = graph.js_ast(tracker.source) else {
    return ImportStatus::External;
  };
  let Some(named_import) = ast.named_imports.get(&tracker.import_ref) else {
    return ImportStatus::External;
  };
  let record = &ast.import_records[named_import.import_record_index.idx()];
  if record.is_disabled {
    return ImportStatus::Disabled;
  }
  let Some(other_source) = record.source_index else {
    return ImportStatus::External;
  };
  let Some(other) = graph.js_ast(other_source) else {
    return ImportStatus::External;
  };

  match other.exports_kind {
    ExportsKind::None => {
      if other.named_exports.is_empty() && !other.has_lazy_export {
        ImportStatus::CommonJsWithoutExports {
          other_path: graph.files[other_source.idx()].pretty_path.clone(),
        }
      } else {
        lookup_resolved(graph, tracker, named_import, other_source)
      }
    }
    ExportsKind::CommonJs => {
      if named_import.alias == "*" {
        // The star binding itself is declared locally by the interop
        // assignment; nothing to match.
        ImportStatus::Ignore
      } else {
        ImportStatus::CommonJs {
          record: named_import.import_record_index,
          target: other_source,
          alias: named_import.alias.clone(),
        }
      }
    }
    ExportsKind::EsmWithDynamicFallback => {
      let has_static = graph.meta[other_source.idx()]
        .resolved_exports
        .contains_key(&named_import.alias);
      if has_static && named_import.alias != "*" {
        lookup_resolved(graph, tracker, named_import, other_source)
      } else {
        ImportStatus::DynamicFallback {
          source: other_source,
          namespace_ref: other.exports_ref,
          alias: named_import.alias.clone(),
        }
      }
    }
    ExportsKind::Esm => lookup_resolved(graph, tracker, named_import, other_source),
  }
}

fn lookup_resolved(
  graph: &LinkerGraph,
  tracker: &ImportTracker,
  named_import: &tern_common::NamedImport,
  other_source: SourceIndex,
) -> ImportStatus {
  if named_import.alias == "*" {
    let star = graph.meta[other_source.idx()]
      .resolved_export_star
      .as_ref()
      .expect("export star binding is created in step 3");
    return ImportStatus::Found {
      source: star.source,
      sym: star.sym,
      ambiguous: Vec::new(),
    };
  }

  match graph.meta[other_source.idx()]
    .resolved_exports
    .get(&named_import.alias)
  {
    Some(export) => ImportStatus::Found {
      source: export.source,
      sym: export.sym,
      ambiguous: export.potentially_ambiguous_export_star_refs.clone(),
    },
    None => {
      let importer_is_ts = graph.files[tracker.source.idx()].loader.is_typescript();
      if importer_is_ts && named_import.is_exported {
        ImportStatus::ProbablyTypeScriptType
      } else {
        ImportStatus::NoMatch
      }
    }
  }
}

fn apply_match_result(
  graph: &mut LinkerGraph,
  log: &Log,
  source: SourceIndex,
  import_ref: SymbolRef,
  result: MatchResult,
  re_exports: Vec<PartDependency>,
) {
  let (alias, alias_loc, is_generated, other_path) = {
    let ast = graph.js_ast(source).unwrap();
    let named_import = &ast.named_imports[&import_ref];
    let record = &ast.import_records[named_import.import_record_index.idx()];
    let other_path = record
      .source_index
      .map(|s| graph.files[s.idx()].pretty_path.clone())
      .unwrap_or_else(|| record.path.clone());
    (
      named_import.alias.clone(),
      named_import.alias_loc,
      named_import.is_generated,
      other_path,
    )
  };
  let location = Some(MsgLocation {
    file: graph.files[source.idx()].pretty_path.clone(),
    loc: alias_loc,
  });

  match result {
    MatchResult::Normal { source: s, sym } => {
      // A star import observes the namespace object itself, so the target
      // must materialize its exports variable.
      if alias == "*" {
        graph.meta[s.idx()].needs_exports_variable = true;
      }
      graph.meta[source.idx()].imports_to_bind.insert(
        import_ref,
        ImportData {
          sym,
          source: s,
          re_exports,
        },
      );
    }
    MatchResult::Namespace {
      namespace_ref,
      alias: ns_alias,
    } => {
      graph.symbols.get_mut(import_ref).namespace_alias =
        Some(tern_common::NamespaceAlias {
          namespace_ref,
          alias: ns_alias,
        });
    }
    MatchResult::NamespaceOfRecord {
      record,
      target,
      alias: ns_alias,
    } => {
      let stem = graph.files[target.idx()].pretty_path.clone();
      let namespace_ref = namespace_ref_for_record(graph, source, record, &stem);
      graph.symbols.get_mut(import_ref).namespace_alias =
        Some(tern_common::NamespaceAlias {
          namespace_ref,
          alias: ns_alias,
        });
    }
    MatchResult::NoExports { other_path } => {
      log.add_warning(
        location,
        format!(
          "Import \"{}\" will always be undefined because the file \"{}\" has no exports",
          alias, other_path
        ),
      );
      graph.symbols.get_mut(import_ref).flags.import_item_missing = true;
    }
    MatchResult::NormalAndNamespace {
      source: s,
      sym,
      namespace_ref,
      alias: ns_alias,
    } => {
      graph.meta[s.idx()].needs_exports_variable = true;
      graph.meta[source.idx()].imports_to_bind.insert(
        import_ref,
        ImportData {
          sym,
          source: s,
          re_exports,
        },
      );
      graph.symbols.get_mut(import_ref).namespace_alias =
        Some(tern_common::NamespaceAlias {
          namespace_ref,
          alias: ns_alias,
        });
    }
    MatchResult::Cycle => {
      log.add_error(
        location,
        format!("Detected cycle while resolving import \"{}\"", alias),
      );
    }
    MatchResult::ProbablyTypeScriptType => {
      graph.meta[source.idx()]
        .is_probably_typescript_type
        .insert(import_ref);
    }
    MatchResult::Ambiguous { a, b } => {
      let note_a = Note::at(
        graph.files[a.0.idx()].pretty_path.clone(),
        a.1,
        "One matching export is here",
      );
      let note_b = Note::at(
        graph.files[b.0.idx()].pretty_path.clone(),
        b.1,
        "Another matching export is here",
      );
      log.add_error_with_notes(
        location,
        format!("Ambiguous import \"{}\" has multiple matching exports", alias),
        vec![note_a, note_b],
      );
    }
    MatchResult::NoMatch => {
      if is_generated {
        log.add_debug(
          location,
          format!(
            "Import \"{}\" will always be undefined because there is no matching export in \"{}\"",
            alias, other_path
          ),
        );
        graph.symbols.get_mut(import_ref).flags.import_item_missing = true;
      } else {
        log.add_error(
          location,
          format!(
            "No matching export in \"{}\" for import \"{}\"",
            other_path, alias
          ),
        );
      }
    }
    MatchResult::Disabled => {
      graph.symbols.get_mut(import_ref).flags.import_item_missing = true;
    }
    MatchResult::Ignore => {}
  }
}

/// For a CommonJS entry point emitted as CommonJS, `exports` and `module`
/// are the host's own objects: demote them to unbound so renaming leaves
/// them alone.
fn demote_entry_cjs_shims(graph: &mut LinkerGraph, options: &BundleOptions) {
  if options.output_format != OutputFormat::CommonJs {
    return;
  }
  let entries: Vec<_> = graph.entry_points.iter().map(|e| e.source).collect();
  for source in entries {
    let Some(ast) = graph.js_ast(source) else {
      continue;
    };
    if ast.exports_kind != ExportsKind::CommonJs
      || graph.meta[source.idx()].wrap != WrapKind::None
    {
      continue;
    }
    let exports_ref = ast.exports_ref;
    let module_ref = ast.module_ref;
    for sym in [exports_ref, module_ref] {
      let symbol = graph.symbols.get_mut(sym);
      symbol.kind = SymbolKind::Unbound;
      symbol.flags.must_not_be_renamed = true;
    }
  }
}

/// Wrapped files get a synthetic part declaring the wrapper symbol. The
/// wrapper runs the whole file body, so it depends on every existing part.
fn create_wrapper_parts(graph: &mut LinkerGraph) {
  for i in 0..graph.reachable_files.len() {
    let source = graph.reachable_files[i];
    let wrap = graph.meta[source.idx()].wrap;
    if wrap == WrapKind::None {
      continue;
    }
    let Some(ast) = graph.js_ast(source) else {
      continue;
    };
    let wrapper_ref = ast.wrapper_ref;
    let part_count = ast.parts.len();

    let stem = file_name_stem(&graph.files[source.idx()].pretty_path);
    let helper = match wrap {
      WrapKind::Cjs => runtime::COMMON_JS,
      WrapKind::Esm => runtime::ESM,
      WrapKind::None => unreachable!(),
    };
    graph.symbols.get_mut(wrapper_ref).original_name = match wrap {
      WrapKind::Cjs => format!("require_{}", stem),
      _ => format!("init_{}", stem),
    };

    let mut part = tern_common::Part::default();
    part.can_be_removed_if_unused = true;
    part.declared_symbols.push(tern_common::DeclaredSymbol {
      sym: wrapper_ref,
      is_top_level: true,
    });
    for index in 0..part_count {
      part.dependencies.push(PartDependency {
        source,
        part: tern_common::PartIndex::new(index as u32),
      });
    }

    let ast = graph.js_ast_mut(source).unwrap();
    let part_index = tern_common::PartIndex::new(ast.parts.len() as u32);
    ast.parts.push(part);
    graph.meta[source.idx()].wrapper_part_index = Some(part_index);
    graph.record_runtime_use(source, part_index, helper, 1);
  }
}

/// Entry points root the tree shaker: a part that cannot be removed and
/// depends on the namespace-export part and the wrapper (when present).
fn create_entry_point_parts(graph: &mut LinkerGraph, options: &BundleOptions) {
  let entries: Vec<_> = graph.entry_points.iter().map(|e| e.source).collect();
  for source in entries {
    if graph.js_ast(source).is_none() {
      continue;
    }
    let wrapper_part = graph.meta[source.idx()].wrapper_part_index;

    let mut part = tern_common::Part::default();
    part.can_be_removed_if_unused = false;
    part.dependencies.push(PartDependency {
      source,
      part: tern_common::NS_EXPORT_PART_INDEX,
    });
    if let Some(wrapper_part) = wrapper_part {
      part.dependencies.push(PartDependency {
        source,
        part: wrapper_part,
      });
    }

    let ast = graph.js_ast_mut(source).unwrap();
    let part_index = tern_common::PartIndex::new(ast.parts.len() as u32);
    ast.parts.push(part);
    let meta = &mut graph.meta[source.idx()];
    meta.entry_point_part_index = Some(part_index);
    meta.force_include_exports_for_entry_point =
      options.output_format.keeps_import_export_syntax()
        || options.output_format == OutputFormat::CommonJs
        || options.output_format == OutputFormat::Iife;
  }
}

/// The local variable that holds a required module's exports object. Reuses
/// the statement's star binding when the user wrote one; otherwise one ref
/// per import record is synthesized and remembered for the renderer.
pub(crate) fn namespace_ref_for_record(
  graph: &mut LinkerGraph,
  source: SourceIndex,
  record: tern_common::ImportRecordIndex,
  stem: &str,
) -> SymbolRef {
  if let Some(existing) = graph.meta[source.idx()]
    .import_record_namespace_refs
    .get(&record)
  {
    return *existing;
  }

  let star_name = graph.js_ast(source).and_then(|ast| {
    ast.parts.iter().find_map(|part| {
      part.stmts.iter().find_map(|stmt| match stmt {
        tern_common::Stmt::Import {
          record: r,
          star_name: Some(star),
          ..
        } if *r == record => Some(*star),
        _ => None,
      })
    })
  });

  let ns_ref = match star_name {
    Some(star) => star,
    None => graph.symbols.create(
      source,
      format!("import_{}", file_name_stem(stem)),
      SymbolKind::Other,
    ),
  };
  graph.meta[source.idx()]
    .import_record_namespace_refs
    .insert(record, ns_ref);
  ns_ref
}

pub(crate) fn file_name_stem(pretty_path: &str) -> String {
  let base = pretty_path
    .rsplit(['/', '\\'])
    .next()
    .unwrap_or(pretty_path);
  let stem = base.split('.').next().unwrap_or(base);
  let mut out = String::new();
  for c in stem.chars() {
    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
      out.push(c);
    } else {
      out.push('_');
    }
  }
  if out.is_empty() || out.chars().next().unwrap().is_ascii_digit() {
    out.insert(0, '_');
  }
  out
}
